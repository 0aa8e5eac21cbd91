//! The work done for a single gap: evidence, parameter search, output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use crate::config::RunConfig;
use crate::errors::GapFillError;
use crate::evidence::{collect_evidence, EvidenceInputs, UnionSummary};
use crate::gap::{clamp_chunk, Gap};
use crate::output::GapOutput;
use crate::search::{GapSearch, SearchContext, SearchReport};
use crate::tools::Toolchain;

/// Directories of a run
#[derive(Clone, Debug)]
pub struct RunDirs {
    /// Barcode lists, recruited reads and run-level outputs
    pub out: PathBuf,
    /// Probe files and assembler outputs
    pub assembler: PathBuf,
    pub stats: PathBuf,
    /// stderr of the external tools
    pub logs: PathBuf,
}

impl RunDirs {
    pub fn new(out: &Path) -> Self {
        Self {
            out: out.to_path_buf(),
            assembler: out.join("mtg_results"),
            stats: out.join("alignments_stats"),
            logs: out.join("logs"),
        }
    }

    pub fn create(&self) -> Result<(), GapFillError> {
        for dir in [&self.out, &self.assembler, &self.stats, &self.logs] {
            fs::create_dir_all(dir)?;
        }

        Ok(())
    }
}

/// Everything a gap contributes to the run-level outputs
#[derive(Debug)]
pub struct GapResult {
    pub summary: UnionSummary,
    pub output: GapOutput,
    pub report: SearchReport,
}

pub struct GapFiller<'a, T: ?Sized> {
    config: &'a RunConfig,
    tools: &'a T,
    dirs: &'a RunDirs,
    graph_name: String,
}

impl<'a, T> GapFiller<'a, T>
where
    T: Toolchain + ?Sized,
{
    pub fn new(config: &'a RunConfig, tools: &'a T, dirs: &'a RunDirs) -> Self {
        Self { config, tools, dirs, graph_name: config.graph_name() }
    }

    pub fn fill_gap(&self, gap: &Gap) -> Result<GapResult, GapFillError> {
        let span = info_span!("gap", label = %gap.label());
        let _enter = span.enter();

        let fill = &self.config.fill;
        let chunk = clamp_chunk(fill.chunk, gap.left.length, gap.right.length);
        if chunk != fill.chunk {
            info!(requested = fill.chunk, chunk, "chunk larger than a flanking scaffold, using the shorter scaffold length");
        }

        let reference = self.config.reference.reference_file(gap);
        if !reference.exists() {
            return Err(GapFillError::MissingReference(reference));
        }

        let stem = gap.file_stem(&self.graph_name, chunk);
        let evidence = collect_evidence(self.tools, gap, chunk, &stem, &EvidenceInputs {
            bam: &self.config.bam,
            reads: &self.config.reads,
            index: &self.config.index,
            min_freq: fill.min_barcode_freq,
            work_dir: &self.dirs.out,
        })?;

        let left_seq = gap.left.sequence()?;
        let right_seq = gap.right.sequence()?;

        let (output, report) = GapSearch::new(SearchContext {
            tools: self.tools,
            config: fill,
            gap,
            left_seq: &left_seq,
            right_seq: &right_seq,
            reads: &evidence.reads_file,
            reference: &reference,
            grading: self.config.reference.grading_mode(gap),
            stem: &stem,
            assembler_dir: &self.dirs.assembler,
            stats_dir: &self.dirs.stats,
        }).run()?;

        Ok(GapResult { summary: evidence.summary, output, report })
    }
}
