use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::GapFillError;
use crate::gap::{Gap, GapLength};
use crate::quality::GradingMode;

pub const DEFAULT_MAX_LENGTH: usize = 10_000;

/// Names (or paths) of the external executables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub bam_extractor: String,
    pub get_reads: String,
    pub mind_the_gap: String,
    pub stats_alignment: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            bam_extractor: "BamExtractor".to_string(),
            get_reads: "GetReads".to_string(),
            mind_the_gap: "MindTheGap".to_string(),
            stats_alignment: "stats_alignment.py".to_string(),
        }
    }
}

impl ToolCommands {
    pub fn from_json(path: &Path) -> Result<Self, GapFillError> {
        let reader = BufReader::new(File::open(path)?);

        Ok(serde_json::from_reader(reader)?)
    }
}

/// Parameters of the per-gap evidence collection and parameter search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Requested barcode capture window on each side of a gap (bp)
    pub chunk: usize,

    /// Minimal number of occurrences of a barcode across both chunks
    pub min_barcode_freq: usize,

    /// k-mer sizes, in the order they are tried
    pub kmer_sizes: Vec<usize>,

    /// Solid k-mer abundance thresholds, in the order they are tried for every k
    pub abundance_thresholds: Vec<usize>,

    /// Margin trimmed from each scaffold end before taking the probes; `k` if unset
    pub extension: Option<usize>,

    /// Keep searching after both strands produced an accepted fill
    pub force: bool,

    pub max_nodes: usize,
    pub max_length: usize,
    pub nb_cores: usize,
    /// Memory cap of the assembler's graph construction, in MB
    pub max_memory: usize,
    pub verbosity: u8,

    /// Kill external tools running longer than this
    pub tool_timeout_secs: Option<u64>,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            chunk: 5000,
            min_barcode_freq: 2,
            kmer_sizes: vec![51, 41, 31, 21],
            abundance_thresholds: vec![3, 2],
            extension: None,
            force: false,
            max_nodes: 1000,
            max_length: DEFAULT_MAX_LENGTH,
            nb_cores: 4,
            max_memory: 8000,
            verbosity: 1,
            tool_timeout_secs: None,
        }
    }
}

impl FillConfig {
    pub fn extension_for(&self, k: usize) -> usize {
        self.extension.unwrap_or(k)
    }

    /// Maximal fill length passed to the assembler. When left at its default, it is
    /// raised for gaps already declared longer than that.
    pub fn max_length_for(&self, length: GapLength) -> usize {
        match length.value() {
            Some(len) if self.max_length == DEFAULT_MAX_LENGTH && len >= DEFAULT_MAX_LENGTH as i64 =>
                len as usize + 1000,
            _ => self.max_length,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), GapFillError> {
        if self.chunk == 0 {
            return Err(GapFillError::InvalidInput("the chunk size should be positive".to_string()));
        }

        if self.kmer_sizes.is_empty() || self.kmer_sizes.contains(&0) {
            return Err(GapFillError::InvalidInput("at least one positive k-mer size is required".to_string()));
        }

        if self.abundance_thresholds.is_empty() {
            return Err(GapFillError::InvalidInput("at least one abundance threshold is required".to_string()));
        }

        Ok(())
    }
}

/// Where the sequences that candidate fills are graded against come from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceSource {
    /// Directory holding one `<label>.g<length>.ingap.fasta` file per gap
    Directory(PathBuf),

    /// FASTA file with the contig sequences
    Contigs(PathBuf),
}

impl ReferenceSource {
    pub fn reference_file(&self, gap: &Gap) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.join(format!("{}.g{}.ingap.fasta", gap.label(), gap.length)),
            Self::Contigs(path) => path.clone(),
        }
    }

    pub fn grading_mode(&self, gap: &Gap) -> GradingMode {
        match self {
            Self::Directory(_) => GradingMode::Reference,
            Self::Contigs(_) => GradingMode::Contigs {
                left: gap.left.name.clone(),
                right: gap.right.name.clone(),
            },
        }
    }

    pub fn contigs(&self) -> Option<&Path> {
        match self {
            Self::Contigs(path) => Some(path),
            Self::Directory(_) => None,
        }
    }
}

/// Everything a gap-filling run needs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub graph: PathBuf,
    pub bam: PathBuf,
    pub reads: PathBuf,
    /// Prefix of the barcode index of `reads`
    pub index: PathBuf,
    pub reference: ReferenceSource,
    pub out_dir: PathBuf,
    pub threads: usize,
    /// Only process gaps declared on this graph line or later
    pub start_line: Option<usize>,
    /// Retain the gap line of a failed gap and carry on, instead of stopping the run
    pub keep_going: bool,
    pub fill: FillConfig,
    pub tools: ToolCommands,
}

fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    let name = path.to_string_lossy();
    suffixes.iter().any(|s| name.ends_with(s))
}

fn must_exist(path: &Path, what: &str) -> Result<(), GapFillError> {
    if path.exists() {
        Ok(())
    } else {
        Err(GapFillError::InvalidInput(format!("the path of the {what} doesn't exist: {}", path.display())))
    }
}

impl RunConfig {
    /// File name of the input graph, used to name the run-level outputs
    pub fn graph_name(&self) -> String {
        self.graph.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph.gfa".to_string())
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.graph.parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), GapFillError> {
        if !has_suffix(&self.graph, &[".gfa"]) {
            return Err(GapFillError::InvalidInput("the suffix of the GFA file should be: '.gfa'".to_string()));
        }

        if !has_suffix(&self.bam, &[".bam"]) {
            return Err(GapFillError::InvalidInput("the suffix of the BAM file should be: '.bam'".to_string()));
        }

        must_exist(&self.graph, "GFA file")?;
        must_exist(&self.bam, "BAM file")?;
        must_exist(&self.reads, "file of indexed reads")?;

        match &self.reference {
            ReferenceSource::Directory(dir) => must_exist(dir, "directory of reference sequences")?,
            ReferenceSource::Contigs(path) => {
                if !has_suffix(path, &[".fasta", ".fa", ".fasta.gz", ".fa.gz"]) {
                    return Err(GapFillError::InvalidInput(
                        "the suffix of the file containing the sequences of the contigs should be: '.fasta'".to_string()
                    ));
                }
                must_exist(path, "file of contigs' sequences")?
            },
        }

        if self.threads == 0 {
            return Err(GapFillError::InvalidInput("at least one worker thread is required".to_string()));
        }

        self.fill.validate()
    }
}
