//! Runs the per-gap pipeline over all gaps of a graph with a pool of worker threads.
//!
//! Workers only produce [`GapResult`]s; the calling thread is the single writer of the
//! run-level outputs and merges results in completion order.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{error, info, warn};

use crate::config::{ReferenceSource, RunConfig};
use crate::errors::GapFillError;
use crate::evidence::UnionSummary;
use crate::gap::Gap;
use crate::io::fasta::write_records;
use crate::io::gfa::GraphFile;
use crate::output::GapOutput;
use crate::pipeline::{GapFiller, GapResult, RunDirs};
use crate::tools::{remove_if_exists, Toolchain};

/// Counts of a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub gaps: usize,
    pub filled: usize,
    pub retained: usize,
    pub failed: usize,
}

/// Paths of the run-level outputs
#[derive(Clone, Debug)]
pub struct RunOutputs {
    pub graph: PathBuf,
    pub summary: PathBuf,
    pub fills: PathBuf,
    pub report: PathBuf,
    pub config: PathBuf,
}

impl RunOutputs {
    pub fn new(config: &RunConfig) -> Self {
        let out = &config.out_dir;
        let graph_name = config.graph_name();
        let graph_stem = graph_name.strip_suffix(".gfa").unwrap_or(&graph_name);

        Self {
            graph: out.join(format!("bxfill_{graph_name}")),
            summary: out.join(format!("{graph_name}.union.sum")),
            fills: out.join(format!("bxfill_{graph_stem}.gapfill_seq.fasta")),
            report: out.join("bxfill.search.jsonl"),
            config: out.join("bxfill.config.json"),
        }
    }
}

/// Open a run-level output. Returns the writer and whether the file starts out empty.
fn open_output(path: &Path, append: bool) -> Result<(BufWriter<File>, bool), GapFillError> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)?
    } else {
        File::create(path)?
    };
    let fresh = file.metadata()?.len() == 0;

    Ok((BufWriter::new(file), fresh))
}

/// Single writer of the run-level outputs
struct MergeWriter {
    graph: BufWriter<File>,
    summary: BufWriter<File>,
    fills: BufWriter<File>,
    report: BufWriter<File>,
}

impl MergeWriter {
    fn open(outputs: &RunOutputs, graph: &GraphFile, append: bool) -> Result<Self, GapFillError> {
        let (mut graph_out, fresh) = open_output(&outputs.graph, append)?;
        if fresh {
            writeln!(graph_out, "H\tVN:Z:2.0")?;
            for segment in &graph.segments {
                writeln!(graph_out, "{}", segment.raw)?;
            }
        }

        let (mut summary, fresh) = open_output(&outputs.summary, append)?;
        if fresh {
            writeln!(summary, "{}", UnionSummary::HEADER)?;
        }

        let (fills, _) = open_output(&outputs.fills, append)?;
        let (report, _) = open_output(&outputs.report, append)?;

        let mut writer = Self { graph: graph_out, summary, fills, report };
        writer.flush()?;

        Ok(writer)
    }

    fn merge(&mut self, result: &GapResult) -> Result<(), GapFillError> {
        writeln!(self.summary, "{}", result.summary)?;

        for line in result.output.gfa_lines() {
            writeln!(self.graph, "{line}")?;
        }
        write_records(&mut self.fills, result.output.fills())?;

        serde_json::to_writer(&mut self.report, &result.report)?;
        writeln!(self.report)?;

        self.flush()
    }

    /// Keep the gap line of a gap whose pipeline failed
    fn retain(&mut self, gap: &Gap) -> Result<(), GapFillError> {
        writeln!(self.graph, "{}", gap.record)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), GapFillError> {
        self.graph.flush()?;
        self.summary.flush()?;
        self.fills.flush()?;
        self.report.flush()?;

        Ok(())
    }
}

fn copy_graph(graph: &GraphFile, path: &Path) -> Result<(), GapFillError> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in &graph.lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    Ok(())
}

/// Remove the variant files the assembler leaves next to its insertions
fn remove_variant_files(dir: &Path) -> Result<(), GapFillError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "vcf") {
            remove_if_exists(&path)?;
        }
    }

    Ok(())
}

/// Fill all gaps of the configured graph.
///
/// Fails on the first failing gap, after the gaps already in flight have been merged,
/// unless `keep_going` is set, in which case failed gaps keep their gap line.
pub fn run<T>(config: &RunConfig, tools: &T) -> Result<RunSummary, GapFillError>
where
    T: Toolchain + ?Sized,
{
    let graph = GraphFile::from_path(&config.graph)?;
    let dirs = RunDirs::new(&config.out_dir);
    dirs.create()?;

    let outputs = RunOutputs::new(config);
    let config_out = BufWriter::new(File::create(&outputs.config)?);
    serde_json::to_writer_pretty(config_out, config)?;

    if graph.gaps.is_empty() {
        info!(graph = %config.graph.display(), "no gaps in the graph, copying it unchanged");
        copy_graph(&graph, &outputs.graph)?;
        return Ok(RunSummary::default());
    }

    let graph_dir = config.graph_dir();
    let gaps = graph.gaps.iter()
        .filter(|g| config.start_line.map_or(true, |start| g.line_no >= start))
        .map(|g| Gap::from_line(g, &graph, &graph_dir, config.reference.contigs()))
        .collect::<Result<Vec<_>, _>>()?;

    if let ReferenceSource::Directory(_) = &config.reference {
        if let Some(missing) = gaps.iter()
            .map(|g| config.reference.reference_file(g))
            .find(|path| !path.exists())
        {
            return Err(GapFillError::MissingReference(missing));
        }
    }

    info!(gaps = gaps.len(), threads = config.threads, "filling gaps");

    let mut writer = MergeWriter::open(&outputs, &graph, config.start_line.is_some())?;
    let filler = GapFiller::new(config, tools, &dirs);
    let abort = AtomicBool::new(false);

    let (tx_gap, rx_gap) = crossbeam_channel::unbounded::<&Gap>();
    let (tx_done, rx_done) = crossbeam_channel::unbounded();
    for gap in &gaps {
        tx_gap.send(gap).map_err(|_| GapFillError::WorkerPanic)?;
    }
    drop(tx_gap);

    let mut summary = RunSummary { gaps: gaps.len(), ..RunSummary::default() };

    let first_error = thread::scope(|scope| -> Result<Option<GapFillError>, GapFillError> {
        let handles: Vec<_> = (0..config.threads)
            .map(|_| {
                let rx = rx_gap.clone();
                let tx = tx_done.clone();
                let filler = &filler;
                let abort = &abort;

                scope.spawn(move || {
                    while let Ok(gap) = rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }

                        let result = filler.fill_gap(gap);
                        if tx.send((gap, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(tx_done);

        let mut first_error = None;
        for (gap, result) in rx_done.iter() {
            let merged = match result {
                Ok(result) => {
                    match result.output {
                        GapOutput::Filled(_) => summary.filled += 1,
                        GapOutput::Retained(_) => summary.retained += 1,
                    }
                    writer.merge(&result)
                },
                Err(e) if config.keep_going => {
                    error!(gap = %gap.label(), error = %e, "gap failed, keeping its gap line");
                    summary.failed += 1;
                    writer.retain(gap)
                },
                Err(e) => {
                    error!(gap = %gap.label(), error = %e, "gap failed, stopping the run");
                    abort.store(true, Ordering::Relaxed);
                    summary.failed += 1;
                    first_error.get_or_insert(e);
                    Ok(())
                },
            };

            if let Err(e) = merged {
                abort.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }

        for handle in handles {
            handle.join().map_err(|_| GapFillError::WorkerPanic)?;
        }

        Ok(first_error)
    })?;

    if let Err(e) = remove_variant_files(&dirs.assembler) {
        warn!(error = %e, "could not remove the assembler variant files");
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    info!(
        filled = summary.filled,
        retained = summary.retained,
        failed = summary.failed,
        output = %outputs.graph.display(),
        "all gaps processed"
    );

    Ok(summary)
}
