//! External collaborators of the gap filler.
//!
//! Every tool sits behind a trait so that the search can be driven by something other
//! than the real executables. [`ProcessTools`] runs the real executables, sending their
//! stderr to per-gap log files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ToolCommands;
use crate::errors::GapFillError;
use crate::gap::Region;

pub trait BarcodeExtractor {
    /// Barcodes of all reads mapped to `region`, one entry per read, as reported by
    /// the tool (suffix included).
    fn extract_barcodes(&self, bam: &Path, region: &Region, tag: &str) -> Result<Vec<String>, GapFillError>;
}

pub trait ReadRetriever {
    /// Write all reads tagged with one of the barcodes listed in `barcodes` to `output`.
    fn retrieve_reads(
        &self,
        reads: &Path,
        index: &Path,
        barcodes: &Path,
        output: &Path,
        tag: &str,
    ) -> Result<(), GapFillError>;
}

/// One invocation of the breakpoint-mode assembler
#[derive(Clone, Debug)]
pub struct FillRequest {
    pub reads: PathBuf,
    pub breakpoints: PathBuf,
    pub k: usize,
    pub abundance: usize,
    pub max_nodes: usize,
    pub max_length: usize,
    pub nb_cores: usize,
    pub max_memory: usize,
    pub verbosity: u8,
    pub output_prefix: PathBuf,
}

impl FillRequest {
    pub fn insertions_path(&self) -> PathBuf {
        with_suffix(&self.output_prefix, ".insertions.fasta")
    }

    pub fn variants_path(&self) -> PathBuf {
        with_suffix(&self.output_prefix, ".insertions.vcf")
    }
}

pub trait BreakpointAssembler {
    /// Run the assembler. The insertions end up in [`FillRequest::insertions_path`],
    /// which may be missing or empty when nothing was assembled.
    fn fill(&self, request: &FillRequest, tag: &str) -> Result<(), GapFillError>;
}

/// One invocation of the alignment statistics tool
#[derive(Clone, Debug)]
pub struct StatsRequest {
    pub query: PathBuf,
    pub reference: PathBuf,
    pub extension: usize,
    pub prefix: String,
    pub out_dir: PathBuf,
}

impl StatsRequest {
    /// Candidate-vs-reference table
    pub fn ref_qry_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.ref_qry.alignment.stats", self.prefix))
    }

    /// Candidate-vs-candidate table
    pub fn qry_qry_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.qry_qry.alignment.stats", self.prefix))
    }
}

pub trait AlignmentStatistics {
    fn align_stats(&self, request: &StatsRequest, tag: &str) -> Result<(), GapFillError>;
}

/// The full set of collaborators a gap-filling run needs
pub trait Toolchain: BarcodeExtractor + ReadRetriever + BreakpointAssembler + AlignmentStatistics + Sync {}

impl<T> Toolchain for T where T: BarcodeExtractor + ReadRetriever + BreakpointAssembler + AlignmentStatistics + Sync {}

pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Remove a file that may not exist.
pub fn remove_if_exists(path: &Path) -> Result<(), GapFillError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Runs the real executables
pub struct ProcessTools {
    commands: ToolCommands,
    log_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessTools {
    pub fn new(commands: ToolCommands, log_dir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self { commands, log_dir: log_dir.into(), timeout }
    }

    fn wait(&self, tool: &str, child: &mut Child) -> Result<Option<ExitStatus>, GapFillError> {
        let Some(timeout) = self.timeout else {
            return Ok(Some(child.wait()?));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }

            if Instant::now() >= deadline {
                warn!(tool, timeout_secs = timeout.as_secs(), "external tool timed out, killing it");
                child.kill()?;
                child.wait()?;
                return Ok(None);
            }

            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Run `command` with stderr appended to `<log_dir>/<tag>.<tool>.log`.
    ///
    /// Returns whether the tool exited successfully; a killed or failing tool is not
    /// an error, its (possibly empty) output is used as is.
    fn run(&self, tool: &str, mut command: Command, stdout: Stdio, tag: &str) -> Result<bool, GapFillError> {
        let log_path = self.log_dir.join(format!("{tag}.{tool}.log"));
        let log = OpenOptions::new().create(true).append(true).open(&log_path)?;

        debug!(?command, "running external tool");
        let mut child = match command.stdout(stdout).stderr(log).spawn() {
            Ok(child) => child,
            Err(source) => {
                remove_if_exists(&log_path)?;
                return Err(GapFillError::ToolSpawn { tool: tool.to_string(), source });
            }
        };

        let status = self.wait(tool, &mut child)?;

        if fs::metadata(&log_path).map(|m| m.len() == 0).unwrap_or(false) {
            remove_if_exists(&log_path)?;
        }

        match status {
            Some(s) if s.success() => Ok(true),
            Some(s) => {
                warn!(tool, status = %s, log = %log_path.display(), "external tool failed");
                Ok(false)
            },
            None => Ok(false),
        }
    }
}

impl BarcodeExtractor for ProcessTools {
    fn extract_barcodes(&self, bam: &Path, region: &Region, tag: &str) -> Result<Vec<String>, GapFillError> {
        let stdout_path = self.log_dir.join(format!("{tag}.bamextractor.out"));
        let stdout = File::create(&stdout_path)?;

        let mut command = Command::new(&self.commands.bam_extractor);
        command.arg(bam).arg(region.to_string());
        let result = self.run("bamextractor", command, Stdio::from(stdout), tag);

        let barcodes = match result {
            Ok(_) => BufReader::new(File::open(&stdout_path)?)
                .lines()
                .collect::<Result<Vec<_>, _>>()?,
            Err(e) => {
                remove_if_exists(&stdout_path)?;
                return Err(e);
            }
        };

        remove_if_exists(&stdout_path)?;

        Ok(barcodes)
    }
}

impl ReadRetriever for ProcessTools {
    fn retrieve_reads(
        &self,
        reads: &Path,
        index: &Path,
        barcodes: &Path,
        output: &Path,
        tag: &str,
    ) -> Result<(), GapFillError> {
        let out = File::create(output)?;

        let mut command = Command::new(&self.commands.get_reads);
        command.arg("-reads").arg(reads)
            .arg("-index").arg(index)
            .arg("-barcodes").arg(barcodes);

        self.run("getreads", command, Stdio::from(out), tag)?;

        Ok(())
    }
}

impl BreakpointAssembler for ProcessTools {
    fn fill(&self, request: &FillRequest, tag: &str) -> Result<(), GapFillError> {
        let mut command = Command::new(&self.commands.mind_the_gap);
        command.arg("fill")
            .arg("-in").arg(&request.reads)
            .arg("-bkpt").arg(&request.breakpoints)
            .arg("-kmer-size").arg(request.k.to_string())
            .arg("-abundance-min").arg(request.abundance.to_string())
            .arg("-max-nodes").arg(request.max_nodes.to_string())
            .arg("-max-length").arg(request.max_length.to_string())
            .arg("-nb-cores").arg(request.nb_cores.to_string())
            .arg("-max-memory").arg(request.max_memory.to_string())
            .arg("-verbose").arg(request.verbosity.to_string())
            .arg("-out").arg(&request.output_prefix);

        let result = self.run("mtgfill", command, Stdio::null(), tag);

        // graph files of the assembler are only needed during the run
        remove_if_exists(&with_suffix(&request.output_prefix, ".h5"))?;

        result.map(|_| ())
    }
}

impl AlignmentStatistics for ProcessTools {
    fn align_stats(&self, request: &StatsRequest, tag: &str) -> Result<(), GapFillError> {
        fs::create_dir_all(&request.out_dir)?;

        let mut command = Command::new(&self.commands.stats_alignment);
        command.arg("-qry").arg(&request.query)
            .arg("-ref").arg(&request.reference)
            .arg("-ext").arg(request.extension.to_string())
            .arg("-p").arg(&request.prefix)
            .arg("-out").arg(&request.out_dir);

        self.run("stats_align", command, Stdio::null(), tag)?;

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_paths() {
        let request = FillRequest {
            reads: PathBuf::from("r.fastq"),
            breakpoints: PathBuf::from("b.fasta"),
            k: 51,
            abundance: 3,
            max_nodes: 1000,
            max_length: 10000,
            nb_cores: 4,
            max_memory: 8000,
            verbosity: 1,
            output_prefix: PathBuf::from("/tmp/mtg/asm.gfa.g1.g500.c2000.k51.a3.bxu"),
        };

        assert_eq!(request.insertions_path(), PathBuf::from("/tmp/mtg/asm.gfa.g1.g500.c2000.k51.a3.bxu.insertions.fasta"));
        assert_eq!(request.variants_path(), PathBuf::from("/tmp/mtg/asm.gfa.g1.g500.c2000.k51.a3.bxu.insertions.vcf"));

        let stats = StatsRequest {
            query: PathBuf::from("q.fasta"),
            reference: PathBuf::from("ref.fasta"),
            extension: 51,
            prefix: "g1.k51.a3".to_string(),
            out_dir: PathBuf::from("/tmp/stats"),
        };
        assert_eq!(stats.ref_qry_path(), PathBuf::from("/tmp/stats/g1.k51.a3.ref_qry.alignment.stats"));
        assert_eq!(stats.qry_qry_path(), PathBuf::from("/tmp/stats/g1.k51.a3.qry_qry.alignment.stats"));
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let commands = ToolCommands { bam_extractor: "bxfill-no-such-tool".to_string(), ..ToolCommands::default() };
        let tools = ProcessTools::new(commands, dir.path(), None);
        let region = Region { contig: "ctg1".to_string(), start: 0, end: 100 };

        let result = tools.extract_barcodes(Path::new("x.bam"), &region, "g1.left");
        assert!(matches!(result, Err(GapFillError::ToolSpawn { .. })));
        assert!(!dir.path().join("g1.left.bamextractor.out").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ProcessTools::new(ToolCommands::default(), dir.path(), Some(Duration::from_millis(100)));

        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let ok = tools.run("sleep", command, Stdio::null(), "g1").unwrap();

        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
