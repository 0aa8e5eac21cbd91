use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum GapFillError {
    /// An input path or option failed validation before any gap was processed
    InvalidInput(String),

    /// A line of the input graph could not be parsed
    GfaParse { line: usize, reason: &'static str },

    /// A FASTA or FASTQ record could not be parsed
    SequenceParse { path: PathBuf, source: io::Error },

    /// No sequence could be resolved for the given scaffold
    MissingSequence(String),

    /// The reference sequence file for a gap does not exist
    MissingReference(PathBuf),

    /// The alignment statistics tool ran but did not produce the expected table
    MissingStatistics(PathBuf),

    /// A row of an alignment statistics table is malformed
    StatsParse { path: PathBuf, line: usize, reason: &'static str },

    /// An external tool could not be started
    ToolSpawn { tool: String, source: io::Error },

    /// Error variant when the configuration could not be (de)serialized
    JsonError(serde_json::Error),

    /// A worker thread panicked while processing a gap
    WorkerPanic,

    /// Other IO errors
    IOError(io::Error),
}

impl GapFillError {
    /// Whether this error invalidates the whole run rather than a single attempt.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ToolSpawn { .. })
    }
}

impl Error for GapFillError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            Self::SequenceParse { ref source, .. } => Some(source),
            Self::ToolSpawn { ref source, .. } => Some(source),
            Self::JsonError(ref source) => Some(source),
            Self::IOError(ref source) => Some(source),
            _ => None
        }
    }
}

impl From<io::Error> for GapFillError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<serde_json::Error> for GapFillError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value)
    }
}

impl Display for GapFillError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::InvalidInput(ref msg) =>
                write!(f, "Invalid input: {msg}"),
            Self::GfaParse { line, reason } =>
                write!(f, "Could not parse GFA line {line}: {reason}"),
            Self::SequenceParse { ref path, .. } =>
                write!(f, "Could not read sequences from {}", path.display()),
            Self::MissingSequence(ref name) =>
                write!(f, "No sequence found for scaffold '{name}'"),
            Self::MissingReference(ref path) =>
                write!(f, "The reference file {} doesn't exist", path.display()),
            Self::MissingStatistics(ref path) =>
                write!(f, "The alignment statistics file {} doesn't exist", path.display()),
            Self::StatsParse { ref path, line, reason } =>
                write!(f, "Malformed statistics row {line} in {}: {reason}", path.display()),
            Self::ToolSpawn { ref tool, .. } =>
                write!(f, "Could not run external tool '{tool}'"),
            Self::JsonError(ref err) =>
                err.fmt(f),
            Self::WorkerPanic =>
                write!(f, "A gap-filling worker thread panicked!"),
            Self::IOError(ref err) =>
                err.fmt(f),
        }
    }
}
