use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Set verbosity level. Use multiple times to increase the verbosity level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<CliSubcommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliSubcommand {
    /// Fill the gaps of an assembly graph with the reads sharing barcodes with their flanks
    Fill(FillArgs),
}

#[derive(Args, Debug)]
pub struct FillArgs {
    /// Assembly graph in GFA 2 format, with the gaps to fill
    #[arg(short = 'g', long = "gfa")]
    #[clap(help_heading = "Inputs")]
    pub graph: PathBuf,

    /// Barcode-tagged read alignments (BAM, indexed)
    #[arg(short, long)]
    #[clap(help_heading = "Inputs")]
    pub bam: PathBuf,

    /// Barcode-indexed reads (FASTQ)
    #[arg(short, long)]
    #[clap(help_heading = "Inputs")]
    pub reads: PathBuf,

    /// Prefix of the barcode index of the reads
    #[arg(short, long)]
    #[clap(help_heading = "Inputs")]
    pub index: PathBuf,

    /// Directory with one reference sequence per gap, named '<gap>.g<length>.ingap.fasta'
    #[arg(long, conflicts_with = "contigs", required_unless_present = "contigs")]
    #[clap(help_heading = "Inputs")]
    pub ref_dir: Option<PathBuf>,

    /// FASTA file with the sequences of the contigs; candidate fills are graded against the flanking contigs
    #[arg(long)]
    #[clap(help_heading = "Inputs")]
    pub contigs: Option<PathBuf>,

    /// JSON file overriding the names of the external tools
    #[arg(long)]
    #[clap(help_heading = "Inputs")]
    pub tools: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "bxfill_results")]
    #[clap(help_heading = "Outputs")]
    pub out: PathBuf,

    /// Size of the region on each side of a gap barcodes are extracted from (bp)
    #[arg(short, long)]
    #[clap(help_heading = "Evidence")]
    pub chunk: usize,

    /// Minimal number of occurrences of a barcode in the union of both regions
    #[arg(short = 'f', long = "freq", default_value_t = 2)]
    #[clap(help_heading = "Evidence")]
    pub min_barcode_freq: usize,

    /// k-mer sizes, tried in the given order
    #[arg(short = 'k', long = "kmer", num_args = 1.., default_values_t = [51, 41, 31, 21])]
    #[clap(help_heading = "Assembler")]
    pub kmer_sizes: Vec<usize>,

    /// Solid k-mer abundance thresholds, tried in the given order for every k-mer size
    #[arg(short = 'a', long = "abundance", num_args = 1.., default_values_t = [3, 2])]
    #[clap(help_heading = "Assembler")]
    pub abundance_thresholds: Vec<usize>,

    /// Bases trimmed from each scaffold end before taking the breakpoint k-mers [default: k]
    #[arg(long = "ext")]
    #[clap(help_heading = "Assembler")]
    pub extension: Option<usize>,

    /// Try every (k, a) pair even after both strands produced an accepted fill
    #[arg(long)]
    #[clap(help_heading = "Assembler")]
    pub force: bool,

    /// Maximum number of nodes in the contig graph explored by the assembler
    #[arg(long, default_value_t = 1000)]
    #[clap(help_heading = "Assembler")]
    pub max_nodes: usize,

    /// Maximum length of a fill (bp), raised for gaps at least this long
    #[arg(long, default_value_t = 10_000)]
    #[clap(help_heading = "Assembler")]
    pub max_length: usize,

    /// Number of cores of each assembler run
    #[arg(long, default_value_t = 4)]
    #[clap(help_heading = "Assembler")]
    pub nb_cores: usize,

    /// Memory of each assembler run (MB)
    #[arg(long, default_value_t = 8000)]
    #[clap(help_heading = "Assembler")]
    pub max_memory: usize,

    /// Verbosity of the assembler
    #[arg(long, default_value_t = 1)]
    #[clap(help_heading = "Assembler")]
    pub mtg_verbose: u8,

    /// Number of gaps processed in parallel [default: available cores]
    #[arg(short, long)]
    #[clap(help_heading = "Processing")]
    pub threads: Option<usize>,

    /// Kill an external tool after this many seconds
    #[arg(long)]
    #[clap(help_heading = "Processing")]
    pub tool_timeout: Option<u64>,

    /// Only fill the gaps declared on this line of the graph or later, appending to existing outputs
    #[arg(long)]
    #[clap(help_heading = "Processing")]
    pub line: Option<usize>,

    /// Keep the gap line of a gap that failed and go on with the others
    #[arg(long)]
    #[clap(help_heading = "Processing")]
    pub keep_going: bool,
}
