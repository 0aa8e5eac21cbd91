pub mod gfa;
pub mod fasta;
pub mod stats;
