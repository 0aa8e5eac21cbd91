//! Barcode evidence for a gap and the reads it recruits.

use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::errors::GapFillError;
use crate::gap::{Gap, GapLength, GapSide};
use crate::io::fasta::count_fastq_records;
use crate::tools::{remove_if_exists, BarcodeExtractor, ReadRetriever};

/// Drop the `-<n>` suffix the barcode extractor appends to every barcode.
pub fn strip_barcode_suffix(raw: &str) -> &str {
    raw.trim().split('-').next().unwrap_or_default()
}

/// Occurrences of each barcode across both chunks of a gap
#[derive(Debug, Default)]
pub struct BarcodeCounts {
    counts: FxHashMap<String, usize>,
}

impl BarcodeCounts {
    pub fn add(&mut self, barcode: &str) {
        if barcode.is_empty() {
            return;
        }

        *self.counts.entry(barcode.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, barcode: &str) -> usize {
        self.counts.get(barcode).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Barcodes seen at least `min_freq` times, sorted.
    pub fn filtered(&self, min_freq: usize) -> Vec<&str> {
        self.counts.iter()
            .filter(|(_, n)| **n >= min_freq)
            .map(|(bc, _)| bc.as_str())
            .sorted_unstable()
            .collect()
    }

    fn write_counts(&self, path: &Path) -> Result<(), GapFillError> {
        let mut out = BufWriter::new(File::create(path)?);
        for (barcode, n) in self.counts.iter().sorted_unstable() {
            writeln!(out, "{barcode}\t{n}")?;
        }
        out.flush()?;

        Ok(())
    }
}

/// One row of the run's evidence summary
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionSummary {
    pub gap: String,
    pub left: String,
    pub right: String,
    pub length: GapLength,
    pub chunk: usize,
    pub barcodes: usize,
    pub reads: usize,
}

impl UnionSummary {
    pub const HEADER: &'static str = "Gap ID\tLeft scaffold\tRight scaffold\tGap size\tChunk size\tNb barcodes\tNb reads";
}

impl Display for UnionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.gap, self.left, self.right, self.length, self.chunk, self.barcodes, self.reads
        )
    }
}

/// Inputs shared by the evidence collection of all gaps
pub struct EvidenceInputs<'a> {
    pub bam: &'a Path,
    pub reads: &'a Path,
    pub index: &'a Path,
    pub min_freq: usize,
    pub work_dir: &'a Path,
}

#[derive(Debug)]
pub struct Evidence {
    pub summary: UnionSummary,
    /// Filtered barcode list
    pub barcodes_file: PathBuf,
    /// Reads tagged with one of the filtered barcodes, FASTQ
    pub reads_file: PathBuf,
}

fn side_name(side: GapSide) -> &'static str {
    match side {
        GapSide::Left => "left",
        GapSide::Right => "right",
    }
}

/// Collect the barcodes found in both chunks of a gap and retrieve the reads carrying
/// the frequent ones.
///
/// A collaborator that cannot be run counts as one that found nothing; the gap then
/// goes on with fewer (or no) reads.
pub fn collect_evidence<T>(
    tools: &T,
    gap: &Gap,
    chunk: usize,
    stem: &str,
    inputs: &EvidenceInputs,
) -> Result<Evidence, GapFillError>
where
    T: BarcodeExtractor + ReadRetriever + ?Sized,
{
    let mut counts = BarcodeCounts::default();
    let mut side_files = Vec::with_capacity(2);

    for scaffold in [&gap.left, &gap.right] {
        let side = side_name(scaffold.side);
        let region = scaffold.chunk(chunk);
        let tag = format!("{stem}.{side}");

        let raw = match tools.extract_barcodes(inputs.bam, &region, &tag) {
            Ok(raw) => raw,
            Err(e @ GapFillError::ToolSpawn { .. }) => {
                warn!(%region, error = %e, "no barcodes extracted");
                Vec::new()
            },
            Err(e) => return Err(e),
        };

        let side_file = inputs.work_dir.join(format!("{tag}.barcodes"));
        let mut out = BufWriter::new(File::create(&side_file)?);
        for barcode in raw.iter().map(|r| strip_barcode_suffix(r)).filter(|b| !b.is_empty()) {
            writeln!(out, "{barcode}")?;
            counts.add(barcode);
        }
        out.flush()?;
        side_files.push(side_file);
    }

    let all_barcodes_file = inputs.work_dir.join(format!("{stem}.bxu.counts"));
    counts.write_counts(&all_barcodes_file)?;

    let frequent = counts.filtered(inputs.min_freq);
    let barcodes_file = inputs.work_dir.join(format!("{stem}.bxu"));
    let mut out = BufWriter::new(File::create(&barcodes_file)?);
    for barcode in &frequent {
        writeln!(out, "{barcode}")?;
    }
    out.flush()?;

    let reads_file = inputs.work_dir.join(format!("{stem}.rbxu.fastq"));
    if let Err(e) = tools.retrieve_reads(inputs.reads, inputs.index, &barcodes_file, &reads_file, stem) {
        match e {
            GapFillError::ToolSpawn { .. } => warn!(error = %e, "no reads retrieved"),
            e => return Err(e),
        }
    }
    let reads = count_fastq_records(&reads_file)?;

    for path in side_files.iter().chain([&all_barcodes_file]) {
        remove_if_exists(path)?;
    }

    info!(barcodes = frequent.len(), reads, chunk, "collected barcode evidence");

    Ok(Evidence {
        summary: UnionSummary {
            gap: gap.label(),
            left: gap.left.reference().to_string(),
            right: gap.right.reference().to_string(),
            length: gap.length,
            chunk,
            barcodes: frequent.len(),
            reads,
        },
        barcodes_file,
        reads_file,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    use crate::gap::{Region, Scaffold, SequenceSource};
    use crate::io::gfa::Orientation;

    struct FakeTools {
        left: Vec<String>,
        right: Vec<String>,
        regions: RefCell<Vec<String>>,
        requested: RefCell<Vec<String>>,
    }

    impl BarcodeExtractor for FakeTools {
        fn extract_barcodes(&self, _bam: &Path, region: &Region, _tag: &str) -> Result<Vec<String>, GapFillError> {
            self.regions.borrow_mut().push(region.to_string());
            Ok(if region.contig == "ctg1" { self.left.clone() } else { self.right.clone() })
        }
    }

    impl ReadRetriever for FakeTools {
        fn retrieve_reads(&self, _r: &Path, _i: &Path, barcodes: &Path, output: &Path, _tag: &str) -> Result<(), GapFillError> {
            let listed = fs::read_to_string(barcodes)?;
            let mut fastq = String::new();
            for (i, bc) in listed.lines().enumerate() {
                self.requested.borrow_mut().push(bc.to_string());
                fastq.push_str(&format!("@read{i} BX:Z:{bc}-1\nACGT\n+\nIIII\n"));
            }
            fs::write(output, fastq)?;
            Ok(())
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn gap() -> Gap {
        let scaffold = |name: &str, orient, length, side| Scaffold {
            name: name.to_string(),
            orient,
            length,
            side,
            source: SequenceSource::Unavailable,
        };

        Gap {
            id: Some("g1".to_string()),
            length: GapLength::Known(500),
            left: scaffold("ctg1", Orientation::Forward, 2000, GapSide::Left),
            right: scaffold("ctg2", Orientation::Reverse, 1800, GapSide::Right),
            record: "G\tg1\tctg1+\tctg2-\t500\t*".to_string(),
            line_no: 4,
        }
    }

    #[test]
    fn test_strip_suffix() {
        assert_eq!(strip_barcode_suffix("AAACCTGAGAAGGCCT-1\n"), "AAACCTGAGAAGGCCT");
        assert_eq!(strip_barcode_suffix("AAACCTGAG"), "AAACCTGAG");
        assert_eq!(strip_barcode_suffix(""), "");
    }

    #[test]
    fn test_counts_and_filter() {
        let mut counts = BarcodeCounts::default();
        for bc in ["AAA", "CCC", "AAA", "GGG", "CCC", "AAA", ""] {
            counts.add(bc);
        }

        assert_eq!(counts.len(), 3);
        assert_eq!(counts.count("AAA"), 3);
        assert_eq!(counts.count("TTT"), 0);
        assert_eq!(counts.filtered(2), vec!["AAA", "CCC"]);
        assert_eq!(counts.filtered(1), vec!["AAA", "CCC", "GGG"]);
        assert!(counts.filtered(4).is_empty());
    }

    #[test]
    fn test_collect_sums_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeTools {
            left: strings(&["AAA-1", "CCC-1", "TTT-1"]),
            right: strings(&["AAA-1", "GGG-1", "GGG-1", "TTT-1"]),
            regions: RefCell::new(Vec::new()),
            requested: RefCell::new(Vec::new()),
        };
        let inputs = EvidenceInputs {
            bam: Path::new("x.bam"),
            reads: Path::new("reads.fastq"),
            index: Path::new("reads.shelve"),
            min_freq: 2,
            work_dir: dir.path(),
        };

        let evidence = collect_evidence(&tools, &gap(), 1800, "asm.gfa.g1.g500.c1800", &inputs).unwrap();

        // a forward left scaffold contributes its end, a reverse right one its end too
        assert_eq!(*tools.regions.borrow(), vec!["ctg1:200-2000", "ctg2:0-1800"]);
        assert_eq!(*tools.requested.borrow(), vec!["AAA", "GGG", "TTT"]);
        assert_eq!(evidence.summary.barcodes, 3);
        assert_eq!(evidence.summary.reads, 3);
        assert_eq!(
            evidence.summary.to_string(),
            "g1\tctg1+\tctg2-\t500\t1800\t3\t3"
        );

        assert!(evidence.barcodes_file.exists());
        assert!(evidence.reads_file.exists());
        assert!(!dir.path().join("asm.gfa.g1.g500.c1800.left.barcodes").exists());
        assert!(!dir.path().join("asm.gfa.g1.g500.c1800.right.barcodes").exists());
        assert!(!dir.path().join("asm.gfa.g1.g500.c1800.bxu.counts").exists());
    }

    #[test]
    fn test_collect_without_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeTools {
            left: Vec::new(),
            right: Vec::new(),
            regions: RefCell::new(Vec::new()),
            requested: RefCell::new(Vec::new()),
        };
        let inputs = EvidenceInputs {
            bam: Path::new("x.bam"),
            reads: Path::new("reads.fastq"),
            index: Path::new("reads.shelve"),
            min_freq: 2,
            work_dir: dir.path(),
        };

        let evidence = collect_evidence(&tools, &gap(), 1800, "stem", &inputs).unwrap();
        assert_eq!(evidence.summary.barcodes, 0);
        assert_eq!(evidence.summary.reads, 0);
    }
}
