//! Breakpoint probes seeding the local assembler.
//!
//! For a gap and a k-mer size there are four probes: the forward pair (`bkpt1`) reading
//! the gap from the left scaffold to the right one, and the mirrored pair (`bkpt2`)
//! reading the reverse complement. Each probe is the k-mer lying `extension` bp away from
//! the scaffold end at the gap.

use std::path::Path;

use crate::errors::GapFillError;
use crate::gap::Gap;
use crate::io::fasta::{reverse_complement, write_records_to_path, SequenceRecord};
use crate::io::gfa::SegmentRef;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProbePair {
    Bkpt1,
    Bkpt2,
}

impl ProbePair {
    fn label(self) -> &'static str {
        match self {
            Self::Bkpt1 => "bkpt1",
            Self::Bkpt2 => "bkpt2",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    pub pair: ProbePair,
    /// `true` for the k-mer preceding the gap
    pub is_left: bool,
    pub scaffold: SegmentRef,
    pub sequence: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ProbeSet {
    pub k: usize,
    pub extension: usize,
    pub probes: [Probe; 4],
}

/// The k-mer ending `extension` bp before the end of `seq`
fn tail_kmer(seq: &[u8], k: usize, extension: usize) -> Vec<u8> {
    let end = seq.len() - extension;
    seq[end - k..end].to_vec()
}

/// The k-mer starting `extension` bp after the start of `seq`
fn head_kmer(seq: &[u8], k: usize, extension: usize) -> Vec<u8> {
    seq[extension..extension + k].to_vec()
}

impl ProbeSet {
    /// Build the probes from the orientation-corrected scaffold sequences.
    ///
    /// Returns `None` when a scaffold is too short to hold a k-mer after trimming
    /// `extension`, in which case nothing can be assembled for this `k`.
    pub fn build(gap: &Gap, left_seq: &[u8], right_seq: &[u8], k: usize, extension: usize) -> Option<ProbeSet> {
        if k == 0 || left_seq.len() < extension + k || right_seq.len() < extension + k {
            return None;
        }

        let left_rc = reverse_complement(left_seq);
        let right_rc = reverse_complement(right_seq);
        let inverted = |r: SegmentRef| SegmentRef { orient: r.orient.invert(), ..r };

        let probes = [
            Probe {
                pair: ProbePair::Bkpt1,
                is_left: true,
                scaffold: gap.left.reference(),
                sequence: tail_kmer(left_seq, k, extension),
            },
            Probe {
                pair: ProbePair::Bkpt1,
                is_left: false,
                scaffold: gap.right.reference(),
                sequence: head_kmer(right_seq, k, extension),
            },
            Probe {
                pair: ProbePair::Bkpt2,
                is_left: true,
                scaffold: inverted(gap.right.reference()),
                sequence: tail_kmer(&right_rc, k, extension),
            },
            Probe {
                pair: ProbePair::Bkpt2,
                is_left: false,
                scaffold: inverted(gap.left.reference()),
                sequence: head_kmer(&left_rc, k, extension),
            },
        ];

        Some(ProbeSet { k, extension, probes })
    }

    pub fn to_records(&self, gap: &Gap) -> Vec<SequenceRecord> {
        self.probes.iter()
            .map(|p| SequenceRecord::new(
                format!("{}_GapID.{}_Gaplen.{}", p.pair.label(), gap.label(), gap.length),
                Some(format!(
                    "{}_kmer.{}_len.{} offset_rm",
                    if p.is_left { "left" } else { "right" },
                    p.scaffold,
                    self.k
                )),
                p.sequence.clone(),
            ))
            .collect()
    }

    pub fn write(&self, gap: &Gap, path: &Path) -> Result<(), GapFillError> {
        write_records_to_path(path, &self.to_records(gap))
    }
}
