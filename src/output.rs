//! Conversion of search results into lines of the output graph.

use crate::gap::{near_end, Gap, GapSide};
use crate::io::fasta::SequenceRecord;
use crate::io::gfa::{Edge, Field, Position, SegmentRef};
use crate::quality::{GradedCandidate, Strand};

/// Length of the fill between the two anchors: the assembled sequence also spans the
/// trimmed extension and the probe k-mer on each side.
pub fn displacement(fill_len: usize, extension: usize, k: usize) -> i64 {
    fill_len as i64 - 2 * extension as i64 - 2 * k as i64
}

/// An edge closing a gap, with the fill sequence it stands for
#[derive(Clone, Debug)]
pub struct FillEdge {
    pub edge: Edge,
    pub fill: SequenceRecord,
}

fn anchor(reference: &SegmentRef, side: GapSide, length: usize, size: usize) -> (Position, Position) {
    let (beg, end) = near_end(reference.orient, side, length, size);

    (
        Position { value: beg, is_end: beg == length },
        Position { value: end, is_end: end == length },
    )
}

/// Edge for an accepted candidate found with k-mer size `k` and abundance `a`.
///
/// Forward candidates connect the left scaffold to the right one; candidates built from
/// the reverse complement probes connect the inverted right scaffold to the inverted left.
pub fn fill_edge(gap: &Gap, graded: &GradedCandidate, k: usize, a: usize, extension: usize) -> FillEdge {
    let candidate = &graded.candidate;
    let invert = |r: SegmentRef| SegmentRef { orient: r.orient.invert(), ..r };

    let ((from, from_len), (to, to_len)) = match candidate.strand {
        Strand::Forward => (
            (gap.left.reference(), gap.left.length),
            (gap.right.reference(), gap.right.length),
        ),
        Strand::Reverse => (
            (invert(gap.right.reference()), gap.right.length),
            (invert(gap.left.reference()), gap.left.length),
        ),
    };

    let (beg1, end1) = anchor(&from, GapSide::Left, from_len, 2 * k);
    let (beg2, end2) = anchor(&to, GapSide::Right, to_len, 2 * k);

    let eid = format!("{}_k{}_a{}_{}_{}", gap.label(), k, a, candidate.strand.tag(), candidate.solution);
    let disp = displacement(candidate.sequence.len(), extension, k);

    FillEdge {
        edge: Edge {
            eid: eid.clone(),
            sid1: from,
            sid2: to,
            beg1,
            end1,
            beg2,
            end2,
            fields: vec![
                Field::integer("DP", disp),
                Field::string("QL", graded.grade.to_string()),
                Field::string("FS", eid.clone()),
            ],
        },
        fill: SequenceRecord::new(eid, Some(format!("Quality {}", graded.grade)), candidate.sequence.clone()),
    }
}

/// The single outcome a gap contributes to the output graph
#[derive(Clone, Debug)]
pub enum GapOutput {
    /// One edge per accepted candidate
    Filled(Vec<FillEdge>),

    /// The original gap line, unchanged
    Retained(String),
}

impl GapOutput {
    pub fn from_edges(gap: &Gap, edges: Vec<FillEdge>) -> Self {
        if edges.is_empty() {
            Self::Retained(gap.record.clone())
        } else {
            Self::Filled(edges)
        }
    }

    pub fn gfa_lines(&self) -> Vec<String> {
        match self {
            Self::Filled(edges) => edges.iter().map(|e| e.edge.to_string()).collect(),
            Self::Retained(line) => vec![line.clone()],
        }
    }

    pub fn fills(&self) -> impl Iterator<Item = &SequenceRecord> {
        let edges: &[FillEdge] = match self {
            Self::Filled(edges) => edges.as_slice(),
            Self::Retained(_) => &[],
        };

        edges.iter().map(|e| &e.fill)
    }
}
