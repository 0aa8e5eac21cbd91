//! Gaps and their flanking scaffolds, with orientation-aware coordinates.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use crate::errors::GapFillError;
use crate::io::fasta::{find_sequence, reverse_complement};
use crate::io::gfa::{GapLine, GraphFile, Orientation, SegmentRef};

/// Which side of the gap a scaffold occupies
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GapSide {
    Left,
    Right,
}

/// Interval `[start, end)` at the gap-adjacent end of a scaffold of length `length`,
/// in the scaffold's own (forward) coordinates.
///
/// A forward scaffold left of the gap, or a reverse one right of it, touches the gap
/// with its end; the two other cases touch it with their start.
pub fn near_end(orient: Orientation, side: GapSide, length: usize, size: usize) -> (usize, usize) {
    let size = size.min(length);
    match (orient, side) {
        (Orientation::Forward, GapSide::Left) | (Orientation::Reverse, GapSide::Right) => (length - size, length),
        (Orientation::Forward, GapSide::Right) | (Orientation::Reverse, GapSide::Left) => (0, size),
    }
}

/// Chunk size actually used for a gap: if the requested size exceeds either
/// flanking scaffold, both sides use the length of the shorter one.
pub fn clamp_chunk(requested: usize, left_len: usize, right_len: usize) -> usize {
    if requested > left_len || requested > right_len {
        left_len.min(right_len)
    } else {
        requested
    }
}

/// A genomic region descriptor, rendered as `name:start-end`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub contig: String,
    pub start: usize,
    pub end: usize,
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceSource {
    /// The sequence is stored in the segment line itself
    Inline(String),
    /// First record of a FASTA file (`UR` tag)
    File(PathBuf),
    /// Record with the scaffold's name in the contigs file
    Contigs(PathBuf),
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scaffold {
    pub name: String,
    pub orient: Orientation,
    pub length: usize,
    pub side: GapSide,
    pub source: SequenceSource,
}

impl Scaffold {
    pub fn reference(&self) -> SegmentRef {
        SegmentRef { sid: self.name.clone(), orient: self.orient }
    }

    /// Barcode capture window of `size` bp nearest the gap
    pub fn chunk(&self, size: usize) -> Region {
        let (start, end) = near_end(self.orient, self.side, self.length, size);

        Region { contig: self.name.clone(), start, end }
    }

    /// The scaffold sequence, reverse complemented when the scaffold is used in reverse
    /// orientation.
    pub fn sequence(&self) -> Result<Vec<u8>, GapFillError> {
        let forward = match &self.source {
            SequenceSource::Inline(seq) => Some(seq.as_bytes().to_ascii_uppercase()),
            SequenceSource::File(path) => find_sequence(path, None)?,
            SequenceSource::Contigs(path) => find_sequence(path, Some(&self.name))?,
            SequenceSource::Unavailable => None,
        }
        .ok_or_else(|| GapFillError::MissingSequence(self.name.clone()))?;

        Ok(match self.orient {
            Orientation::Forward => forward,
            Orientation::Reverse => reverse_complement(&forward),
        })
    }
}

/// Declared gap length; `*` in the graph means unknown
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GapLength {
    Known(i64),
    Unknown,
}

impl GapLength {
    pub fn value(self) -> Option<i64> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

impl Display for GapLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => write!(f, "*"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Gap {
    pub id: Option<String>,
    pub length: GapLength,
    pub left: Scaffold,
    pub right: Scaffold,
    /// The original gap line, re-emitted verbatim when the gap stays unresolved
    pub record: String,
    pub line_no: usize,
}

impl Gap {
    /// Resolve a gap line against the segments of its graph.
    ///
    /// Relative `UR` paths are taken relative to `graph_dir`. Segments without a
    /// sequence of their own are looked up by name in `contigs`, if given.
    pub fn from_line(
        line: &GapLine,
        graph: &GraphFile,
        graph_dir: &Path,
        contigs: Option<&Path>,
    ) -> Result<Gap, GapFillError> {
        let scaffold = |r: &SegmentRef, side: GapSide| -> Result<Scaffold, GapFillError> {
            let segment = graph.segment(&r.sid)
                .ok_or_else(|| GapFillError::InvalidInput(
                    format!("gap on line {} references unknown segment '{}'", line.line_no, r.sid)
                ))?;

            let source = if let Some(path) = segment.sequence_path() {
                SequenceSource::File(graph_dir.join(path))
            } else if let Some(seq) = &segment.sequence {
                SequenceSource::Inline(seq.clone())
            } else if let Some(path) = contigs {
                SequenceSource::Contigs(path.to_path_buf())
            } else {
                SequenceSource::Unavailable
            };

            Ok(Scaffold { name: r.sid.clone(), orient: r.orient, length: segment.length, side, source })
        };

        Ok(Gap {
            id: line.gid.clone(),
            length: line.disp.map_or(GapLength::Unknown, GapLength::Known),
            left: scaffold(&line.sid1, GapSide::Left)?,
            right: scaffold(&line.sid2, GapSide::Right)?,
            record: line.raw.clone(),
            line_no: line.line_no,
        })
    }

    /// Gap identifier, or `<left>_<right>` when the graph gives none
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}_{}", self.left.reference(), self.right.reference()),
        }
    }

    /// Prefix of every per-gap file in the run directories
    pub fn file_stem(&self, graph_name: &str, chunk: usize) -> String {
        let length = match self.length {
            GapLength::Known(v) => v.to_string(),
            GapLength::Unknown => "NA".to_string(),
        };

        format!("{}.{}.g{}.c{}", graph_name, self.label(), length, chunk)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn scaffold(orient: Orientation, side: GapSide, length: usize, seq: &str) -> Scaffold {
        Scaffold {
            name: "ctg".to_string(),
            orient,
            length,
            side,
            source: SequenceSource::Inline(seq.to_string()),
        }
    }

    #[test]
    fn test_chunk_four_cases() {
        let c = |o, s| scaffold(o, s, 2000, "").chunk(500);

        assert_eq!((c(Orientation::Forward, GapSide::Left).start, c(Orientation::Forward, GapSide::Left).end), (1500, 2000));
        assert_eq!((c(Orientation::Reverse, GapSide::Right).start, c(Orientation::Reverse, GapSide::Right).end), (1500, 2000));
        assert_eq!((c(Orientation::Forward, GapSide::Right).start, c(Orientation::Forward, GapSide::Right).end), (0, 500));
        assert_eq!((c(Orientation::Reverse, GapSide::Left).start, c(Orientation::Reverse, GapSide::Left).end), (0, 500));
        assert_eq!(c(Orientation::Forward, GapSide::Left).to_string(), "ctg:1500-2000");
    }

    #[test]
    fn test_chunk_never_exceeds_scaffold() {
        let region = scaffold(Orientation::Forward, GapSide::Left, 300, "").chunk(500);
        assert_eq!((region.start, region.end), (0, 300));
    }

    #[test]
    fn test_clamp_chunk() {
        assert_eq!(clamp_chunk(2000, 2000, 1800), 1800);
        assert_eq!(clamp_chunk(5000, 2000, 1800), 1800);
        assert_eq!(clamp_chunk(1900, 1800, 2000), 1800);
        assert_eq!(clamp_chunk(1000, 2000, 1800), 1000);
        assert_eq!(clamp_chunk(1800, 2000, 1800), 1800);
    }

    #[test]
    fn test_sequence_orientation() {
        let fwd = scaffold(Orientation::Forward, GapSide::Left, 4, "aacg");
        let rev = scaffold(Orientation::Reverse, GapSide::Left, 4, "aacg");

        assert_eq!(fwd.sequence().unwrap(), b"AACG".to_vec());
        assert_eq!(rev.sequence().unwrap(), b"CGTT".to_vec());

        let missing = Scaffold { source: SequenceSource::Unavailable, ..fwd };
        assert!(matches!(missing.sequence(), Err(GapFillError::MissingSequence(_))));
    }

    #[test]
    fn test_gap_from_line() {
        let input = "H\tVN:Z:2.0\nS\tctg1\t2000\t*\tUR:Z:ctg1.fasta\nS\tctg2\t1800\tACGT\nG\t*\tctg1+\tctg2-\t500\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();
        let gap = Gap::from_line(&graph.gaps[0], &graph, Path::new("/data"), None).unwrap();

        assert_eq!(gap.label(), "ctg1+_ctg2-");
        assert_eq!(gap.length, GapLength::Known(500));
        assert_eq!(gap.left.source, SequenceSource::File(PathBuf::from("/data/ctg1.fasta")));
        assert_eq!(gap.right.source, SequenceSource::Inline("ACGT".to_string()));
        assert_eq!(gap.right.side, GapSide::Right);
        assert_eq!(gap.file_stem("asm.gfa", 1800), "asm.gfa.ctg1+_ctg2-.g500.c1800");
        assert_eq!(gap.record, "G\t*\tctg1+\tctg2-\t500\t*");
    }

    #[test]
    fn test_gap_sequences_from_contigs_file() {
        let dir = tempfile::tempdir().unwrap();
        let contigs = dir.path().join("contigs.fasta");
        std::fs::write(&contigs, ">ctg1 first\nacgtaa\n>ctg2\nGGGTCA\n").unwrap();

        let input = "H\tVN:Z:2.0\nS\tctg1\t6\t*\nS\tctg2\t6\t*\nS\tctg3\t4\tTTTT\nG\tg1\tctg1+\tctg2-\t100\t*\nG\tg2\tctg2+\tctg3+\t*\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();

        let gap = Gap::from_line(&graph.gaps[0], &graph, dir.path(), Some(&contigs)).unwrap();
        assert_eq!(gap.left.source, SequenceSource::Contigs(contigs.clone()));
        assert_eq!(gap.right.source, SequenceSource::Contigs(contigs.clone()));
        assert_eq!(gap.left.sequence().unwrap(), b"ACGTAA".to_vec());
        assert_eq!(gap.right.sequence().unwrap(), b"TGACCC".to_vec());

        // an inline sequence takes precedence over the contigs file
        let gap = Gap::from_line(&graph.gaps[1], &graph, dir.path(), Some(&contigs)).unwrap();
        assert_eq!(gap.left.sequence().unwrap(), b"GGGTCA".to_vec());
        assert_eq!(gap.right.source, SequenceSource::Inline("TTTT".to_string()));
        assert_eq!(gap.file_stem("asm.gfa", 6), "asm.gfa.g2.gNA.c6");
    }

    #[test]
    fn test_gap_missing_from_contigs_file() {
        let dir = tempfile::tempdir().unwrap();
        let contigs = dir.path().join("contigs.fasta");
        std::fs::write(&contigs, ">ctg1\nACGT\n").unwrap();

        let input = "S\tctg1\t4\t*\nS\tctg9\t4\t*\nG\tg1\tctg1+\tctg9+\t10\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();
        let gap = Gap::from_line(&graph.gaps[0], &graph, dir.path(), Some(&contigs)).unwrap();

        match gap.right.sequence() {
            Err(GapFillError::MissingSequence(name)) => assert_eq!(name, "ctg9"),
            _ => panic!("expected a missing sequence"),
        }
    }

    #[test]
    fn test_gap_unknown_segment() {
        let input = "S\tctg1\t2000\t*\nG\tg1\tctg1+\tctg9-\t*\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();
        assert!(Gap::from_line(&graph.gaps[0], &graph, Path::new("."), None).is_err());
    }
}
