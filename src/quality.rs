//! Grading of candidate gap fills from alignment statistics.
//!
//! Each candidate gets one letter per judged criterion. The letters are composed into a
//! quality string (e.g. `AB` or `ABA`) and the string is matched against the acceptance
//! rule of the current reference mode.

use std::fmt::{self, Display, Write as _};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::io::fasta::SequenceRecord;
use crate::io::stats::{QryQryRow, RefQryRow};

/// A single quality letter, best first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub const WORST: Grade = Grade::D;

    /// `A` or `B`
    pub fn is_good(self) -> bool {
        self <= Grade::B
    }

    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

impl TryFrom<char> for Grade {
    type Error = &'static str;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'A' => Ok(Self::A),
            'B' => Ok(Self::B),
            'C' => Ok(Self::C),
            'D' => Ok(Self::D),
            _ => Err("Invalid quality letter")
        }
    }
}

impl TryFrom<&str> for Grade {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Grade::try_from(c),
            _ => Err("Quality should be a single letter")
        }
    }
}

/// Worst grade of a set of rows, `D` if there is none.
fn worst(grades: impl Iterator<Item = Grade>) -> Grade {
    grades.max().unwrap_or(Grade::WORST)
}

/// Composed quality of a candidate, one letter per criterion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualityGrade(SmallVec<[Grade; 3]>);

impl QualityGrade {
    pub fn new(grades: &[Grade]) -> Self {
        QualityGrade(SmallVec::from_slice(grades))
    }

    pub fn grades(&self) -> &[Grade] {
        &self.0
    }
}

impl Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|g| f.write_char(g.letter()))
    }
}

/// Which breakpoint pair a candidate was assembled from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    /// assembled from the `bkpt1` probes, left to right
    Forward,
    /// assembled from the `bkpt2` probes, i.e. the reverse complement view
    Reverse,
}

impl Strand {
    /// Strand tag used in the statistics tables
    pub fn tag(self) -> &'static str {
        match self {
            Self::Forward => "fwd",
            Self::Reverse => "rev",
        }
    }
}

/// One candidate insertion returned by the assembler, relabeled with its solution suffix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub solution: String,
    pub strand: Strand,
    pub sequence: Vec<u8>,
}

impl Candidate {
    /// Relabel an insertion record. The solution index is the last word of the record
    /// description when the assembler reported several solutions, `1/1` otherwise.
    ///
    /// Returns `None` for records that do not originate from a breakpoint probe.
    pub fn from_insertion(record: &SequenceRecord) -> Option<Candidate> {
        let probe = record.name.split('_').next()?;
        let strand = match probe.chars().last()? {
            '1' => Strand::Forward,
            '2' => Strand::Reverse,
            _ => return None,
        };

        let solution = record.description.as_deref()
            .filter(|d| d.contains("solution"))
            .and_then(|d| d.split_whitespace().last())
            .unwrap_or("1/1")
            .to_string();

        Some(Candidate {
            id: format!("{}_sol_{}", record.name, solution),
            solution,
            strand,
            sequence: record.sequence.clone(),
        })
    }

    pub fn to_record(&self) -> SequenceRecord {
        SequenceRecord::new(self.id.clone(), None, self.sequence.clone())
    }

    fn matches_ref_row(&self, row: &RefQryRow) -> bool {
        self.id.contains(&row.solution) && row.strand == self.strand.tag()
    }

    fn matches_self_slot(&self, slot: &str) -> bool {
        slot.contains(&self.solution) && slot.contains(self.strand.tag())
    }
}

/// What the candidates are compared against
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GradingMode {
    /// A reference sequence of the gap itself
    Reference,

    /// The flanking contigs; rows are split by the scaffold they align to
    Contigs { left: String, right: String },
}

#[derive(Clone, Debug)]
pub struct GradedCandidate {
    pub candidate: Candidate,
    pub grade: QualityGrade,
    pub accepted: bool,
}

impl GradedCandidate {
    /// The candidate record annotated with its grade
    pub fn to_record(&self) -> SequenceRecord {
        SequenceRecord::new(
            self.candidate.id.clone(),
            Some(format!("Quality {}", self.grade)),
            self.candidate.sequence.clone()
        )
    }
}

/// Grades of a whole assembler output, with the acceptance state of each strand
#[derive(Clone, Debug, Default)]
pub struct BatchVerdict {
    pub graded: Vec<GradedCandidate>,
    pub forward_accepted: bool,
    pub reverse_accepted: bool,
}

impl BatchVerdict {
    pub fn both_strands(&self) -> bool {
        self.forward_accepted && self.reverse_accepted
    }

    pub fn accepted(&self) -> impl Iterator<Item = &GradedCandidate> {
        self.graded.iter().filter(|g| g.accepted)
    }
}

pub struct Classifier {
    mode: GradingMode,
    extension: usize,
}

impl Classifier {
    pub fn new(mode: GradingMode, extension: usize) -> Self {
        Self { mode, extension }
    }

    pub fn grade(&self, candidate: &Candidate, ref_rows: &[RefQryRow], self_rows: &[QryQryRow]) -> QualityGrade {
        let matching = || ref_rows.iter().filter(|row| candidate.matches_ref_row(row));

        let mut grades: SmallVec<[Grade; 3]> = SmallVec::new();
        match &self.mode {
            GradingMode::Reference => {
                grades.push(worst(matching().map(|row| row.quality)));
            },
            GradingMode::Contigs { left, right } => {
                grades.push(worst(matching().filter(|row| &row.reference == left).map(|row| row.quality)));
                grades.push(worst(matching().filter(|row| &row.reference == right).map(|row| row.quality)));
            },
        }

        grades.push(worst(
            self_rows.iter()
                .filter(|row| candidate.matches_self_slot(&row.solution1) || candidate.matches_self_slot(&row.solution2))
                .map(|row| row.quality)
        ));

        QualityGrade(grades)
    }

    /// Whether a composed grade satisfies the acceptance rule of the current mode
    pub fn accepts(&self, grade: &QualityGrade) -> bool {
        match (&self.mode, grade.grades()) {
            (GradingMode::Reference, &[reference, own]) => reference.is_good() && own.is_good(),
            (GradingMode::Contigs { .. }, &[left, right, own]) => match left {
                Grade::A => right.is_good() && own.is_good(),
                Grade::B => right == Grade::A && own.is_good(),
                _ => false,
            },
            _ => false,
        }
    }

    /// Fills no longer than both extensions together only repeat the flanks.
    pub fn is_long_enough(&self, candidate: &Candidate) -> bool {
        candidate.sequence.len() > 2 * self.extension
    }

    pub fn classify(&self, candidates: Vec<Candidate>, ref_rows: &[RefQryRow], self_rows: &[QryQryRow]) -> BatchVerdict {
        let mut verdict = BatchVerdict::default();

        for candidate in candidates {
            let grade = self.grade(&candidate, ref_rows, self_rows);
            let accepted = self.is_long_enough(&candidate) && self.accepts(&grade);
            debug!(id = %candidate.id, %grade, accepted, "graded candidate");

            if accepted {
                match candidate.strand {
                    Strand::Forward => verdict.forward_accepted = true,
                    Strand::Reverse => verdict.reverse_accepted = true,
                }
            }

            verdict.graded.push(GradedCandidate { candidate, grade, accepted });
        }

        verdict
    }
}
