//! Parameter search of a single gap.
//!
//! The search walks the k-mer sizes (outer) and abundance thresholds (inner) in the
//! configured order and runs the assembler once per pair. It moves through the phases
//!
//! ```text
//! NotSearching -> PerK(k) -> PerA(k, a) -> Evaluated(k, a) -> Accepted
//!                   ^           ^                |         -> Exhausted
//!                   |           +---- next a ----+
//!                   +---------------- next k ----+
//! ```
//!
//! and stops at the first pair where both strands produced an accepted fill, keeping
//! only that pair's fills. With `force` every pair is tried and all accepted fills are
//! kept. A search that ends without such a pair keeps the one-strand fills it found.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::breakpoint::ProbeSet;
use crate::config::FillConfig;
use crate::errors::GapFillError;
use crate::gap::Gap;
use crate::io::fasta::{read_records, write_records_to_path, SequenceRecord};
use crate::io::stats::{read_table, QryQryRow, RefQryRow};
use crate::output::{fill_edge, FillEdge, GapOutput};
use crate::quality::{BatchVerdict, Candidate, Classifier, GradedCandidate, GradingMode};
use crate::tools::{remove_if_exists, with_suffix, AlignmentStatistics, BreakpointAssembler, FillRequest, StatsRequest};

/// What to do after a (k, a) pair has been evaluated
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    NextA,
    NextK,
    Exhausted,
}

/// Transition out of `Evaluated(k_ix, a_ix)` for `n_k` k-mer sizes and `n_a`
/// abundance thresholds.
pub fn decide(k_ix: usize, a_ix: usize, n_k: usize, n_a: usize, both_strands: bool, force: bool) -> Decision {
    if both_strands && !force {
        Decision::Accept
    } else if a_ix + 1 < n_a {
        Decision::NextA
    } else if k_ix + 1 < n_k {
        Decision::NextK
    } else {
        Decision::Exhausted
    }
}

#[derive(Debug)]
enum Phase {
    NotSearching,
    PerK { k_ix: usize },
    PerA { k_ix: usize, a_ix: usize },
    Evaluated { k_ix: usize, a_ix: usize, attempt: Attempt },
    Accepted,
    Exhausted,
}

/// Result of one assembler run
#[derive(Debug)]
pub enum Attempt {
    /// Nothing was assembled, or the assembler could not be run
    NoInsertions,
    Evaluated(BatchVerdict),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum GapOutcome {
    /// The assembler never produced a candidate
    NoCandidates,
    /// Candidates were produced but none was accepted
    Rejected,
    AcceptedOneStrand,
    AcceptedBothStrands,
}

#[derive(Clone, Debug, Serialize)]
pub struct CandidateReport {
    pub id: String,
    pub length: usize,
    pub grade: String,
    pub accepted: bool,
}

impl From<&GradedCandidate> for CandidateReport {
    fn from(g: &GradedCandidate) -> Self {
        CandidateReport {
            id: g.candidate.id.clone(),
            length: g.candidate.sequence.len(),
            grade: g.grade.to_string(),
            accepted: g.accepted,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AttemptReport {
    pub k: usize,
    pub abundance: usize,
    pub candidates: Vec<CandidateReport>,
    pub forward_accepted: bool,
    pub reverse_accepted: bool,
    /// The scaffolds were too short for this k and the assembler was not run
    pub skipped: bool,
}

impl AttemptReport {
    fn empty(k: usize, abundance: usize, skipped: bool) -> Self {
        AttemptReport {
            k,
            abundance,
            candidates: Vec::new(),
            forward_accepted: false,
            reverse_accepted: false,
            skipped,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchReport {
    pub gap: String,
    pub outcome: GapOutcome,
    pub attempts: Vec<AttemptReport>,
    pub edges: usize,
}

/// Mutable state of one gap's search, created when the search starts and consumed when
/// it ends.
#[derive(Debug, Default)]
pub struct SearchState {
    pub k: Option<usize>,
    pub abundance: Option<usize>,
    /// Some pair had accepted fills on both strands
    pub solved: bool,
    pub forward_accepted: bool,
    pub reverse_accepted: bool,
    pub any_candidates: bool,
    pub accepted: Vec<FillEdge>,
    pub attempts: Vec<AttemptReport>,
}

impl SearchState {
    pub fn outcome(&self) -> GapOutcome {
        if self.solved {
            GapOutcome::AcceptedBothStrands
        } else if !self.accepted.is_empty() {
            GapOutcome::AcceptedOneStrand
        } else if self.any_candidates {
            GapOutcome::Rejected
        } else {
            GapOutcome::NoCandidates
        }
    }
}

/// Everything the search of one gap reads
pub struct SearchContext<'a, T: ?Sized> {
    pub tools: &'a T,
    pub config: &'a FillConfig,
    pub gap: &'a Gap,
    /// Orientation-corrected scaffold sequences
    pub left_seq: &'a [u8],
    pub right_seq: &'a [u8],
    /// Reads recruited by the barcodes
    pub reads: &'a Path,
    /// Sequence(s) candidates are aligned against
    pub reference: &'a Path,
    pub grading: GradingMode,
    /// Prefix of the gap's files
    pub stem: &'a str,
    pub assembler_dir: &'a Path,
    pub stats_dir: &'a Path,
}

pub struct GapSearch<'a, T: ?Sized> {
    ctx: SearchContext<'a, T>,
    state: SearchState,
    probes: Option<PathBuf>,
    extension: usize,
}

impl<'a, T> GapSearch<'a, T>
where
    T: BreakpointAssembler + AlignmentStatistics + ?Sized,
{
    pub fn new(ctx: SearchContext<'a, T>) -> Self {
        Self { ctx, state: SearchState::default(), probes: None, extension: 0 }
    }

    pub fn run(mut self) -> Result<(GapOutput, SearchReport), GapFillError> {
        let n_k = self.ctx.config.kmer_sizes.len();
        let n_a = self.ctx.config.abundance_thresholds.len();

        let mut phase = Phase::NotSearching;
        let terminal = loop {
            phase = match phase {
                Phase::NotSearching if n_k == 0 || n_a == 0 => Phase::Exhausted,
                Phase::NotSearching => Phase::PerK { k_ix: 0 },
                Phase::PerK { k_ix } => {
                    let k = self.ctx.config.kmer_sizes[k_ix];
                    self.state.k = Some(k);

                    if self.prepare_probes(k)? {
                        Phase::PerA { k_ix, a_ix: 0 }
                    } else {
                        for &a in &self.ctx.config.abundance_thresholds {
                            self.state.attempts.push(AttemptReport::empty(k, a, true));
                        }

                        if k_ix + 1 < n_k {
                            Phase::PerK { k_ix: k_ix + 1 }
                        } else {
                            Phase::Exhausted
                        }
                    }
                },
                Phase::PerA { k_ix, a_ix } => {
                    let k = self.ctx.config.kmer_sizes[k_ix];
                    let a = self.ctx.config.abundance_thresholds[a_ix];
                    self.state.abundance = Some(a);

                    let attempt = self.attempt(k, a)?;
                    Phase::Evaluated { k_ix, a_ix, attempt }
                },
                Phase::Evaluated { k_ix, a_ix, attempt } => {
                    let k = self.ctx.config.kmer_sizes[k_ix];
                    let a = self.ctx.config.abundance_thresholds[a_ix];
                    let both_strands = self.record(k, a, attempt);

                    match decide(k_ix, a_ix, n_k, n_a, both_strands, self.ctx.config.force) {
                        Decision::Accept => Phase::Accepted,
                        Decision::NextA => Phase::PerA { k_ix, a_ix: a_ix + 1 },
                        Decision::NextK => Phase::PerK { k_ix: k_ix + 1 },
                        Decision::Exhausted => Phase::Exhausted,
                    }
                },
                terminal @ (Phase::Accepted | Phase::Exhausted) => break terminal,
            };
        };

        debug!(?terminal, "search finished");
        Ok(self.finish())
    }

    /// Write the probe file for `k`. Returns `false` if the scaffolds are too short for it.
    fn prepare_probes(&mut self, k: usize) -> Result<bool, GapFillError> {
        let ctx = &self.ctx;
        let extension = ctx.config.extension_for(k);

        let Some(probes) = ProbeSet::build(ctx.gap, ctx.left_seq, ctx.right_seq, k, extension) else {
            warn!(k, extension, "scaffolds too short for breakpoint k-mers, skipping this k");
            self.probes = None;
            return Ok(false);
        };

        let path = ctx.assembler_dir.join(format!("{}.k{}.offset_rm.bkpt.fasta", ctx.stem, k));
        probes.write(ctx.gap, &path)?;

        self.probes = Some(path);
        self.extension = extension;

        Ok(true)
    }

    /// Remove the assembler outputs of a pair that produced nothing worth keeping
    fn discard(request: &FillRequest) -> Result<(), GapFillError> {
        remove_if_exists(&request.insertions_path())?;
        remove_if_exists(&request.variants_path())
    }

    fn attempt(&self, k: usize, a: usize) -> Result<Attempt, GapFillError> {
        let ctx = &self.ctx;
        let Some(probes) = &self.probes else {
            return Ok(Attempt::NoInsertions);
        };

        let tag = format!("{}.k{}.a{}", ctx.stem, k, a);
        let prefix = ctx.assembler_dir.join(format!("{tag}.bxu"));
        let request = FillRequest {
            reads: ctx.reads.to_path_buf(),
            breakpoints: probes.clone(),
            k,
            abundance: a,
            max_nodes: ctx.config.max_nodes,
            max_length: ctx.config.max_length_for(ctx.gap.length),
            nb_cores: ctx.config.nb_cores,
            max_memory: ctx.config.max_memory,
            verbosity: ctx.config.verbosity,
            output_prefix: prefix.clone(),
        };

        info!(k, a, "gap-filling");
        match ctx.tools.fill(&request, &tag) {
            Ok(()) => (),
            Err(e) if !e.is_fatal() => warn!(k, a, error = %e, "assembler could not be run"),
            Err(e) => return Err(e),
        }

        let insertions = request.insertions_path();
        let has_output = fs::metadata(&insertions).map(|m| m.len() > 0).unwrap_or(false);
        if !has_output {
            Self::discard(&request)?;
            return Ok(Attempt::NoInsertions);
        }

        let candidates: Vec<Candidate> = read_records(&insertions)?
            .iter()
            .filter_map(Candidate::from_insertion)
            .collect();
        if candidates.is_empty() {
            Self::discard(&request)?;
            return Ok(Attempt::NoInsertions);
        }
        info!(k, a, candidates = candidates.len(), "assembled candidate fills");

        let relabeled = with_suffix(&prefix, ".relabeled.insertions.fasta");
        let records: Vec<SequenceRecord> = candidates.iter().map(Candidate::to_record).collect();
        write_records_to_path(&relabeled, &records)?;

        let stats = StatsRequest {
            query: relabeled.clone(),
            reference: ctx.reference.to_path_buf(),
            extension: self.extension,
            prefix: tag.clone(),
            out_dir: ctx.stats_dir.to_path_buf(),
        };
        match ctx.tools.align_stats(&stats, &tag) {
            Ok(()) => (),
            Err(e) if !e.is_fatal() => warn!(k, a, error = %e, "alignment statistics could not be run"),
            Err(e) => return Err(e),
        }

        let ref_rows: Vec<RefQryRow> = read_table(&stats.ref_qry_path())?;
        let self_rows: Vec<QryQryRow> = read_table(&stats.qry_qry_path())?;

        let classifier = Classifier::new(ctx.grading.clone(), self.extension);
        let verdict = classifier.classify(candidates, &ref_rows, &self_rows);

        let annotated: Vec<SequenceRecord> = verdict.graded.iter().map(GradedCandidate::to_record).collect();
        write_records_to_path(&insertions, &annotated)?;
        remove_if_exists(&relabeled)?;

        if verdict.accepted().next().is_none() {
            Self::discard(&request)?;
        }

        Ok(Attempt::Evaluated(verdict))
    }

    /// Fold an attempt into the search state; returns whether both strands were accepted.
    fn record(&mut self, k: usize, a: usize, attempt: Attempt) -> bool {
        let verdict = match attempt {
            Attempt::NoInsertions => {
                debug!(k, a, "no insertion found");
                self.state.attempts.push(AttemptReport::empty(k, a, false));
                return false;
            },
            Attempt::Evaluated(verdict) => verdict,
        };

        self.state.any_candidates = true;
        self.state.forward_accepted |= verdict.forward_accepted;
        self.state.reverse_accepted |= verdict.reverse_accepted;
        self.state.solved |= verdict.both_strands();

        // the accepting pair's fills replace the one-strand fills of earlier pairs
        if verdict.both_strands() && !self.ctx.config.force {
            self.state.accepted.clear();
        }
        for graded in verdict.accepted() {
            self.state.accepted.push(fill_edge(self.ctx.gap, graded, k, a, self.extension));
        }

        info!(
            k, a,
            forward = verdict.forward_accepted,
            reverse = verdict.reverse_accepted,
            "graded candidate fills"
        );

        self.state.attempts.push(AttemptReport {
            k,
            abundance: a,
            candidates: verdict.graded.iter().map(CandidateReport::from).collect(),
            forward_accepted: verdict.forward_accepted,
            reverse_accepted: verdict.reverse_accepted,
            skipped: false,
        });

        verdict.both_strands()
    }

    fn finish(self) -> (GapOutput, SearchReport) {
        let outcome = self.state.outcome();
        let edges = self.state.accepted.len();
        info!(?outcome, edges, "gap search done");

        let report = SearchReport {
            gap: self.ctx.gap.label(),
            outcome,
            attempts: self.state.attempts,
            edges,
        };

        (GapOutput::from_edges(self.ctx.gap, self.state.accepted), report)
    }
}
