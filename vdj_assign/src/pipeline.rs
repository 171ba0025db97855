//! Per-file assignment: V search, J search, D assignment and assembly.

use crate::alignment::{PairwiseAligner, SmithWaterman};
use crate::annotate::Annotators;
use crate::diversity::{assign_d, DiversitySearchResult};
use crate::errors::{AssignmentError, SearchError};
use crate::germline::GermlineSearchResult;
use crate::output::write_json_lines;
use crate::params::AssignParameters;
use crate::rearrangement::Rearrangement;
use crate::search::{BlastnSearch, Candidate, GermlineSearch, NativeSearch};
use crate::sequence::Sequence;
use anyhow::{Context, Result};
use bio::io::fasta;
use log::{debug, info};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vdj_reference::GermlineReference;
use vdj_types::{Segment, VdjChain};

/// Result of assigning one batch of sequences.
#[derive(Debug, Default)]
pub struct Assignment {
    pub sequences: usize,
    pub v_failures: usize,
    pub j_failures: usize,
    /// One entry per sequence with both a V and a J assignment, in input order.
    pub rearrangements: Vec<Rearrangement>,
}

impl Assignment {
    pub fn rearranged(&self) -> impl Iterator<Item = &Rearrangement> {
        self.rearrangements.iter().filter(|r| r.rearrangement)
    }

    pub fn failed_rearrangements(&self) -> usize {
        self.rearrangements.len() - self.rearranged().count()
    }

    pub fn productive(&self) -> usize {
        self.rearranged().filter(|r| r.productive()).count()
    }

    pub fn unproductive(&self) -> usize {
        self.rearranged().count() - self.productive()
    }
}

/// Per-file counts reported by [`Assigner::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sequences: usize,
    pub v_failures: usize,
    pub j_failures: usize,
    pub failed_rearrangements: usize,
    pub rearrangements: usize,
    pub productive: usize,
}

impl fmt::Display for AssignmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} sequences, {} rearrangements ({} productive), {} V failures, {} J failures, {} failed rearrangements -> {}",
            self.input.display(),
            self.sequences,
            self.rearrangements,
            self.productive,
            self.v_failures,
            self.j_failures,
            self.failed_rearrangements,
            self.output.display(),
        )
    }
}

/// The assignment engine. Germline databases, search driver, aligner and
/// annotators are shared by every file processed.
pub struct Assigner {
    reference: Arc<GermlineReference>,
    search: Box<dyn GermlineSearch>,
    aligner: Box<dyn PairwiseAligner>,
    annotators: Annotators,
    params: AssignParameters,
}

impl Assigner {
    pub fn new(
        reference: Arc<GermlineReference>,
        search: Box<dyn GermlineSearch>,
        params: AssignParameters,
    ) -> Self {
        Assigner {
            reference,
            search,
            aligner: Box::new(SmithWaterman),
            annotators: Annotators::default(),
            params,
        }
    }

    /// Search the germline databases with the external `blastn` program.
    pub fn blastn(reference: Arc<GermlineReference>, params: AssignParameters) -> Self {
        let search = BlastnSearch::new(reference.clone(), &params);
        Assigner::new(reference, Box::new(search), params)
    }

    /// Search the germline databases in process.
    pub fn native(reference: Arc<GermlineReference>, params: AssignParameters) -> Self {
        let search = NativeSearch::new(reference.clone(), &params);
        Assigner::new(reference, Box::new(search), params)
    }

    pub fn with_aligner(mut self, aligner: Box<dyn PairwiseAligner>) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn with_annotators(mut self, annotators: Annotators) -> Self {
        self.annotators = annotators;
        self
    }

    pub fn params(&self) -> &AssignParameters {
        &self.params
    }

    fn search(
        &self,
        queries: &[Sequence],
        segment: Segment,
    ) -> Result<Vec<Vec<Candidate>>, SearchError> {
        let results = self.search.search(queries, segment)?;
        if results.len() != queries.len() {
            return Err(SearchError::ResultCount {
                expected: queries.len(),
                found: results.len(),
            });
        }
        Ok(results)
    }

    /// Assign the V gene and orient the sequence to match it.
    fn assign_v(
        &self,
        sequence: Sequence,
        candidates: Vec<Candidate>,
    ) -> Result<(Sequence, GermlineSearchResult), AssignmentError> {
        let species = self.reference.species();
        let mut v = GermlineSearchResult::new(
            sequence.id(),
            Segment::V,
            candidates,
            sequence.sequence(),
            species,
        )?;
        let gene = v.top_germline().to_string();
        let sequence = match v.realign_variable(
            &gene,
            &sequence,
            self.reference.germlines(Segment::V),
            self.aligner.as_ref(),
            &self.params.v_realignment,
        )? {
            Some(flipped) => flipped,
            None => sequence,
        };
        v.annotate(&self.annotators);

        let trailing = sequence.len().saturating_sub(v.trailing_start());
        if trailing < self.params.min_v_trailing_nt {
            return Err(AssignmentError::BoundaryGuard {
                id: sequence.id().to_string(),
                trailing,
                minimum: self.params.min_v_trailing_nt,
            });
        }
        debug!("{}: assigned V gene {} ({})", sequence.id(), gene, v.strand);
        Ok((sequence, v))
    }

    fn assign_j(
        &self,
        j_input: &Sequence,
        candidates: Vec<Candidate>,
    ) -> Result<GermlineSearchResult, AssignmentError> {
        let mut j = GermlineSearchResult::new(
            j_input.id(),
            Segment::J,
            candidates,
            j_input.sequence(),
            self.reference.species(),
        )?;
        let gene = j.top_germline().to_string();
        j.realign_joining(
            &gene,
            self.reference.germlines(Segment::J),
            self.aligner.as_ref(),
            &self.params.j_realignment,
        )?;
        j.annotate(&self.annotators);
        debug!("{}: assigned J gene {}", j_input.id(), gene);
        Ok(j)
    }

    /// D assignment of the junction between the V end and the J start.
    fn assign_d(
        &self,
        sequence: &Sequence,
        v: &GermlineSearchResult,
        j: &GermlineSearchResult,
    ) -> Option<DiversitySearchResult> {
        if !v.chain.is_some_and(VdjChain::has_diversity) {
            return None;
        }
        let start = v.trailing_start();
        let junction = sequence.region(start, Some(start + j.query_start));
        if junction.is_empty() {
            return None;
        }
        match assign_d(
            sequence.id(),
            junction,
            self.reference.germlines(Segment::D),
            self.aligner.as_ref(),
            &self.params.d_alignment,
            self.params.d_candidates,
        ) {
            Ok(mut d) => {
                d.annotate(&self.annotators);
                debug!(
                    "{}: D gene {}",
                    sequence.id(),
                    d.top_germline.as_deref().unwrap_or("not significant")
                );
                Some(d)
            }
            Err(err) => {
                debug!("{err}");
                None
            }
        }
    }

    /// Assign germline genes to a batch of sequences. Per-sequence failures
    /// are counted; only a failed search fails the batch.
    pub fn assign(&self, sequences: Vec<Sequence>) -> Result<Assignment, SearchError> {
        let mut assignment = Assignment {
            sequences: sequences.len(),
            ..Assignment::default()
        };
        if sequences.is_empty() {
            return Ok(assignment);
        }

        let v_candidates = self.search(&sequences, Segment::V)?;
        let v_assigned: Vec<_> = sequences
            .into_par_iter()
            .zip(v_candidates)
            .map(|(sequence, candidates)| {
                let id = sequence.id().to_string();
                self.assign_v(sequence, candidates).map_err(|err| {
                    debug!("{id}: V assignment failed: {err}");
                    err
                })
            })
            .collect();
        let (with_v, v_failures): (Vec<_>, Vec<_>) =
            v_assigned.into_iter().partition(Result::is_ok);
        assignment.v_failures = v_failures.len();
        let with_v: Vec<(Sequence, GermlineSearchResult)> =
            with_v.into_iter().filter_map(Result::ok).collect();
        if with_v.is_empty() {
            return Ok(assignment);
        }

        let j_inputs: Vec<Sequence> = with_v
            .iter()
            .map(|(sequence, v)| sequence.subsequence(v.trailing_start()))
            .collect();
        let j_candidates = self.search(&j_inputs, Segment::J)?;
        let mut with_vj = Vec::with_capacity(with_v.len());
        for (((sequence, v), j_input), candidates) in
            with_v.into_iter().zip(&j_inputs).zip(j_candidates)
        {
            match self.assign_j(j_input, candidates) {
                Ok(j) => with_vj.push((sequence, v, j)),
                Err(err) => {
                    debug!("{}: J assignment failed: {err}", sequence.id());
                    assignment.j_failures += 1;
                }
            }
        }

        assignment.rearrangements = with_vj
            .into_par_iter()
            .map(|(sequence, v, j)| {
                let d = self.assign_d(&sequence, &v, &j);
                Rearrangement::new(sequence, self.params.uaid_len, v, j, d, &self.annotators)
            })
            .collect();
        Ok(assignment)
    }

    /// Read a FASTA file and assign every record in it.
    pub fn process_sequence_file(&self, seq_file: &Path) -> Result<Assignment> {
        let reader = fasta::Reader::from_file(seq_file)
            .with_context(|| format!("unable to open {}", seq_file.display()))?;
        let sequences = reader
            .records()
            .map(|record| {
                let record = record.with_context(|| seq_file.display().to_string())?;
                Ok(Sequence::from(&record))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("{}: read {} sequences", seq_file.display(), sequences.len());
        self.assign(sequences)
            .with_context(|| format!("germline search failed for {}", seq_file.display()))
    }

    /// Assign one FASTA file and write its rearrangements to
    /// `<output_dir>/<file name>.json`.
    pub fn run(&self, seq_file: &Path, output_dir: &Path) -> Result<AssignmentSummary> {
        let assignment = self.process_sequence_file(seq_file)?;
        let file_name = seq_file
            .file_name()
            .with_context(|| format!("{} is not a file", seq_file.display()))?;
        let mut output = output_dir.join(file_name);
        output.as_mut_os_string().push(".json");
        let written = write_json_lines(&assignment.rearrangements, &output)?;

        let summary = AssignmentSummary {
            input: seq_file.to_path_buf(),
            output,
            sequences: assignment.sequences,
            v_failures: assignment.v_failures,
            j_failures: assignment.j_failures,
            failed_rearrangements: assignment.failed_rearrangements(),
            rearrangements: written,
            productive: assignment.productive(),
        };
        info!("{summary}");
        Ok(summary)
    }
}
