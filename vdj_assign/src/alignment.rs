//! Pairwise local alignment and the normalized alignment unit shared by all
//! segment assignments.

use crate::params::ScoringParams;
use bio::alignment::pairwise::Aligner;
use bio::alignment::{Alignment, AlignmentOperation};

/// Output of the pairwise alignment primitive. Begin and end are 0-based and
/// inclusive; an empty alignment reports `end = begin - 1`. `Ins` operations
/// are bases present in the query only, `Del` bases present in the target only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAlignment {
    pub operations: Vec<AlignmentOperation>,
    pub query_begin: i32,
    pub query_end: i32,
    pub target_begin: i32,
    pub target_end: i32,
    pub score: i32,
}

impl From<&Alignment> for RawAlignment {
    fn from(aln: &Alignment) -> Self {
        RawAlignment {
            operations: aln.operations.clone(),
            query_begin: aln.xstart as i32,
            query_end: aln.xend as i32 - 1,
            target_begin: aln.ystart as i32,
            target_end: aln.yend as i32 - 1,
            score: aln.score,
        }
    }
}

/// Local alignment of a query against one target.
pub trait PairwiseAligner: Send + Sync {
    fn align(&self, query: &[u8], target: &[u8], scoring: &ScoringParams) -> RawAlignment;
}

/// Smith-Waterman alignment with affine gaps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmithWaterman;

impl PairwiseAligner for SmithWaterman {
    fn align(&self, query: &[u8], target: &[u8], scoring: &ScoringParams) -> RawAlignment {
        let score = |a: u8, b: u8| scoring.score(a, b);
        let mut aligner = Aligner::with_capacity(
            query.len(),
            target.len(),
            scoring.affine_gap_open(),
            scoring.affine_gap_extend(),
            score,
        );
        RawAlignment::from(&aligner.local(query, target))
    }
}

/// One pairwise alignment between a query and a germline target, with
/// coordinates converted to 0-based half-open intervals.
///
/// `aligned_query() == query[query_begin..query_end]` and
/// `aligned_target() == target[target_begin..target_end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentSpan {
    pub target_id: String,
    query: String,
    target: String,
    operations: Vec<AlignmentOperation>,
    score: i32,
    query_begin: usize,
    query_end: usize,
    target_begin: usize,
    target_end: usize,
}

fn half_open(begin: i32, inclusive_end: i32, len: usize) -> (usize, usize) {
    let begin = (begin.max(0) as usize).min(len);
    let end = ((inclusive_end + 1).max(0) as usize).clamp(begin, len);
    (begin, end)
}

impl AlignmentSpan {
    pub fn new(
        target_id: impl Into<String>,
        query: impl Into<String>,
        target: impl Into<String>,
        raw: RawAlignment,
    ) -> Self {
        let query = query.into();
        let target = target.into();
        let (query_begin, query_end) = half_open(raw.query_begin, raw.query_end, query.len());
        let (target_begin, target_end) =
            half_open(raw.target_begin, raw.target_end, target.len());
        AlignmentSpan {
            target_id: target_id.into(),
            query,
            target,
            operations: raw.operations,
            score: raw.score,
            query_begin,
            query_end,
            target_begin,
            target_end,
        }
    }

    /// Align `query` against `target` and wrap the result.
    pub fn align(
        aligner: &dyn PairwiseAligner,
        target_id: &str,
        query: &str,
        target: &str,
        scoring: &ScoringParams,
    ) -> Self {
        let raw = aligner.align(query.as_bytes(), target.as_bytes(), scoring);
        AlignmentSpan::new(target_id, query, target, raw)
    }

    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn target(&self) -> &str {
        &self.target
    }
    pub fn operations(&self) -> &[AlignmentOperation] {
        &self.operations
    }
    pub fn score(&self) -> i32 {
        self.score
    }
    pub fn query_begin(&self) -> usize {
        self.query_begin
    }
    pub fn query_end(&self) -> usize {
        self.query_end
    }
    pub fn target_begin(&self) -> usize {
        self.target_begin
    }
    pub fn target_end(&self) -> usize {
        self.target_end
    }

    pub fn aligned_query(&self) -> &str {
        &self.query[self.query_begin..self.query_end]
    }

    pub fn aligned_target(&self) -> &str {
        &self.target[self.target_begin..self.target_end]
    }

    /// Rebuild the gapped query and germline strings from the alignment
    /// operations. Bases present in only one sequence are paired with `-` in
    /// the other, clips are skipped.
    pub fn gapped(&self) -> (String, String) {
        let mut query = self.aligned_query().chars();
        let mut germline = self.aligned_target().chars();
        let mut gapped_query = String::with_capacity(self.operations.len());
        let mut gapped_germline = String::with_capacity(self.operations.len());
        for op in &self.operations {
            let (q, g) = match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    (query.next(), germline.next())
                }
                AlignmentOperation::Ins => (query.next(), Some('-')),
                AlignmentOperation::Del => (Some('-'), germline.next()),
                AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => continue,
            };
            gapped_query.extend(q);
            gapped_germline.extend(g);
        }
        (gapped_query, gapped_germline)
    }
}

/// `|` where the two gapped strings agree, a space elsewhere. The result is as
/// long as the shorter input.
pub fn midline(query: &str, germline: &str) -> String {
    query
        .bytes()
        .zip(germline.bytes())
        .map(|(q, g)| if q == g { '|' } else { ' ' })
        .collect()
}
