//! D gene assignment by direct alignment of the junction.

use crate::alignment::{midline, AlignmentSpan, PairwiseAligner};
use crate::annotate::{AlignedSegment, Annotators, NtMutation};
use crate::errors::AssignmentError;
use crate::params::ScoringParams;
use crate::sequence::reverse_complement;
use std::cmp::Reverse;
use vdj_reference::GermlineSet;
use vdj_types::{Segment, Strand};

/// Alignment of the junction against one D allele, read on `strand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiversityAlignment {
    pub strand: Strand,
    pub span: AlignmentSpan,
}

/// The D assignment of one junction. Coordinates are 0-based half-open,
/// query coordinates relative to the junction. The germline coordinates of a
/// minus strand hit refer to the reverse complemented allele.
#[derive(Debug, Clone)]
pub struct DiversitySearchResult {
    pub id: String,
    pub input_sequence: String,
    pub alignments: Vec<DiversityAlignment>,
    /// `None` unless the best score exceeds the significance floor.
    pub top_germline: Option<String>,
    pub strand: Strand,
    pub query_alignment: String,
    pub germline_alignment: String,
    pub midline: String,
    pub alignment_length: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
    /// 1-based frame of the D germline, `germline_start % 3 + 1`.
    pub reading_frame: usize,
    /// Aligned part of the junction.
    pub sequence: String,
    pub nt_mutations: Vec<NtMutation>,
}

impl DiversitySearchResult {
    /// `alignments` must be sorted best first.
    pub fn new(
        seq_id: &str,
        junction: &str,
        alignments: Vec<DiversityAlignment>,
        floor: i32,
    ) -> Result<Self, AssignmentError> {
        let Some(top) = alignments.first() else {
            return Err(AssignmentError::NoCandidate {
                id: seq_id.to_string(),
                segment: Segment::D,
            });
        };
        let span = &top.span;
        let (query_alignment, germline_alignment) = span.gapped();
        Ok(DiversitySearchResult {
            id: seq_id.to_string(),
            input_sequence: junction.to_string(),
            top_germline: (span.score() > floor).then(|| span.target_id.clone()),
            strand: top.strand,
            midline: midline(&query_alignment, &germline_alignment),
            alignment_length: germline_alignment.len(),
            query_start: span.query_begin(),
            query_end: span.query_end(),
            germline_start: span.target_begin(),
            germline_end: span.target_end(),
            reading_frame: span.target_begin() % 3 + 1,
            sequence: span.aligned_query().to_string(),
            query_alignment,
            germline_alignment,
            nt_mutations: Vec::new(),
            alignments,
        })
    }

    fn top(&self) -> &AlignmentSpan {
        &self.alignments[0].span
    }

    /// Name of the best scoring allele, significant or not.
    pub fn best_germline(&self) -> &str {
        &self.top().target_id
    }

    pub fn top_score(&self) -> i32 {
        self.top().score()
    }

    pub fn all_germlines(&self) -> Vec<&str> {
        self.alignments
            .iter()
            .map(|a| a.span.target_id.as_str())
            .collect()
    }

    pub fn all_scores(&self) -> Vec<i32> {
        self.alignments.iter().map(|a| a.span.score()).collect()
    }

    pub fn is_significant(&self) -> bool {
        self.top_germline.is_some()
    }

    pub fn aligned_segment(&self) -> AlignedSegment<'_> {
        AlignedSegment {
            gene: self.best_germline(),
            segment: Segment::D,
            query_alignment: &self.query_alignment,
            germline_alignment: &self.germline_alignment,
            query_start: self.query_start,
            query_end: self.query_end,
            germline_start: self.germline_start,
            germline_end: self.germline_end,
            germline_frame: None,
        }
    }

    pub fn annotate(&mut self, annotators: &Annotators) {
        self.nt_mutations = annotators.mutations.nt_mutations(&self.aligned_segment());
    }
}

/// Align `junction` against every D allele on both strands and keep the
/// `keep` best alignments. Equal scores keep database order, with every plus
/// strand alignment ahead of the minus strand ones.
pub fn assign_d(
    seq_id: &str,
    junction: &str,
    d_germlines: &GermlineSet,
    aligner: &dyn PairwiseAligner,
    scoring: &ScoringParams,
    keep: usize,
) -> Result<DiversitySearchResult, AssignmentError> {
    let align = |strand, name: &str, target: &str| DiversityAlignment {
        strand,
        span: AlignmentSpan::align(aligner, name, junction, target, scoring),
    };
    let mut alignments = Vec::with_capacity(2 * d_germlines.len());
    for gene in d_germlines {
        let germline = String::from_utf8_lossy(gene.seq()).into_owned();
        alignments.push(align(Strand::Plus, gene.name(), germline.as_str()));
    }
    for gene in d_germlines {
        let rc = reverse_complement(&String::from_utf8_lossy(gene.seq()));
        alignments.push(align(Strand::Minus, gene.name(), rc.as_str()));
    }
    alignments.sort_by_key(|a| Reverse(a.span.score()));
    alignments.truncate(keep);
    DiversitySearchResult::new(seq_id, junction, alignments, scoring.significance_floor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::SmithWaterman;
    use crate::params::DEFAULT_PARAMETERS;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn d_germlines() -> GermlineSet {
        let fasta = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../vdj_reference/test_resources/germlines/human_D.fasta");
        GermlineSet::from_fasta(&fasta, Segment::D).unwrap()
    }

    fn assign(junction: &str) -> DiversitySearchResult {
        assign_d(
            "s1",
            junction,
            &d_germlines(),
            &SmithWaterman,
            &DEFAULT_PARAMETERS.d_alignment,
            DEFAULT_PARAMETERS.d_candidates,
        )
        .unwrap()
    }

    #[test]
    fn test_strong_d() {
        let mut d = assign("GGTACTATGGTTCGGGGAGTTC");
        assert_eq!(d.top_germline.as_deref(), Some("IGHD3-10*01"));
        assert_eq!(d.strand, Strand::Plus);
        assert_eq!(d.all_scores(), vec![57, 22, 18, 15, 15]);
        assert_eq!(
            d.all_germlines(),
            vec![
                "IGHD3-10*01",
                "IGHD3-22*01",
                "IGHD3-22*01",
                "IGHD6-19*01",
                "IGHD3-10*01"
            ]
        );
        assert_eq!((d.query_start, d.query_end), (2, 21));
        assert_eq!((d.germline_start, d.germline_end), (4, 23));
        assert_eq!(d.reading_frame, 2);
        assert_eq!(d.sequence, "TACTATGGTTCGGGGAGTT");
        assert_eq!(d.alignment_length, 19);
        assert_eq!(d.midline, "|".repeat(19));

        d.annotate(&Annotators::default());
        assert!(d.nt_mutations.is_empty());
    }

    #[test]
    fn test_floor_score_is_not_significant() {
        // the best alignment reaches exactly three matches
        let d = assign("CACACA");
        assert_eq!(d.top_score(), 9);
        assert_eq!(d.top_germline, None);
        assert!(!d.is_significant());
        assert_eq!(d.best_germline(), "IGHD3-22*01");
        assert_eq!(d.strand, Strand::Minus);
    }

    #[test]
    fn test_ties_prefer_plus_strand_over_database_order() {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("human_D.fasta");
        std::fs::write(&fasta, ">IGHD1-1*01\nTTTTTTTTTT\n>IGHD2-2*01\nAAAAAAAAAA\n").unwrap();
        let germlines = GermlineSet::from_fasta(&fasta, Segment::D).unwrap();
        let d = assign_d(
            "s1",
            "AAAAAAAAAA",
            &germlines,
            &SmithWaterman,
            &DEFAULT_PARAMETERS.d_alignment,
            DEFAULT_PARAMETERS.d_candidates,
        )
        .unwrap();
        assert_eq!(d.top_germline.as_deref(), Some("IGHD2-2*01"));
        assert_eq!(d.strand, Strand::Plus);
        assert_eq!(d.all_scores(), vec![30, 30, 0, 0]);
        assert_eq!(
            d.all_germlines(),
            vec!["IGHD2-2*01", "IGHD1-1*01", "IGHD1-1*01", "IGHD2-2*01"]
        );
        assert_eq!(d.alignments[1].strand, Strand::Minus);
    }

    #[test]
    fn test_no_alignments() {
        let err = DiversitySearchResult::new("s1", "ACGT", vec![], 9).unwrap_err();
        assert_eq!(
            err,
            AssignmentError::NoCandidate {
                id: "s1".to_string(),
                segment: Segment::D
            }
        );
    }
}
