//! V and J gene assignments built from ranked search candidates.

use crate::alignment::{midline, AlignmentSpan, PairwiseAligner};
use crate::annotate::{AlignedSegment, Annotators, SegmentAnnotation};
use crate::errors::AssignmentError;
use crate::params::ScoringParams;
use crate::search::Candidate;
use crate::sequence::Sequence;
use amino::find_motif_frame;
use vdj_reference::GermlineSet;
use vdj_types::{GeneType, Segment, Strand, VdjChain};

/// The germline assignment of one query for the V or J segment.
///
/// Coordinates are 0-based half-open. Query coordinates refer to
/// `input_sequence`, which for J is the part of the query after the V gene.
#[derive(Debug, Clone)]
pub struct GermlineSearchResult {
    pub id: String,
    pub species: String,
    pub segment: Segment,
    pub candidates: Vec<Candidate>,
    pub input_sequence: String,
    pub strand: Strand,
    pub query_alignment: String,
    pub germline_alignment: String,
    pub midline: String,
    pub alignment_length: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
    pub gene_type: Option<GeneType>,
    pub chain: Option<VdjChain>,
    /// Full germline sequence, known once the assignment was re-aligned.
    pub germline_sequence: Option<String>,
    pub realignment_score: Option<i32>,
    pub annotation: SegmentAnnotation,
}

fn germline_sequence(gene: &str, germlines: &GermlineSet) -> Result<String, AssignmentError> {
    germlines
        .get(gene)
        .map(|g| String::from_utf8_lossy(g.seq()).into_owned())
        .ok_or_else(|| AssignmentError::GermlineNotFound {
            gene: gene.to_string(),
            segment: germlines.segment(),
        })
}

impl GermlineSearchResult {
    pub fn new(
        seq_id: &str,
        segment: Segment,
        candidates: Vec<Candidate>,
        input_sequence: &str,
        species: &str,
    ) -> Result<Self, AssignmentError> {
        let Some(top) = candidates.first() else {
            return Err(AssignmentError::NoCandidate {
                id: seq_id.to_string(),
                segment,
            });
        };
        Ok(GermlineSearchResult {
            id: seq_id.to_string(),
            species: species.to_string(),
            segment,
            strand: top.strand,
            midline: midline(&top.query_alignment, &top.germline_alignment),
            query_alignment: top.query_alignment.clone(),
            germline_alignment: top.germline_alignment.clone(),
            alignment_length: top.length,
            query_start: top.query_start.saturating_sub(1),
            query_end: top.query_end,
            germline_start: top.germline_start.min(top.germline_end).saturating_sub(1),
            germline_end: top.germline_start.max(top.germline_end),
            gene_type: GeneType::from_gene_name(&top.gene),
            chain: VdjChain::from_gene_name(&top.gene),
            input_sequence: input_sequence.to_string(),
            germline_sequence: None,
            realignment_score: None,
            annotation: SegmentAnnotation::default(),
            candidates,
        })
    }

    pub fn top_germline(&self) -> &str {
        &self.candidates[0].gene
    }

    pub fn all_germlines(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.gene.as_str()).collect()
    }

    pub fn top_score(&self) -> i32 {
        self.candidates[0].score
    }

    pub fn all_scores(&self) -> Vec<i32> {
        self.candidates.iter().map(|c| c.score).collect()
    }

    pub fn top_evalue(&self) -> f64 {
        self.candidates[0].evalue
    }

    pub fn all_evalues(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.evalue).collect()
    }

    pub fn top_bitscore(&self) -> f64 {
        self.candidates[0].bitscore
    }

    pub fn all_bitscores(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.bitscore).collect()
    }

    /// Re-align the whole query against the full germline `gene` in both
    /// orientations and keep the better one. The forward orientation wins ties.
    ///
    /// Returns the reverse complemented query when that orientation won; the
    /// caller must use it in place of `query` from then on.
    pub fn realign_variable(
        &mut self,
        gene: &str,
        query: &Sequence,
        germlines: &GermlineSet,
        aligner: &dyn PairwiseAligner,
        scoring: &ScoringParams,
    ) -> Result<Option<Sequence>, AssignmentError> {
        let germline = germline_sequence(gene, germlines)?;
        let forward = AlignmentSpan::align(aligner, gene, query.sequence(), &germline, scoring);
        let flipped = query.reverse_complement();
        let reverse = AlignmentSpan::align(aligner, gene, flipped.sequence(), &germline, scoring);
        self.germline_sequence = Some(germline);

        if reverse.score() > forward.score() {
            self.strand = Strand::Minus;
            self.input_sequence = flipped.sequence().to_string();
            self.apply_realignment(&reverse, true);
            Ok(Some(flipped))
        } else {
            self.strand = Strand::Plus;
            self.input_sequence = query.sequence().to_string();
            self.apply_realignment(&forward, true);
            Ok(None)
        }
    }

    /// Re-align the query from the current query start against the germline
    /// from the current germline start. Only the end coordinates move.
    pub fn realign_joining(
        &mut self,
        gene: &str,
        germlines: &GermlineSet,
        aligner: &dyn PairwiseAligner,
        scoring: &ScoringParams,
    ) -> Result<(), AssignmentError> {
        let germline = germline_sequence(gene, germlines)?;
        let query = self.input_sequence.get(self.query_start..).unwrap_or_default();
        let target = germline.get(self.germline_start..).unwrap_or_default();
        let span = AlignmentSpan::align(aligner, gene, query, target, scoring);
        self.germline_sequence = Some(germline);
        self.apply_realignment(&span, false);
        Ok(())
    }

    fn apply_realignment(&mut self, span: &AlignmentSpan, move_start: bool) {
        let (query, germline) = span.gapped();
        self.midline = midline(&query, &germline);
        self.alignment_length = query.len().max(germline.len());
        self.query_alignment = query;
        self.germline_alignment = germline;
        self.realignment_score = Some(span.score());
        if move_start {
            self.query_start = span.query_begin();
            self.germline_start = span.target_begin();
            self.query_end = span.query_end();
            self.germline_end = span.target_end();
        } else {
            self.query_end = self.query_start + span.query_end();
            self.germline_end = self.germline_start + span.target_end();
        }
    }

    /// Germline position modulo 3 at which codons start. V genes are read
    /// from their first base; J genes in the frame of their `[WF]G.G` motif.
    pub fn germline_frame(&self) -> Option<usize> {
        match self.segment {
            Segment::V => Some(0),
            Segment::J => {
                let germline = self.germline_sequence.as_ref()?;
                let anchor = self.chain?.j_anchor_residue();
                find_motif_frame(germline.as_bytes(), &[anchor, b'G', b'.', b'G'])
                    .map(|(frame, _)| frame)
            }
            Segment::D => None,
        }
    }

    pub fn aligned_segment(&self) -> AlignedSegment<'_> {
        AlignedSegment {
            gene: self.top_germline(),
            segment: self.segment,
            query_alignment: &self.query_alignment,
            germline_alignment: &self.germline_alignment,
            query_start: self.query_start,
            query_end: self.query_end,
            germline_start: self.germline_start,
            germline_end: self.germline_end,
            germline_frame: self.germline_frame(),
        }
    }

    pub fn annotate(&mut self, annotators: &Annotators) {
        self.annotation = annotators.annotate(&self.aligned_segment());
    }

    /// Position on the query right after the aligned segment, correcting the
    /// gapped alignment length for bases missing from the query.
    pub fn trailing_start(&self) -> usize {
        let end = (self.query_start + self.query_alignment.len()) as isize
            + self.annotation.fs_indel_adjustment
            + self.annotation.nfs_indel_adjustment;
        end.max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{RawAlignment, SmithWaterman};
    use crate::params::DEFAULT_PARAMETERS;
    use crate::sequence::reverse_complement;
    use bio::alignment::AlignmentOperation;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use vdj_reference::GermlineReference;

    const D_JUNCTION: &str = "GGTACTATGGTTCGGGGAGTTC";

    fn reference() -> GermlineReference {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../vdj_reference/test_resources/germlines");
        GermlineReference::load(&dir, "human").unwrap()
    }

    fn germline(reference: &GermlineReference, segment: Segment, gene: &str) -> String {
        String::from_utf8_lossy(reference.get(segment, gene).unwrap().seq()).into_owned()
    }

    /// A search hit covering `[qstart, qend]` of the query without gaps.
    fn hit(gene: &str, query: &str, qstart: usize, qend: usize, sstart: usize) -> Candidate {
        Candidate::exact(gene, &query[qstart - 1..qend], qstart, sstart)
    }

    #[test]
    fn test_no_candidates() {
        let err = GermlineSearchResult::new("s1", Segment::J, vec![], "ACGT", "human").unwrap_err();
        assert_eq!(
            err,
            AssignmentError::NoCandidate {
                id: "s1".to_string(),
                segment: Segment::J
            }
        );
    }

    #[test]
    fn test_new_converts_coordinates() {
        let mut minus = hit("IGKJ1*01", "ACGTACGTAC", 3, 8, 1);
        minus.germline_start = 30;
        minus.germline_end = 25;
        minus.strand = Strand::Minus;
        let result = GermlineSearchResult::new(
            "s1",
            Segment::J,
            vec![minus, hit("IGKJ2*01", "ACGTACGTAC", 1, 4, 1)],
            "ACGTACGTAC",
            "human",
        )
        .unwrap();
        assert_eq!(result.top_germline(), "IGKJ1*01");
        assert_eq!(result.all_germlines(), vec!["IGKJ1*01", "IGKJ2*01"]);
        assert_eq!(result.all_scores(), vec![6, 4]);
        assert_eq!((result.query_start, result.query_end), (2, 8));
        assert_eq!((result.germline_start, result.germline_end), (24, 30));
        assert_eq!(result.strand, Strand::Minus);
        assert_eq!(result.gene_type, Some(GeneType::Joining));
        assert_eq!(result.chain, Some(VdjChain::Kappa));
        assert_eq!(result.midline, "||||||");
    }

    #[test]
    fn test_realign_variable_extends_truncated_hit() {
        let reference = reference();
        let v = germline(&reference, Segment::V, "IGHV1-3*01");
        let j = germline(&reference, Segment::J, "IGHJ4*02");
        let query = Sequence::new("s1", format!("{v}{D_JUNCTION}{j}"));
        // the coarse search stopped 20 nt short of the V end
        let candidate = hit("IGHV1-3*01", query.sequence(), 1, 274, 1);
        let mut result =
            GermlineSearchResult::new("s1", Segment::V, vec![candidate], query.sequence(), "human")
                .unwrap();
        let flipped = result
            .realign_variable(
                "IGHV1-3*01",
                &query,
                reference.germlines(Segment::V),
                &SmithWaterman,
                &DEFAULT_PARAMETERS.v_realignment,
            )
            .unwrap();
        assert!(flipped.is_none());
        assert_eq!(result.strand, Strand::Plus);
        assert_eq!((result.query_start, result.query_end), (0, 294));
        assert_eq!((result.germline_start, result.germline_end), (0, 294));
        assert_eq!(result.realignment_score, Some(294 * 3));
        assert_eq!(result.query_alignment, v);

        result.annotate(&Annotators::default());
        assert!(result.annotation.insertions.is_empty());
        assert!(result.annotation.nt_mutations.is_empty());
        assert_eq!(result.trailing_start(), 294);
    }

    #[test]
    fn test_realign_variable_flips_reverse_query() {
        let reference = reference();
        let v = germline(&reference, Segment::V, "IGKV1-39*01");
        let j = germline(&reference, Segment::J, "IGKJ1*01");
        let forward = format!("{v}CT{j}");
        let query = Sequence::new("s2", reverse_complement(&forward));
        let candidate = hit("IGKV1-39*01", query.sequence(), 40, 300, 1);
        let mut result =
            GermlineSearchResult::new("s2", Segment::V, vec![candidate], query.sequence(), "human")
                .unwrap();
        let flipped = result
            .realign_variable(
                "IGKV1-39*01",
                &query,
                reference.germlines(Segment::V),
                &SmithWaterman,
                &DEFAULT_PARAMETERS.v_realignment,
            )
            .unwrap()
            .unwrap();
        assert_eq!(flipped.sequence(), forward);
        assert_eq!(flipped.strand(), Strand::Minus);
        assert_eq!(result.strand, Strand::Minus);
        assert_eq!(result.input_sequence, forward);
        assert_eq!((result.query_start, result.query_end), (0, 285));
    }

    /// Scores every alignment the same, whatever the orientation.
    struct FlatAligner;

    impl PairwiseAligner for FlatAligner {
        fn align(&self, query: &[u8], target: &[u8], _: &ScoringParams) -> RawAlignment {
            let len = query.len().min(target.len()) as i32;
            RawAlignment {
                operations: vec![AlignmentOperation::Match; len as usize],
                query_begin: 0,
                query_end: len - 1,
                target_begin: 0,
                target_end: len - 1,
                score: 10,
            }
        }
    }

    #[test]
    fn test_forward_wins_ties() {
        let reference = reference();
        let v = germline(&reference, Segment::V, "IGHV3-23*01");
        let query = Sequence::new("s3", format!("{v}ACGTACGTACGT"));
        let candidate = hit("IGHV3-23*01", query.sequence(), 1, 200, 1);
        let mut result =
            GermlineSearchResult::new("s3", Segment::V, vec![candidate], query.sequence(), "human")
                .unwrap();
        let flipped = result
            .realign_variable(
                "IGHV3-23*01",
                &query,
                reference.germlines(Segment::V),
                &FlatAligner,
                &DEFAULT_PARAMETERS.v_realignment,
            )
            .unwrap();
        assert!(flipped.is_none());
        assert_eq!(result.strand, Strand::Plus);
    }

    #[test]
    fn test_realign_missing_germline() {
        let reference = reference();
        let query = Sequence::new("s4", "ACGTACGTACGTACGTACGT");
        let candidate = hit("IGHV9-99*01", query.sequence(), 1, 20, 1);
        let mut result =
            GermlineSearchResult::new("s4", Segment::V, vec![candidate], query.sequence(), "human")
                .unwrap();
        let err = result
            .realign_variable(
                "IGHV9-99*01",
                &query,
                reference.germlines(Segment::V),
                &SmithWaterman,
                &DEFAULT_PARAMETERS.v_realignment,
            )
            .unwrap_err();
        assert_eq!(
            err,
            AssignmentError::GermlineNotFound {
                gene: "IGHV9-99*01".to_string(),
                segment: Segment::V
            }
        );
    }

    #[test]
    fn test_realign_joining_moves_end_only() {
        let reference = reference();
        let j = germline(&reference, Segment::J, "IGHJ4*02");
        let tail = format!("{D_JUNCTION}{j}");
        // coarse hit covers the J start but not its last 10 nt
        let candidate = hit("IGHJ4*02", &tail, 23, 60, 1);
        let mut result =
            GermlineSearchResult::new("s1", Segment::J, vec![candidate], &tail, "human").unwrap();
        result
            .realign_joining(
                "IGHJ4*02",
                reference.germlines(Segment::J),
                &SmithWaterman,
                &DEFAULT_PARAMETERS.j_realignment,
            )
            .unwrap();
        assert_eq!((result.query_start, result.query_end), (22, 70));
        assert_eq!((result.germline_start, result.germline_end), (0, 48));
        assert_eq!(result.query_alignment, j);
        assert_eq!(result.realignment_score, Some(48 * 3));
        assert_eq!(result.germline_frame(), Some(2));
    }
}
