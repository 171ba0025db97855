//! Assembly of V, D and J assignments into one VDJ rearrangement.

use crate::annotate::{Annotators, Junction, ProductivityStatus, VdjContext};
use crate::diversity::DiversitySearchResult;
use crate::errors::AttributeDerivationError;
use crate::germline::GermlineSearchResult;
use crate::sequence::Sequence;
use log::debug;
use serde::Serialize;
use vdj_types::{VdjChain, VdjRegion};

/// Half-open interval in VDJ region coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Non-templated nucleotides: one stretch between V and J, or two around D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NRegion {
    Single(Span),
    Split(Span, Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Boundaries {
    pub v: Span,
    pub d: Option<Span>,
    pub n: NRegion,
    pub j: Span,
}

impl Boundaries {
    /// One region code per VDJ nucleotide, e.g. `VVVNNDDDNJJJ`.
    pub fn region_map(&self) -> String {
        let mut map = String::with_capacity(self.j.end);
        let mut push = |region: VdjRegion, span: Span| {
            map.extend(std::iter::repeat(region.code()).take(span.len()));
        };
        push(VdjRegion::V, self.v);
        match (self.n, self.d) {
            (NRegion::Split(n1, n2), Some(d)) => {
                push(VdjRegion::N, n1);
                push(VdjRegion::D, d);
                push(VdjRegion::N, n2);
            }
            (NRegion::Single(n), _) | (NRegion::Split(n, _), None) => push(VdjRegion::N, n),
        }
        push(VdjRegion::J, self.j);
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RearrangementAttributes {
    pub chain: VdjChain,
    pub query_reading_frame: usize,
    /// Start of the VDJ region on the oriented query.
    pub vdj_offset: usize,
    pub boundaries: Boundaries,
    pub region_map: String,
    pub vdj_nt: String,
    pub vdj_aa: String,
    pub junction: Option<Junction>,
    pub productivity: ProductivityStatus,
}

fn ordered(region: &'static str, start: usize, end: usize) -> Result<(), AttributeDerivationError> {
    if start > end {
        return Err(AttributeDerivationError::Unordered { region, start, end });
    }
    Ok(())
}

/// Derive boundaries, VDJ sequences, junction and productivity. `d` is only
/// used when it carries a significant D assignment.
pub fn derive_attributes(
    sequence: &Sequence,
    v: &GermlineSearchResult,
    j: &GermlineSearchResult,
    d: Option<&DiversitySearchResult>,
    annotators: &Annotators,
) -> Result<RearrangementAttributes, AttributeDerivationError> {
    let chain = v.chain.ok_or_else(|| AttributeDerivationError::UnknownChain {
        gene: v.top_germline().to_string(),
    })?;
    let query_reading_frame = v.germline_start % 3;
    let vdj_offset = v.query_start;
    let j_offset = v.trailing_start();
    ordered("V", vdj_offset, j_offset)?;
    let v_end = j_offset - vdj_offset;

    ordered("J", j.query_start, j.query_end)?;
    let j_span = Span::new(v_end + j.query_start, v_end + j.query_end);
    let (d_span, n) = match d.filter(|d| d.is_significant()) {
        Some(d) => {
            let start = v_end + d.query_start;
            let d_span = Span::new(start, start + (d.query_end - d.query_start));
            ordered("N1", v_end, d_span.start)?;
            ordered("N2", d_span.end, j_span.start)?;
            (
                Some(d_span),
                NRegion::Split(
                    Span::new(v_end, d_span.start),
                    Span::new(d_span.end, j_span.start),
                ),
            )
        }
        None => {
            ordered("N", v_end, j_span.start)?;
            (None, NRegion::Single(Span::new(v_end, j_span.start)))
        }
    };
    let boundaries = Boundaries {
        v: Span::new(0, v_end),
        d: d_span,
        n,
        j: j_span,
    };

    let vdj_end = vdj_offset + j_span.end;
    if vdj_end > sequence.len() {
        return Err(AttributeDerivationError::OutOfRange {
            region: "VDJ",
            start: vdj_offset,
            end: vdj_end,
            len: sequence.len(),
        });
    }
    let vdj_nt = sequence.region(vdj_offset, Some(vdj_end)).to_string();
    let frame_offset = (query_reading_frame * 2) % 3;
    let vdj_aa = amino::aa_seq(vdj_nt.as_bytes(), frame_offset);

    let context = VdjContext {
        chain,
        vdj_nt: &vdj_nt,
        vdj_aa: &vdj_aa,
        frame_offset,
        v_end,
        j_start: j_span.start,
        j_germline_start: j.germline_start,
        j_germline_frame: j.germline_frame(),
        frameshift_indels: v.annotation.has_frameshift_indel()
            || j.annotation.has_frameshift_indel(),
    };
    let junction = annotators.junction.find_junction(&context);
    let productivity = annotators.productivity.check(&context, junction.as_ref());

    Ok(RearrangementAttributes {
        chain,
        query_reading_frame,
        vdj_offset,
        region_map: boundaries.region_map(),
        boundaries,
        junction,
        productivity,
        vdj_nt,
        vdj_aa,
    })
}

/// A query with its V, J and optional D assignments. `rearrangement` is true
/// only when the attributes could be derived and a junction was found.
#[derive(Debug, Clone)]
pub struct Rearrangement {
    pub sequence: Sequence,
    pub uaid: String,
    pub v: GermlineSearchResult,
    pub j: GermlineSearchResult,
    pub d: Option<DiversitySearchResult>,
    pub attributes: Option<RearrangementAttributes>,
    pub rearrangement: bool,
}

impl Rearrangement {
    pub fn new(
        sequence: Sequence,
        uaid_len: usize,
        v: GermlineSearchResult,
        j: GermlineSearchResult,
        d: Option<DiversitySearchResult>,
        annotators: &Annotators,
    ) -> Self {
        let uaid = sequence.input().chars().take(uaid_len).collect();
        let attributes = match derive_attributes(&sequence, &v, &j, d.as_ref(), annotators) {
            Ok(attributes) => Some(attributes),
            Err(err) => {
                debug!("{}: no VDJ attributes: {err}", sequence.id());
                None
            }
        };
        let rearrangement = attributes
            .as_ref()
            .is_some_and(|a| a.junction.is_some() && !a.vdj_nt.is_empty());
        if attributes.is_some() && !rearrangement {
            debug!("{}: no junction found", sequence.id());
        }
        Rearrangement {
            sequence,
            uaid,
            v,
            j,
            d,
            attributes,
            rearrangement,
        }
    }

    pub fn id(&self) -> &str {
        self.sequence.id()
    }

    /// True when a significant D gene was assigned.
    pub fn has_diversity(&self) -> bool {
        self.d.as_ref().is_some_and(DiversitySearchResult::is_significant)
    }

    pub fn productive(&self) -> bool {
        self.attributes
            .as_ref()
            .is_some_and(|a| a.productivity.productive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::SmithWaterman;
    use crate::diversity::assign_d;
    use crate::params::DEFAULT_PARAMETERS;
    use crate::search::Candidate;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use vdj_reference::GermlineReference;
    use vdj_types::Segment;

    struct Fixture {
        reference: GermlineReference,
        annotators: Annotators,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../vdj_reference/test_resources/germlines");
            Fixture {
                reference: GermlineReference::load(&dir, "human").unwrap(),
                annotators: Annotators::default(),
            }
        }

        fn germline(&self, segment: Segment, gene: &str) -> String {
            String::from_utf8_lossy(self.reference.get(segment, gene).unwrap().seq()).into_owned()
        }

        /// V and J assignments of a query that carries both genes unmutated,
        /// with `n` nucleotides between them.
        fn assign(
            &self,
            v_gene: &str,
            n: &str,
            j_gene: &str,
        ) -> (Sequence, GermlineSearchResult, GermlineSearchResult) {
            let v_seq = self.germline(Segment::V, v_gene);
            let j_seq = self.germline(Segment::J, j_gene);
            let query = Sequence::new("q1", format!("{v_seq}{n}{j_seq}"));

            let hit = Candidate::exact(v_gene, &v_seq[..200], 1, 1);
            let mut v =
                GermlineSearchResult::new("q1", Segment::V, vec![hit], query.sequence(), "human")
                    .unwrap();
            let flipped = v
                .realign_variable(
                    v_gene,
                    &query,
                    self.reference.germlines(Segment::V),
                    &SmithWaterman,
                    &DEFAULT_PARAMETERS.v_realignment,
                )
                .unwrap();
            assert!(flipped.is_none());
            v.annotate(&self.annotators);

            let tail = query.region(v.trailing_start(), None);
            let hit = Candidate::exact(j_gene, &j_seq, n.len() + 1, 1);
            let mut j = GermlineSearchResult::new("q1", Segment::J, vec![hit], tail, "human").unwrap();
            j.realign_joining(
                j_gene,
                self.reference.germlines(Segment::J),
                &SmithWaterman,
                &DEFAULT_PARAMETERS.j_realignment,
            )
            .unwrap();
            j.annotate(&self.annotators);
            (query, v, j)
        }
    }

    #[test]
    fn test_heavy_chain_with_d() {
        let fx = Fixture::new();
        let (query, v, j) = fx.assign("IGHV1-3*01", "GGTACTATGGTTCGGGGAGTTC", "IGHJ4*02");
        let junction = query.region(v.trailing_start(), Some(v.trailing_start() + j.query_start));
        assert_eq!(junction, "GGTACTATGGTTCGGGGAGTTC");
        let d = assign_d(
            "q1",
            junction,
            fx.reference.germlines(Segment::D),
            &SmithWaterman,
            &DEFAULT_PARAMETERS.d_alignment,
            DEFAULT_PARAMETERS.d_candidates,
        )
        .unwrap();

        let attrs = derive_attributes(&query, &v, &j, Some(&d), &fx.annotators).unwrap();
        insta::assert_json_snapshot!(attrs.boundaries, @r###"
        {
          "v": {
            "start": 0,
            "end": 294
          },
          "d": {
            "start": 296,
            "end": 315
          },
          "n": {
            "split": [
              {
                "start": 294,
                "end": 296
              },
              {
                "start": 315,
                "end": 316
              }
            ]
          },
          "j": {
            "start": 316,
            "end": 364
          }
        }
        "###);
        assert_eq!(attrs.chain, VdjChain::Heavy);
        assert_eq!(attrs.vdj_offset, 0);
        assert_eq!(attrs.region_map.len(), attrs.boundaries.j.end);
        assert_eq!(
            attrs.region_map,
            format!("{}NN{}N{}", "V".repeat(294), "D".repeat(19), "J".repeat(48))
        );
        assert_eq!(attrs.vdj_nt, query.sequence());
        assert!(attrs.vdj_aa.ends_with("YYCARGTMVRGVHYFDYWGQGTLVTVSS"));
        let junction = attrs.junction.as_ref().unwrap();
        assert_eq!(junction.aa, "CARGTMVRGVHYFDYW");
        assert_eq!(junction.nt.len(), 48);
        assert!(attrs.productivity.productive());

        let rearrangement = Rearrangement::new(query, 0, v, j, Some(d), &fx.annotators);
        assert!(rearrangement.rearrangement);
        assert!(rearrangement.has_diversity());
        assert!(rearrangement.productive());
        assert_eq!(rearrangement.uaid, "");
    }

    #[test]
    fn test_light_chain_single_n() {
        let fx = Fixture::new();
        let (query, v, j) = fx.assign("IGKV1-39*01", "CT", "IGKJ1*01");
        let attrs = derive_attributes(&query, &v, &j, None, &fx.annotators).unwrap();
        assert_eq!(attrs.chain, VdjChain::Kappa);
        assert_eq!(
            attrs.boundaries,
            Boundaries {
                v: Span::new(0, 285),
                d: None,
                n: NRegion::Single(Span::new(285, 287)),
                j: Span::new(287, 325),
            }
        );
        assert!(!attrs.region_map.contains('D'));
        assert_eq!(attrs.region_map.len(), 325);
        assert_eq!(attrs.junction.unwrap().aa, "CQQSYSTPLWTF");
        assert!(attrs.productivity.in_frame);

        let rearrangement = Rearrangement::new(query, 4, v, j, None, &fx.annotators);
        assert!(rearrangement.rearrangement);
        assert!(!rearrangement.has_diversity());
        assert_eq!(rearrangement.uaid.len(), 4);
    }

    #[test]
    fn test_exact_join_without_n() {
        let fx = Fixture::new();
        let (query, v, j) = fx.assign("IGHV3-23*01", "", "IGHJ4*02");
        assert_eq!(j.query_start, 0);
        let attrs = derive_attributes(&query, &v, &j, None, &fx.annotators).unwrap();
        assert_eq!(attrs.boundaries.n, NRegion::Single(Span::new(295, 295)));
        assert_eq!(attrs.junction.as_ref().unwrap().aa, "CAKDYFDYW");
        assert_eq!(attrs.region_map, format!("{}{}", "V".repeat(295), "J".repeat(48)));
    }

    #[test]
    fn test_derivation_failures() {
        let fx = Fixture::new();
        let (query, mut v, mut j) = fx.assign("IGLV2-14*01", "GG", "IGLJ2*01");
        assert!(derive_attributes(&query, &v, &j, None, &fx.annotators).is_ok());

        j.query_end += 100;
        let err = derive_attributes(&query, &v, &j, None, &fx.annotators).unwrap_err();
        assert!(matches!(err, AttributeDerivationError::OutOfRange { region: "VDJ", .. }));
        j.query_end -= 100;

        v.chain = None;
        let err = derive_attributes(&query, &v, &j, None, &fx.annotators).unwrap_err();
        assert_eq!(
            err,
            AttributeDerivationError::UnknownChain {
                gene: "IGLV2-14*01".to_string()
            }
        );
        let rearrangement = Rearrangement::new(query, 0, v, j, None, &fx.annotators);
        assert!(!rearrangement.rearrangement);
        assert!(rearrangement.attributes.is_none());
    }

    #[test]
    fn test_region_map_ignores_d_without_split() {
        let boundaries = Boundaries {
            v: Span::new(0, 3),
            d: None,
            n: NRegion::Single(Span::new(3, 5)),
            j: Span::new(5, 7),
        };
        assert_eq!(boundaries.region_map(), "VVVNNJJ");
    }
}
