//! Annotation of aligned gene segments and of the assembled VDJ region.
//!
//! Each concern is a strategy trait with a default implementation. The
//! [`Annotators`] bundle is built once and shared by every sequence.

use amino::{codon_to_aa, find_motif, has_stop_codon};
use serde::Serialize;
use vdj_types::{Segment, VdjChain, VdjRegion};

/// Borrowed view of one aligned segment. Positions are 0-based; query
/// positions are relative to the sequence the segment was searched in.
#[derive(Debug, Clone, Copy)]
pub struct AlignedSegment<'a> {
    pub gene: &'a str,
    pub segment: Segment,
    pub query_alignment: &'a str,
    pub germline_alignment: &'a str,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
    /// Germline position modulo 3 at which codons start, when known.
    pub germline_frame: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indel {
    pub query_position: usize,
    pub germline_position: usize,
    pub len: usize,
    pub sequence: String,
    pub in_frame: bool,
}

/// Indels of one alignment and the correction they imply for the query end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndelReport {
    /// Runs of bases present only in the query.
    pub insertions: Vec<Indel>,
    /// Runs of bases present only in the germline.
    pub deletions: Vec<Indel>,
    pub fs_adjustment: isize,
    pub nfs_adjustment: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionSpan {
    pub region: VdjRegion,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NtMutation {
    pub position: usize,
    pub germline: char,
    pub query: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AaMutation {
    /// Residue index in the germline translation.
    pub position: usize,
    pub germline: char,
    pub query: char,
}

/// Everything `annotate()` derives for one V or J assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentAnnotation {
    pub insertions: Vec<Indel>,
    pub deletions: Vec<Indel>,
    pub fs_indel_adjustment: isize,
    pub nfs_indel_adjustment: isize,
    pub regions: Vec<RegionSpan>,
    pub nt_mutations: Vec<NtMutation>,
    pub aa_mutations: Vec<AaMutation>,
}

impl SegmentAnnotation {
    pub fn has_frameshift_indel(&self) -> bool {
        self.fs_indel_adjustment != 0
            || self.insertions.iter().any(|indel| !indel.in_frame)
    }
}

/// The assembled VDJ region, as seen by the junction and productivity checks.
/// Positions are in VDJ region coordinates.
#[derive(Debug, Clone, Copy)]
pub struct VdjContext<'a> {
    pub chain: VdjChain,
    pub vdj_nt: &'a str,
    pub vdj_aa: &'a str,
    /// Nucleotide offset of the first translated codon.
    pub frame_offset: usize,
    pub v_end: usize,
    pub j_start: usize,
    pub j_germline_start: usize,
    pub j_germline_frame: Option<usize>,
    pub frameshift_indels: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Junction {
    pub start: usize,
    pub end: usize,
    pub nt: String,
    pub aa: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductivityStatus {
    pub has_junction: bool,
    pub in_frame: bool,
    pub no_premature_stop: bool,
    pub no_frameshift_indel: bool,
}

impl ProductivityStatus {
    pub fn productive(&self) -> bool {
        self.has_junction && self.in_frame && self.no_premature_stop && self.no_frameshift_indel
    }
}

pub trait IndelFinder: Send + Sync {
    fn find_indels(&self, segment: &AlignedSegment<'_>) -> IndelReport;
}

pub trait RegionMapper: Send + Sync {
    fn regions(&self, segment: &AlignedSegment<'_>) -> Vec<RegionSpan>;
}

pub trait MutationCataloguer: Send + Sync {
    fn nt_mutations(&self, segment: &AlignedSegment<'_>) -> Vec<NtMutation>;
    fn aa_mutations(&self, segment: &AlignedSegment<'_>) -> Vec<AaMutation>;
}

pub trait JunctionFinder: Send + Sync {
    fn find_junction(&self, vdj: &VdjContext<'_>) -> Option<Junction>;
}

pub trait ProductivityChecker: Send + Sync {
    fn check(&self, vdj: &VdjContext<'_>, junction: Option<&Junction>) -> ProductivityStatus;
}

/// Runs of `-` in the gapped strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct GapRunIndels;

impl IndelFinder for GapRunIndels {
    fn find_indels(&self, seg: &AlignedSegment<'_>) -> IndelReport {
        let mut report = IndelReport::default();
        let query = seg.query_alignment.as_bytes();
        let germline = seg.germline_alignment.as_bytes();
        if !query.contains(&b'-') && !germline.contains(&b'-') {
            return report;
        }

        let (mut q, mut g) = (seg.query_start, seg.germline_start);
        let mut col = 0;
        let n = query.len().min(germline.len());
        while col < n {
            let gap_in_germline = germline[col] == b'-';
            let gap_in_query = query[col] == b'-';
            if !gap_in_germline && !gap_in_query {
                q += 1;
                g += 1;
                col += 1;
                continue;
            }
            let gapped = if gap_in_germline { germline } else { query };
            let run = gapped[col..n].iter().take_while(|&&c| c == b'-').count();
            let other = if gap_in_germline { query } else { germline };
            let indel = Indel {
                query_position: q,
                germline_position: g,
                len: run,
                sequence: String::from_utf8_lossy(&other[col..col + run]).into_owned(),
                in_frame: run % 3 == 0,
            };
            if gap_in_germline {
                q += run;
                report.insertions.push(indel);
            } else {
                g += run;
                if indel.in_frame {
                    report.nfs_adjustment -= run as isize;
                } else {
                    report.fs_adjustment -= run as isize;
                }
                report.deletions.push(indel);
            }
            col += run;
        }
        report
    }
}

/// One region per aligned segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentRegions;

impl RegionMapper for SegmentRegions {
    fn regions(&self, seg: &AlignedSegment<'_>) -> Vec<RegionSpan> {
        vec![RegionSpan {
            region: seg.segment.region(),
            query_start: seg.query_start,
            query_end: seg.query_end,
            germline_start: seg.germline_start,
            germline_end: seg.germline_end,
        }]
    }
}

/// Substitutions against the germline. Amino acid changes are only reported
/// when the germline frame is known, and never for codons touching an indel.
#[derive(Debug, Default, Clone, Copy)]
pub struct GermlineMutations;

impl MutationCataloguer for GermlineMutations {
    fn nt_mutations(&self, seg: &AlignedSegment<'_>) -> Vec<NtMutation> {
        let mut mutations = Vec::new();
        let mut position = seg.germline_start;
        for (q, g) in seg.query_alignment.chars().zip(seg.germline_alignment.chars()) {
            if g == '-' {
                continue;
            }
            if q != '-' && q != g {
                mutations.push(NtMutation {
                    position,
                    germline: g,
                    query: q,
                });
            }
            position += 1;
        }
        mutations
    }

    fn aa_mutations(&self, seg: &AlignedSegment<'_>) -> Vec<AaMutation> {
        let Some(frame) = seg.germline_frame else {
            return Vec::new();
        };
        let query = seg.query_alignment.as_bytes();
        let germline = seg.germline_alignment.as_bytes();
        let n = query.len().min(germline.len());
        // alignment column of every germline base
        let columns: Vec<usize> = (0..n).filter(|&col| germline[col] != b'-').collect();

        let mut mutations = Vec::new();
        let first = seg.germline_start + (frame + 3 - seg.germline_start % 3) % 3;
        let mut codon = first;
        while codon + 3 <= seg.germline_start + columns.len() {
            let k = codon - seg.germline_start;
            let (a, b) = (columns[k], columns[k + 2]);
            codon += 3;
            if b - a != 2 || query[a..=b].contains(&b'-') {
                continue;
            }
            let g = codon_to_aa(&germline[a..=b]);
            let q = codon_to_aa(&query[a..=b]);
            if g != q {
                mutations.push(AaMutation {
                    position: (codon - 3 - frame) / 3,
                    germline: g as char,
                    query: q as char,
                });
            }
        }
        mutations
    }
}

/// Junction between the conserved V cysteine and the J `W`/`F` of the
/// `[WF]G.G` motif, both in the frame of the VDJ translation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConservedAnchors;

impl JunctionFinder for ConservedAnchors {
    fn find_junction(&self, vdj: &VdjContext<'_>) -> Option<Junction> {
        let aa = vdj.vdj_aa.as_bytes();
        let codon_start = |i: usize| vdj.frame_offset + 3 * i;
        let cys = (0..aa.len())
            .rev()
            .find(|&i| aa[i] == b'C' && codon_start(i) < vdj.v_end)?;
        let motif = [vdj.chain.j_anchor_residue(), b'G', b'.', b'G'];
        let from = (vdj.j_start.saturating_sub(vdj.frame_offset) / 3).max(cys + 1);
        let anchor = find_motif(aa, &motif, from)?;

        let start = codon_start(cys);
        let end = codon_start(anchor) + 3;
        Some(Junction {
            start,
            end,
            nt: vdj.vdj_nt.get(start..end)?.to_string(),
            aa: vdj.vdj_aa.get(cys..=anchor)?.to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProductivityRules;

impl ProductivityChecker for ProductivityRules {
    fn check(&self, vdj: &VdjContext<'_>, junction: Option<&Junction>) -> ProductivityStatus {
        // the J codon frame carried to VDJ coordinates must match the translation frame
        let in_frame = vdj.j_germline_frame.is_some_and(|frame| {
            let shift = (vdj.j_start + frame) as isize
                - vdj.j_germline_start as isize
                - vdj.frame_offset as isize;
            shift.rem_euclid(3) == 0
        });
        ProductivityStatus {
            has_junction: junction.is_some(),
            in_frame,
            no_premature_stop: !has_stop_codon(vdj.vdj_aa.as_bytes()),
            no_frameshift_indel: !vdj.frameshift_indels,
        }
    }
}

/// The annotation strategies used by the assignment engine.
pub struct Annotators {
    pub indels: Box<dyn IndelFinder>,
    pub regions: Box<dyn RegionMapper>,
    pub mutations: Box<dyn MutationCataloguer>,
    pub junction: Box<dyn JunctionFinder>,
    pub productivity: Box<dyn ProductivityChecker>,
}

impl Default for Annotators {
    fn default() -> Self {
        Annotators {
            indels: Box::new(GapRunIndels),
            regions: Box::new(SegmentRegions),
            mutations: Box::new(GermlineMutations),
            junction: Box::new(ConservedAnchors),
            productivity: Box::new(ProductivityRules),
        }
    }
}

impl Annotators {
    pub fn annotate(&self, segment: &AlignedSegment<'_>) -> SegmentAnnotation {
        let indels = self.indels.find_indels(segment);
        SegmentAnnotation {
            insertions: indels.insertions,
            deletions: indels.deletions,
            fs_indel_adjustment: indels.fs_adjustment,
            nfs_indel_adjustment: indels.nfs_adjustment,
            regions: self.regions.regions(segment),
            nt_mutations: self.mutations.nt_mutations(segment),
            aa_mutations: self.mutations.aa_mutations(segment),
        }
    }
}
