//! JSON lines output of assigned rearrangements.

use crate::annotate::{NtMutation, ProductivityStatus, SegmentAnnotation};
use crate::diversity::DiversitySearchResult;
use crate::germline::GermlineSearchResult;
use crate::rearrangement::{Boundaries, Rearrangement};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vdj_types::{Strand, VdjChain};

/// The assignment of one gene segment.
#[derive(Debug, Serialize)]
pub struct GeneCall<'a> {
    pub top_germline: &'a str,
    pub all_germlines: Vec<&'a str>,
    pub top_score: i32,
    pub all_scores: Vec<i32>,
    pub evalue: Option<f64>,
    pub bitscore: Option<f64>,
    pub strand: Strand,
    pub query_alignment: &'a str,
    pub germline_alignment: &'a str,
    pub midline: &'a str,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_frame: Option<usize>,
}

impl<'a> From<&'a GermlineSearchResult> for GeneCall<'a> {
    fn from(result: &'a GermlineSearchResult) -> Self {
        GeneCall {
            top_germline: result.top_germline(),
            all_germlines: result.all_germlines(),
            top_score: result.realignment_score.unwrap_or_else(|| result.top_score()),
            all_scores: result.all_scores(),
            evalue: Some(result.top_evalue()),
            bitscore: Some(result.top_bitscore()),
            strand: result.strand,
            query_alignment: &result.query_alignment,
            germline_alignment: &result.germline_alignment,
            midline: &result.midline,
            query_start: result.query_start,
            query_end: result.query_end,
            germline_start: result.germline_start,
            germline_end: result.germline_end,
            reading_frame: None,
        }
    }
}

impl<'a> From<&'a DiversitySearchResult> for GeneCall<'a> {
    fn from(result: &'a DiversitySearchResult) -> Self {
        GeneCall {
            top_germline: result.best_germline(),
            all_germlines: result.all_germlines(),
            top_score: result.top_score(),
            all_scores: result.all_scores(),
            evalue: None,
            bitscore: None,
            strand: result.strand,
            query_alignment: &result.query_alignment,
            germline_alignment: &result.germline_alignment,
            midline: &result.midline,
            query_start: result.query_start,
            query_end: result.query_end,
            germline_start: result.germline_start,
            germline_end: result.germline_end,
            reading_frame: Some(result.reading_frame),
        }
    }
}

/// One output line per rearranged sequence.
#[derive(Debug, Serialize)]
pub struct VdjRecord<'a> {
    pub seq_id: &'a str,
    pub uaid: &'a str,
    /// The sequence as it was read.
    pub raw_input: &'a str,
    /// The sequence in the orientation of the V gene.
    pub oriented_sequence: &'a str,
    pub strand: Strand,
    pub chain: VdjChain,
    pub v_gene: GeneCall<'a>,
    pub d_gene: Option<GeneCall<'a>>,
    pub j_gene: GeneCall<'a>,
    pub query_reading_frame: usize,
    pub boundaries: &'a Boundaries,
    pub region_map: &'a str,
    pub vdj_nt: &'a str,
    pub vdj_aa: &'a str,
    pub junction_nt: &'a str,
    pub junction_aa: &'a str,
    pub productive: bool,
    pub productivity: ProductivityStatus,
    pub rearrangement: bool,
    pub v_annotation: &'a SegmentAnnotation,
    pub j_annotation: &'a SegmentAnnotation,
    pub d_nt_mutations: &'a [NtMutation],
}

impl<'a> VdjRecord<'a> {
    /// `None` when the rearrangement carries no derived attributes.
    pub fn new(r: &'a Rearrangement) -> Option<Self> {
        let attrs = r.attributes.as_ref()?;
        let d = r.d.as_ref().filter(|_| r.has_diversity());
        let junction = attrs.junction.as_ref();
        Some(VdjRecord {
            seq_id: r.id(),
            uaid: &r.uaid,
            raw_input: r.sequence.input(),
            oriented_sequence: r.sequence.sequence(),
            strand: r.v.strand,
            chain: attrs.chain,
            v_gene: GeneCall::from(&r.v),
            d_gene: d.map(GeneCall::from),
            j_gene: GeneCall::from(&r.j),
            query_reading_frame: attrs.query_reading_frame,
            boundaries: &attrs.boundaries,
            region_map: &attrs.region_map,
            vdj_nt: &attrs.vdj_nt,
            vdj_aa: &attrs.vdj_aa,
            junction_nt: junction.map_or("", |j| j.nt.as_str()),
            junction_aa: junction.map_or("", |j| j.aa.as_str()),
            productive: attrs.productivity.productive(),
            productivity: attrs.productivity,
            rearrangement: r.rearrangement,
            v_annotation: &r.v.annotation,
            j_annotation: &r.j.annotation,
            d_nt_mutations: d.map(|d| d.nt_mutations.as_slice()).unwrap_or_default(),
        })
    }
}

/// Write every rearranged sequence as one JSON object per line. Returns the
/// number of records written.
pub fn write_json_lines(rearrangements: &[Rearrangement], path: &Path) -> Result<usize> {
    let file = File::create(path).with_context(|| path.display().to_string())?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for record in rearrangements
        .iter()
        .filter(|r| r.rearrangement)
        .filter_map(VdjRecord::new)
    {
        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;
        written += 1;
    }
    writer.flush().with_context(|| path.display().to_string())?;
    Ok(written)
}
