//! Coarse germline database search.
//!
//! [`BlastnSearch`] drives the external `blastn` program. [`NativeSearch`] is an
//! in-process stand-in with the same parameters for environments without BLAST.

use crate::alignment::{AlignmentSpan, PairwiseAligner, SmithWaterman};
use crate::errors::SearchError;
use crate::params::{AssignParameters, ScoringParams};
use crate::sequence::{reverse_complement, Sequence};
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vdj_reference::GermlineReference;
use vdj_types::{Segment, Strand};

/// Fixed search parameters of one gene segment. Gap penalties follow the BLAST
/// convention: a gap of length `k` costs `gap_open + k * gap_extend`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub word_size: usize,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub reward: i32,
    pub penalty: i32,
    pub evalue: f64,
}

impl SearchParams {
    pub fn for_segment(segment: Segment) -> Self {
        let (word_size, gap_open, gap_extend, evalue) = match segment {
            Segment::V => (11, 5, 2, 1.0),
            Segment::D => (4, 4, 2, 100_000.0),
            Segment::J => (7, 5, 2, 1_000.0),
        };
        SearchParams {
            word_size,
            gap_open,
            gap_extend,
            reward: 1,
            penalty: -1,
            evalue,
        }
    }

    /// The same scoring for the pairwise aligner, whose first gap base costs `gap_open`.
    pub fn scoring(&self) -> ScoringParams {
        ScoringParams::new(
            self.reward,
            -self.penalty,
            self.gap_open + self.gap_extend,
            self.gap_extend,
        )
    }
}

/// One ranked hit of a query against a germline allele. Coordinates are
/// 1-based and inclusive as reported by BLAST; on the minus strand the
/// germline start is greater than the germline end.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub gene: String,
    pub score: i32,
    pub evalue: f64,
    pub bitscore: f64,
    pub length: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub germline_start: usize,
    pub germline_end: usize,
    pub strand: Strand,
    pub query_alignment: String,
    pub germline_alignment: String,
}

#[cfg(test)]
impl Candidate {
    /// An ungapped plus strand hit as the coarse search reports it.
    pub(crate) fn exact(gene: &str, aligned: &str, query_start: usize, germline_start: usize) -> Self {
        Candidate {
            gene: gene.to_string(),
            score: aligned.len() as i32,
            evalue: 1e-30,
            bitscore: 100.0,
            length: aligned.len(),
            query_start,
            query_end: query_start + aligned.len() - 1,
            germline_start,
            germline_end: germline_start + aligned.len() - 1,
            strand: Strand::Plus,
            query_alignment: aligned.to_string(),
            germline_alignment: aligned.to_string(),
        }
    }
}

/// Search many queries against the germline database of one segment.
///
/// Returns one ranked candidate list per query, in the order of `queries`.
pub trait GermlineSearch: Send + Sync {
    fn search(&self, queries: &[Sequence], segment: Segment)
        -> Result<Vec<Vec<Candidate>>, SearchError>;
}

/// Keep the best hit per gene, best first, at most `max_targets`.
fn rank(mut candidates: Vec<Candidate>, max_targets: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.evalue.total_cmp(&b.evalue))
    });
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.gene.clone()));
    candidates.truncate(max_targets);
    candidates
}

/// Tabular output columns requested from blastn.
const BLAST_COLUMNS: &str =
    "6 qseqid sseqid score evalue bitscore length qstart qend sstart send sstrand qseq sseq";

#[derive(Debug, Deserialize)]
struct BlastRow {
    qseqid: String,
    sseqid: String,
    score: i32,
    evalue: f64,
    bitscore: f64,
    length: usize,
    qstart: usize,
    qend: usize,
    sstart: usize,
    send: usize,
    sstrand: String,
    qseq: String,
    sseq: String,
}

impl From<BlastRow> for Candidate {
    fn from(row: BlastRow) -> Self {
        Candidate {
            gene: row.sseqid,
            score: row.score,
            evalue: row.evalue,
            bitscore: row.bitscore,
            length: row.length,
            query_start: row.qstart,
            query_end: row.qend,
            germline_start: row.sstart,
            germline_end: row.send,
            strand: if row.sstrand == "minus" {
                Strand::Minus
            } else {
                Strand::Plus
            },
            query_alignment: row.qseq,
            germline_alignment: row.sseq,
        }
    }
}

/// Parse blastn tabular output. Queries are named by their position in the
/// input file, so results are placed back by index.
fn parse_blast_output<R: Read>(
    reader: R,
    num_queries: usize,
    segment: Segment,
) -> Result<Vec<Vec<Candidate>>, SearchError> {
    let mut results = vec![Vec::new(); num_queries];
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .from_reader(reader);
    for row in rdr.deserialize::<BlastRow>() {
        let row = row.map_err(|source| SearchError::Parse { segment, source })?;
        let index = row
            .qseqid
            .strip_prefix('q')
            .and_then(|i| i.parse::<usize>().ok())
            .filter(|&i| i < num_queries)
            .ok_or_else(|| SearchError::UnknownQuery(row.qseqid.clone()))?;
        results[index].push(Candidate::from(row));
    }
    Ok(results)
}

/// Runs `blastn` against `{germline_dir}/blast/{species}_gl_{segment}`.
pub struct BlastnSearch {
    program: PathBuf,
    reference: Arc<GermlineReference>,
    max_target_seqs: usize,
    timeout: Duration,
}

impl BlastnSearch {
    pub fn new(reference: Arc<GermlineReference>, params: &AssignParameters) -> Self {
        BlastnSearch {
            program: params.blastn_program(),
            reference,
            max_target_seqs: params.max_target_seqs,
            timeout: params.search_timeout(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn command(&self, query: &std::path::Path, segment: Segment) -> Command {
        let p = SearchParams::for_segment(segment);
        let mut cmd = Command::new(&self.program);
        cmd.arg("-db")
            .arg(self.reference.blast_db(segment))
            .arg("-query")
            .arg(query)
            .args(["-outfmt", BLAST_COLUMNS])
            .args(["-dust", "no"])
            .args(["-word_size", &p.word_size.to_string()])
            .args(["-max_target_seqs", &self.max_target_seqs.to_string()])
            .args(["-evalue", &p.evalue.to_string()])
            .args(["-reward", &p.reward.to_string()])
            .args(["-penalty", &p.penalty.to_string()])
            .args(["-gapopen", &p.gap_open.to_string()])
            .args(["-gapextend", &p.gap_extend.to_string()]);
        cmd
    }
}

impl GermlineSearch for BlastnSearch {
    fn search(
        &self,
        queries: &[Sequence],
        segment: Segment,
    ) -> Result<Vec<Vec<Candidate>>, SearchError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let io_err = |source| SearchError::Io { segment, source };

        // All scratch files are removed when they go out of scope.
        let mut query_file = tempfile::NamedTempFile::new().map_err(io_err)?;
        for (i, query) in queries.iter().enumerate() {
            writeln!(query_file, ">q{i}\n{}", query.sequence()).map_err(io_err)?;
        }
        query_file.flush().map_err(io_err)?;
        let out_file = tempfile::NamedTempFile::new().map_err(io_err)?;
        let err_file = tempfile::NamedTempFile::new().map_err(io_err)?;

        let mut cmd = self.command(query_file.path(), segment);
        cmd.arg("-out")
            .arg(out_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(err_file.reopen().map_err(io_err)?);
        debug!("running {:?}", cmd);
        let mut child = cmd.spawn().map_err(|source| SearchError::Spawn {
            program: self.program_name(),
            source,
        })?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(io_err)? {
                break status;
            }
            if start.elapsed() > self.timeout {
                // the child may have exited in the meantime
                let _ = child.kill();
                let _ = child.wait();
                return Err(SearchError::Timeout {
                    program: self.program_name(),
                    seconds: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(err_file.path()).map_err(io_err)?;
            return Err(SearchError::Failed {
                program: self.program_name(),
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        let output = out_file.reopen().map_err(io_err)?;
        let results = parse_blast_output(output, queries.len(), segment)?;
        Ok(results
            .into_iter()
            .map(|candidates| rank(candidates, self.max_target_seqs))
            .collect())
    }
}

/// Karlin-Altschul parameters used to turn raw scores into bit scores and
/// e-values for the 1/-1 nucleotide scoring.
const KA_LAMBDA: f64 = 1.0986;
const KA_K: f64 = 0.33;

fn bitscore(score: i32) -> f64 {
    (KA_LAMBDA * score as f64 - KA_K.ln()) / std::f64::consts::LN_2
}

fn evalue(score: i32, query_len: usize, db_len: usize) -> f64 {
    KA_K * query_len as f64 * db_len as f64 * (-KA_LAMBDA * score as f64).exp()
}

/// Longest run of identical aligned bases, i.e. the longest exact seed.
fn longest_exact_run(query: &str, germline: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    for (q, g) in query.bytes().zip(germline.bytes()) {
        if q == g && q != b'-' {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// In-process germline search: local alignment of every query, on both
/// strands, against every germline of the segment. Hits need an exact seed of
/// at least the segment word size and must pass the segment e-value ceiling.
pub struct NativeSearch {
    reference: Arc<GermlineReference>,
    aligner: Box<dyn PairwiseAligner>,
    max_target_seqs: usize,
}

impl NativeSearch {
    pub fn new(reference: Arc<GermlineReference>, params: &AssignParameters) -> Self {
        NativeSearch {
            reference,
            aligner: Box::new(SmithWaterman),
            max_target_seqs: params.max_target_seqs,
        }
    }

    fn best_hit(
        &self,
        query: &str,
        gene: &str,
        germline: &str,
        params: &SearchParams,
        db_len: usize,
    ) -> Option<Candidate> {
        let scoring = params.scoring();
        let forward = AlignmentSpan::align(self.aligner.as_ref(), gene, query, germline, &scoring);
        let rc_query = reverse_complement(query);
        let reverse =
            AlignmentSpan::align(self.aligner.as_ref(), gene, &rc_query, germline, &scoring);
        let (span, strand) = if reverse.score() > forward.score() {
            (reverse, Strand::Minus)
        } else {
            (forward, Strand::Plus)
        };

        let (q, g) = span.gapped();
        if longest_exact_run(&q, &g) < params.word_size {
            return None;
        }
        let evalue = evalue(span.score(), query.len(), db_len);
        if evalue > params.evalue {
            return None;
        }

        let qlen = query.len();
        let (query_start, query_end, germline_start, germline_end, q, g) = match strand {
            Strand::Plus => (
                span.query_begin() + 1,
                span.query_end(),
                span.target_begin() + 1,
                span.target_end(),
                q,
                g,
            ),
            // report in plus strand query coordinates like blastn does
            Strand::Minus => (
                qlen - span.query_end() + 1,
                qlen - span.query_begin(),
                span.target_end(),
                span.target_begin() + 1,
                reverse_complement(&q),
                reverse_complement(&g),
            ),
        };
        Some(Candidate {
            gene: gene.to_string(),
            score: span.score(),
            evalue,
            bitscore: bitscore(span.score()),
            length: q.len(),
            query_start,
            query_end,
            germline_start,
            germline_end,
            strand,
            query_alignment: q,
            germline_alignment: g,
        })
    }
}

impl GermlineSearch for NativeSearch {
    fn search(
        &self,
        queries: &[Sequence],
        segment: Segment,
    ) -> Result<Vec<Vec<Candidate>>, SearchError> {
        let params = SearchParams::for_segment(segment);
        let germlines = self.reference.germlines(segment);
        let db_len = germlines.total_len();
        Ok(queries
            .iter()
            .map(|query| {
                let hits = germlines
                    .iter()
                    .filter_map(|gene| {
                        let germline = String::from_utf8_lossy(gene.seq());
                        self.best_hit(query.sequence(), gene.name(), &germline, &params, db_len)
                    })
                    .collect();
                rank(hits, self.max_target_seqs)
            })
            .collect())
    }
}
