//! Tunable parameters of the assignment engine, optionally read from a TOML file.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scoring of a pairwise local alignment. All values are magnitudes; the
/// first base of a gap costs `gap_open` and every further base `gap_extend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringParams {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl ScoringParams {
    pub const fn new(match_score: i32, mismatch: i32, gap_open: i32, gap_extend: i32) -> Self {
        ScoringParams {
            match_score,
            mismatch,
            gap_open,
            gap_extend,
        }
    }

    /// Gap open penalty in the `open + len * extend` convention, as a negative score.
    pub fn affine_gap_open(&self) -> i32 {
        -(self.gap_open - self.gap_extend)
    }

    /// Gap extension penalty as a negative score.
    pub fn affine_gap_extend(&self) -> i32 {
        -self.gap_extend
    }

    pub fn score(&self, a: u8, b: u8) -> i32 {
        if a == b {
            self.match_score
        } else {
            -self.mismatch
        }
    }

    /// Highest D alignment score that is still not significant: three matched bases.
    pub fn significance_floor(&self) -> i32 {
        3 * self.match_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignParameters {
    /// V assignments followed by fewer query nucleotides are discarded.
    pub min_v_trailing_nt: usize,
    /// Length of the unique antibody identifier at the start of each raw input.
    /// Zero disables it.
    pub uaid_len: usize,
    /// Maximum number of ranked candidates kept per query by the gene search.
    pub max_target_seqs: usize,
    /// Number of D alignments kept after sorting by score.
    pub d_candidates: usize,
    /// Wall clock limit for one run of the external search program.
    pub search_timeout_secs: u64,
    /// Path of the blastn executable. Looked up on `PATH` when absent.
    pub blastn: Option<PathBuf>,
    pub v_realignment: ScoringParams,
    pub j_realignment: ScoringParams,
    pub d_alignment: ScoringParams,
}

pub const DEFAULT_PARAMETERS: AssignParameters = AssignParameters {
    min_v_trailing_nt: 11,
    uaid_len: 0,
    max_target_seqs: 10,
    d_candidates: 5,
    search_timeout_secs: 600,
    blastn: None,
    v_realignment: ScoringParams::new(3, 2, 22, 1),
    j_realignment: ScoringParams::new(3, 2, 12, 1),
    d_alignment: ScoringParams::new(3, 2, 20, 2),
};

impl Default for AssignParameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

macro_rules! warn_non_default {
    ($params:expr, $($field:ident),+ $(,)?) => {
        $(
            if DEFAULT_PARAMETERS.$field != $params.$field {
                warn!("using non-default {} = {:?}", stringify!($field), $params.$field);
            }
        )+
    };
}

impl AssignParameters {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: AssignParameters = toml::from_str(s)?;
        params.warn_non_default();
        Ok(params)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        AssignParameters::from_toml_str(&s).with_context(|| path.display().to_string())
    }

    /// Parameters from `path` when given, the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => AssignParameters::from_file(path),
            None => Ok(AssignParameters::default()),
        }
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn blastn_program(&self) -> PathBuf {
        self.blastn.clone().unwrap_or_else(|| PathBuf::from("blastn"))
    }

    fn warn_non_default(&self) {
        warn_non_default!(
            self,
            min_v_trailing_nt,
            uaid_len,
            max_target_seqs,
            d_candidates,
            search_timeout_secs,
            blastn,
            v_realignment,
            j_realignment,
            d_alignment,
        );
    }
}
