//! Error types of the assignment engine.
//!
//! Per-sequence failures ([`AssignmentError`], [`AttributeDerivationError`]) are
//! recovered by the pipeline and only counted. [`SearchError`] fails the whole file.

use std::process::ExitStatus;
use vdj_types::Segment;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("no {segment} gene candidates for {id}")]
    NoCandidate { id: String, segment: Segment },
    #[error(
        "{id}: only {trailing} nt follow the V gene alignment, at least {minimum} are required"
    )]
    BoundaryGuard {
        id: String,
        trailing: usize,
        minimum: usize,
    },
    #[error("germline gene {gene} is not in the {segment} database")]
    GermlineNotFound { gene: String, segment: Segment },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AttributeDerivationError {
    #[error("cannot infer the chain from V gene {gene}")]
    UnknownChain { gene: String },
    #[error("{region} boundary {start}..{end} lies outside the {len} nt query")]
    OutOfRange {
        region: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("{region} boundaries are not ordered ({start} > {end})")]
    Unordered {
        region: &'static str,
        start: usize,
        end: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {seconds} seconds and was killed")]
    Timeout { program: String, seconds: u64 },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("I/O error while running the {segment} gene search")]
    Io {
        segment: Segment,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse the {segment} gene search output")]
    Parse {
        segment: Segment,
        #[source]
        source: csv::Error,
    },
    #[error("search output refers to unknown query '{0}'")]
    UnknownQuery(String),
    #[error("search returned {found} result lists for {expected} queries")]
    ResultCount { expected: usize, found: usize },
}
