//!
//! Germline V(D)J assignment of antibody sequences
//!
// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms
)]

pub mod alignment;
pub mod annotate;
pub mod diversity;
pub mod errors;
pub mod germline;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod rearrangement;
pub mod search;
pub mod sequence;

pub use alignment::{AlignmentSpan, PairwiseAligner, RawAlignment, SmithWaterman};
pub use annotate::Annotators;
pub use diversity::{assign_d, DiversitySearchResult};
pub use errors::{AssignmentError, AttributeDerivationError, SearchError};
pub use germline::GermlineSearchResult;
pub use params::{AssignParameters, ScoringParams};
pub use pipeline::{Assigner, Assignment, AssignmentSummary};
pub use rearrangement::{derive_attributes, Boundaries, NRegion, Rearrangement, Span};
pub use search::{BlastnSearch, Candidate, GermlineSearch, NativeSearch, SearchParams};
pub use sequence::Sequence;
