//! facescan-core — Find a known person in a large image collection.
//!
//! Builds a reference store of identity vectors from clean reference photos,
//! then scans candidate images and decides per image whether any detected
//! face is the same person. Face detection and embedding live behind the
//! [`IdentityExtractor`] trait.

pub mod config;
pub mod extractor;
pub mod reference;
pub mod results;
pub mod scan;
pub mod similarity;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BuildConfig, ScanConfig, DEFAULT_THRESHOLD};
pub use extractor::{ExtractError, IdentityExtractor, Strictness};
pub use reference::{build_reference_store, BuildReport, ReferenceError, ReferenceStore};
pub use scan::{Decision, ScanError, ScanPipeline, ScanReport, ScanSummary};
pub use similarity::{BestMatch, ReferenceMatrix, SimilarityError};
pub use types::{Face, IdentityVector, MatchRecord};
