//! Tracker errors

use crds::ReferenceError;
use thiserror::Error;

/// Errors returned by [`Tracker::track`](crate::Tracker::track).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackError {
    /// The reference is missing identity fields or is ambiguous
    #[error("invalid reference {reference}: {source}")]
    InvalidReference {
        /// Canonical key of the offending reference
        reference: String,
        /// What was wrong with it
        source: ReferenceError,
    },
}
