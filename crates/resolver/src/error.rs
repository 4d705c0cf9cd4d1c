//! Resolution errors

use crate::destination::DestinationError;
use crate::store::StoreError;
use thiserror::Error;
use tracker::TrackError;

/// How a caller should react to a [`ResolveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The input is wrong; retrying will not help
    Caller,
    /// The referenced object is missing or not ready; the tracker will re-enqueue
    Transient,
    /// The referenced object needs operator attention (e.g. port annotation)
    Configuration,
}

/// Errors that can occur while resolving a destination.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Destination failed validation
    #[error("invalid destination: {0}")]
    InvalidDestination(#[from] DestinationError),

    /// Reference could not be tracked
    #[error("failed to track reference: {0}")]
    Track(#[from] TrackError),

    /// Referenced object does not exist (yet)
    #[error("{reference} not found")]
    NotFound {
        /// Canonical key of the missing object
        reference: String,
    },

    /// Referenced object has no `status.address`
    #[error("address not set for {reference}")]
    AddressNotSet {
        /// Canonical key of the object
        reference: String,
    },

    /// `status.address` has no URL
    #[error("URL missing in address of {reference}")]
    UrlMissing {
        /// Canonical key of the object
        reference: String,
    },

    /// The published URL has no host
    #[error("hostname missing in address of {reference}: {url}")]
    HostMissing {
        /// Canonical key of the object
        reference: String,
        /// The published URL
        url: String,
    },

    /// The published URL could not be parsed
    #[error("invalid address {url:?} on {reference}: {reason}")]
    InvalidAddress {
        /// Canonical key of the object
        reference: String,
        /// The published URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// The relative URI could not be resolved against the object's address
    #[error("cannot resolve {suffix:?} against {base}: {reason}")]
    InvalidSuffix {
        /// Address of the referenced object
        base: String,
        /// Relative URI from the destination
        suffix: String,
        /// Parser message
        reason: String,
    },

    /// The port annotation names a port the service does not expose
    #[error("port {port:?} not found on {reference}")]
    PortNotFound {
        /// Canonical key of the service
        reference: String,
        /// Port name from the annotation
        port: String,
    },

    /// Several ports, none of them 80, and no annotation to pick one
    #[error("ambiguous port on {reference}: {count} port(s) exposed and none is 80, annotate it with {annotation}")]
    AmbiguousPort {
        /// Canonical key of the service
        reference: String,
        /// Number of ports exposed
        count: usize,
        /// Annotation that selects a port by name
        annotation: String,
    },

    /// The object store failed for another reason
    #[error("object store error: {0}")]
    Store(#[source] StoreError),
}

impl ResolveError {
    /// Retry classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidDestination(_) | Self::Track(_) | Self::InvalidSuffix { .. } => {
                ErrorClass::Caller
            }
            Self::NotFound { .. }
            | Self::AddressNotSet { .. }
            | Self::UrlMissing { .. }
            | Self::HostMissing { .. }
            | Self::InvalidAddress { .. } => ErrorClass::Transient,
            Self::Store(StoreError::UnknownKind(_)) => ErrorClass::Configuration,
            Self::Store(_) => ErrorClass::Transient,
            Self::PortNotFound { .. } | Self::AmbiguousPort { .. } => ErrorClass::Configuration,
        }
    }

    /// Whether waiting (for the tracker to re-enqueue) may fix this error.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
