//! Controller-specific error types.
//!
//! This module defines error types specific to the SinkBinding Controller
//! that are not covered by the resolver or upstream library errors.

use kube::Error as KubeError;
use resolver::ResolveError;
use thiserror::Error;

/// Errors that can occur in the SinkBinding Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Sink resolution failed
    #[error("Sink resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the failure is expected to clear without a spec change.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Resolve(e) => e.is_transient(),
            Self::Kube(_) | Self::Watch(_) => true,
            Self::InvalidConfig(_) => false,
        }
    }
}
