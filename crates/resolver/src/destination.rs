//! Typed destinations
//!
//! [`DestinationSpec`] is what users write; [`Destination`] is what the resolver
//! works with. Converting one into the other enforces the mutual exclusion of
//! `ref` and `uri`, so an invalid combination cannot reach resolution.

use crds::{DestinationSpec, Reference, ReferenceError};
use reqwest::Url;
use thiserror::Error;

/// Validation failures for a destination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DestinationError {
    /// Neither `ref` nor `uri` is set
    #[error("expected at least one, got none: ref, uri")]
    Empty,

    /// `ref` is set together with an absolute `uri`
    #[error("absolute URI is not allowed when ref is present: {0}")]
    AbsoluteUriWithRef(String),

    /// Only `uri` is set and it is relative
    #[error("relative URI is not allowed when ref is absent: {0}")]
    RelativeUriWithoutRef(String),

    /// `uri` could not be parsed
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri {
        /// The offending value
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// `ref` is missing identity fields
    #[error("invalid ref: {0}")]
    InvalidRef(#[from] ReferenceError),

    /// `ref` selects by labels; a destination must name exactly one object
    #[error("ref must name a single object, got selector on {0}")]
    SelectorRef(String),

    /// `path` is not `/`-prefixed or contains empty or dot segments
    #[error("path must be a clean absolute path, got {0:?}")]
    InvalidPath(String),
}

/// What a destination points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The address of a referenced object
    Ref(Reference),
    /// A fixed absolute URI
    Uri(Url),
    /// A relative URI resolved against the address of a referenced object
    RefWithSuffix(Reference, String),
}

/// A validated destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    target: Target,
    path: Option<String>,
}

impl Destination {
    /// Builds a destination from a target and an optional path suffix.
    pub fn new(target: Target, path: Option<String>) -> Result<Self, DestinationError> {
        if let Some(path) = &path {
            validate_path(path)?;
        }
        if let Target::Ref(reference) | Target::RefWithSuffix(reference, _) = &target {
            validate_ref(reference)?;
        }
        Ok(Self { target, path })
    }

    /// What the destination points at.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Path appended after resolution.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The referenced object, if any.
    pub fn reference(&self) -> Option<&Reference> {
        match &self.target {
            Target::Ref(reference) | Target::RefWithSuffix(reference, _) => Some(reference),
            Target::Uri(_) => None,
        }
    }
}

impl TryFrom<&DestinationSpec> for Destination {
    type Error = DestinationError;

    fn try_from(spec: &DestinationSpec) -> Result<Self, Self::Error> {
        let uri = spec.uri.as_deref().filter(|u| !u.is_empty()).map(parse_uri).transpose()?;

        let target = match (spec.reference.clone(), uri) {
            (None, None) => return Err(DestinationError::Empty),
            (Some(_), Some(ParsedUri::Absolute(url))) => {
                return Err(DestinationError::AbsoluteUriWithRef(url.to_string()));
            }
            (Some(reference), Some(ParsedUri::Relative(suffix))) => {
                Target::RefWithSuffix(reference, suffix)
            }
            (Some(reference), None) => Target::Ref(reference),
            (None, Some(ParsedUri::Absolute(url))) => Target::Uri(url),
            (None, Some(ParsedUri::Relative(suffix))) => {
                return Err(DestinationError::RelativeUriWithoutRef(suffix));
            }
        };

        Self::new(target, spec.path.clone())
    }
}

impl TryFrom<DestinationSpec> for Destination {
    type Error = DestinationError;

    fn try_from(spec: DestinationSpec) -> Result<Self, Self::Error> {
        Self::try_from(&spec)
    }
}

enum ParsedUri {
    Absolute(Url),
    Relative(String),
}

/// Whether `raw` starts with an RFC 3986 scheme (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`).
pub(crate) fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn parse_uri(raw: &str) -> Result<ParsedUri, DestinationError> {
    let invalid = |reason: String| DestinationError::InvalidUri {
        uri: raw.to_string(),
        reason,
    };

    if raw.starts_with("//") {
        return Err(invalid("scheme-relative URIs are not supported".to_string()));
    }

    if !has_scheme(raw) {
        // A relative reference must resolve cleanly against any base.
        let base = Url::parse("http://base.invalid/").map_err(|e| invalid(e.to_string()))?;
        base.join(raw).map_err(|e| invalid(e.to_string()))?;
        return Ok(ParsedUri::Relative(raw.to_string()));
    }

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(ParsedUri::Absolute(url))
}

fn validate_ref(reference: &Reference) -> Result<(), DestinationError> {
    reference.validate()?;
    if reference.is_selector() {
        return Err(DestinationError::SelectorRef(reference.scope_key()));
    }
    Ok(())
}

/// A clean absolute path: `/`-prefixed, no empty, `.` or `..` segments, no query or fragment.
fn validate_path(path: &str) -> Result<(), DestinationError> {
    let invalid = || DestinationError::InvalidPath(path.to_string());

    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    if path.contains(['?', '#']) {
        return Err(invalid());
    }
    if rest.is_empty() {
        return Ok(());
    }
    if rest.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
        return Err(invalid());
    }
    Ok(())
}
