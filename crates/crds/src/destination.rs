//! Destination CRD field
//!
//! The serialized shape of a destination as users write it in a resource spec.
//! Semantic validation (mutual exclusion of `ref`/`uri`, URI parsing) lives with
//! the resolver, which turns this shape into a typed destination.

use crate::reference::Reference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a resource should deliver to: a direct URI, a reference to an
/// addressable object, or a reference plus a relative URI suffix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    /// Reference to an addressable object
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,

    /// Absolute URI, or a relative URI resolved against the referenced object's address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Clean absolute path appended after resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DestinationSpec {
    /// Destination pointing at a referenced object.
    pub fn from_ref(reference: Reference) -> Self {
        Self {
            reference: Some(reference),
            ..Default::default()
        }
    }

    /// Destination pointing at a URI.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// Sets the path suffix.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Fills an empty reference namespace with `namespace`.
    ///
    /// A destination written without a namespace refers to the namespace of the
    /// object that owns it.
    #[must_use]
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if let Some(reference) = self.reference.as_mut() {
            if reference.namespace.is_empty() {
                reference.namespace = namespace.to_string();
            }
        }
        self
    }
}
