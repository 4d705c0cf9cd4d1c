//! Kubernetes object references for tracked dependencies
//!
//! A [`Reference`] names either one object (`name`) or a class of objects of the
//! same kind in one namespace (`selector`). References are plain values: they are
//! built per reconciliation and compared through their canonical key.

use crate::selector::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation failures for a [`Reference`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// One or more required identity fields are empty
    #[error("missing field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Both `name` and `selector` were provided
    #[error("expected exactly one, got both: name, selector")]
    NameAndSelector,
}

/// Identity of a trackable object, or of a labelled class of objects.
///
/// An empty `api_group` is the Kubernetes core group (e.g. `v1` `Service`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// API group of the referenced resource (empty for the core group)
    #[serde(default)]
    pub api_group: String,

    /// API version of the referenced resource (e.g. "v1")
    pub api_version: String,

    /// Kind of the referenced resource (e.g. "Service")
    pub kind: String,

    /// Namespace of the referenced resource
    #[serde(default)]
    pub namespace: String,

    /// Name of the referenced resource; mutually exclusive with `selector`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Label selector matching a class of resources; mutually exclusive with `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

impl Reference {
    /// Reference to exactly one named object.
    pub fn named(
        api_group: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: Some(name.into()),
            selector: None,
        }
    }

    /// Reference to every object of a kind in a namespace whose labels match `selector`.
    pub fn selecting(
        api_group: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        selector: LabelSelector,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: None,
            selector: Some(selector),
        }
    }

    /// Checks the identity invariants, reporting every missing field at once.
    pub fn validate(&self) -> Result<(), ReferenceError> {
        let mut missing = Vec::new();
        if self.api_version.is_empty() {
            missing.push("apiVersion");
        }
        if self.kind.is_empty() {
            missing.push("kind");
        }
        if self.namespace.is_empty() {
            missing.push("namespace");
        }

        match (self.object_name().is_some(), self.selector.is_some()) {
            (true, true) => {
                if missing.is_empty() {
                    return Err(ReferenceError::NameAndSelector);
                }
            }
            (false, false) => missing.push("name"),
            _ => {}
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReferenceError::MissingFields(missing))
        }
    }

    /// The referenced object's name. An empty name counts as absent.
    pub fn object_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Whether this reference selects by labels rather than by name.
    pub fn is_selector(&self) -> bool {
        self.selector.is_some()
    }

    /// `group/version` as it appears in an object's `apiVersion` field.
    pub fn group_version(&self) -> String {
        if self.api_group.is_empty() {
            self.api_version.clone()
        } else {
            format!("{}/{}", self.api_group, self.api_version)
        }
    }

    /// Key shared by every reference to the same kind in the same namespace.
    pub fn scope_key(&self) -> String {
        format!("{}, Kind={}, {}", self.group_version(), self.kind, self.namespace)
    }

    /// Deterministic map key. Two references with equal fields always produce the same key.
    pub fn canonical_key(&self) -> String {
        match (self.object_name(), &self.selector) {
            (Some(name), _) => format!("{}/{}", self.scope_key(), name),
            (None, Some(selector)) => format!("{}?{}", self.scope_key(), selector.canonical()),
            (None, None) => self.scope_key(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_named_reference() {
        let r = Reference::named("", "v1", "Service", "default", "web");
        assert_eq!(r.validate(), Ok(()));
        assert_eq!(r.canonical_key(), "v1, Kind=Service, default/web");
    }

    #[test]
    fn test_group_in_key() {
        let r = Reference::named("serving.example.dev", "v1", "Route", "ns", "r");
        assert_eq!(r.canonical_key(), "serving.example.dev/v1, Kind=Route, ns/r");
    }

    #[test]
    fn test_missing_namespace() {
        let r = Reference::named("", "v1", "Service", "", "web");
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("namespace"), "{err}");
    }

    #[test]
    fn test_missing_fields_all_named() {
        let r = Reference {
            api_version: "v1".to_string(),
            ..Default::default()
        };
        let err = r.validate().unwrap_err();
        assert_eq!(
            err,
            ReferenceError::MissingFields(vec!["kind", "namespace", "name"])
        );
        assert_eq!(err.to_string(), "missing field(s): kind, namespace, name");
    }

    #[test]
    fn test_empty_name_counts_as_missing() {
        let r = Reference::named("", "v1", "Service", "default", "");
        assert_eq!(r.validate(), Err(ReferenceError::MissingFields(vec!["name"])));
    }

    #[test]
    fn test_name_and_selector_rejected() {
        let mut r = Reference::named("", "v1", "Service", "default", "web");
        r.selector = Some(LabelSelector::default());
        assert_eq!(r.validate(), Err(ReferenceError::NameAndSelector));
    }

    #[test]
    fn test_selector_reference_key() {
        let r = Reference::selecting(
            "apps",
            "v1",
            "Deployment",
            "ns",
            LabelSelector::from_labels([("tier", "web"), ("app", "shop")]),
        );
        assert_eq!(r.validate(), Ok(()));
        assert!(r.is_selector());
        assert_eq!(r.canonical_key(), "apps/v1, Kind=Deployment, ns?app=shop,tier=web");
    }

    #[test]
    fn test_distinct_selectors_distinct_keys() {
        let web = Reference::selecting("", "v1", "Service", "ns", LabelSelector::from_labels([("app", "web")]));
        let db = Reference::selecting("", "v1", "Service", "ns", LabelSelector::from_labels([("app", "db")]));
        assert_ne!(web.canonical_key(), db.canonical_key());
    }

    #[test]
    fn test_empty_name_with_selector_uses_selector_key() {
        let mut r = Reference::selecting("", "v1", "Service", "default", LabelSelector::from_labels([("app", "web")]));
        r.name = Some(String::new());
        assert_eq!(r.validate(), Ok(()));
        assert_eq!(r.object_name(), None);
        assert_eq!(r.canonical_key(), "v1, Kind=Service, default?app=web");

        let mut other = r.clone();
        other.selector = Some(LabelSelector::from_labels([("app", "db")]));
        assert_ne!(r.canonical_key(), other.canonical_key());
    }

    #[test]
    fn test_key_independent_of_construction_order() {
        let built = Reference::selecting(
            "apps",
            "v1",
            "Deployment",
            "ns",
            LabelSelector::from_labels([("tier", "web"), ("app", "shop")]),
        );
        let decoded: Reference = serde_json::from_value(serde_json::json!({
            "selector": { "matchLabels": { "app": "shop", "tier": "web" } },
            "namespace": "ns",
            "kind": "Deployment",
            "apiVersion": "v1",
            "apiGroup": "apps"
        }))
        .unwrap();
        assert_eq!(built.canonical_key(), decoded.canonical_key());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let r: Reference = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Service",
            "namespace": "default",
            "name": "web"
        }))
        .unwrap();
        assert_eq!(r, Reference::named("", "v1", "Service", "default", "web"));
    }
}
