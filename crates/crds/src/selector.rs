//! Label selectors for class-of-object references
//!
//! A trimmed-down mirror of the Kubernetes `LabelSelector` that carries its own
//! schema and matching logic, so references can select "every object of this
//! kind whose labels match" without pulling in the openapi schema features.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kubernetes-style label selector.
///
/// The requirements of `match_labels` and `match_expressions` are ANDed.
/// An empty selector matches every object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact label matches (`key == value`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based selector requirement.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// Relationship between the key and the values
    pub operator: SelectorOperator,

    /// Values for `In`/`NotIn`; must be empty for `Exists`/`DoesNotExist`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Set-based selector operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectorOperator {
    /// Label present and its value is one of `values`
    In,
    /// Label absent, or its value is none of `values`
    NotIn,
    /// Label present, any value
    Exists,
    /// Label absent
    DoesNotExist,
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Exists => "exists",
            Self::DoesNotExist => "!exists",
        };
        f.write_str(op)
    }
}

impl LabelSelector {
    /// Selector with only exact-match labels.
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            match_expressions: Vec::new(),
        }
    }

    /// Whether the given label set satisfies every requirement of this selector.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let exact = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));

        exact && self.match_expressions.iter().all(|req| req.matches(labels))
    }

    /// Deterministic textual form, independent of the order the selector was built in.
    ///
    /// Labels are already ordered by the `BTreeMap`; expressions and their values
    /// are sorted here.
    pub fn canonical(&self) -> String {
        let mut parts: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut exprs: Vec<String> = self
            .match_expressions
            .iter()
            .map(|req| {
                let mut values = req.values.clone();
                values.sort();
                values.dedup();
                format!("{} {} ({})", req.key, req.operator, values.join(","))
            })
            .collect();
        exprs.sort();
        parts.extend(exprs);

        parts.join(",")
    }
}

impl LabelSelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}
