//! SinkBinding CRD
//!
//! Binds a workload to a destination. The controller resolves the destination
//! to a URI, publishes it in status and tracks the referenced object so the
//! URI follows address changes.

use crate::destination::DestinationSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "bindings.microscaler.io",
    version = "v1alpha1",
    kind = "SinkBinding",
    namespaced,
    status = "SinkBindingStatus",
    printcolumn = r#"{"name":"Sink", "type":"string", "jsonPath":".status.sinkUri"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SinkBindingSpec {
    /// Destination to resolve
    pub sink: DestinationSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SinkBindingStatus {
    /// Resolved absolute URI of the sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,

    /// Binding state
    pub state: BindingState,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,

    /// Error message if resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Binding state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BindingState {
    /// Sink not resolved yet (referenced object missing or not ready)
    #[default]
    Pending,

    /// Sink resolved
    Ready,

    /// Sink cannot be resolved without a spec or configuration change
    Failed,
}
