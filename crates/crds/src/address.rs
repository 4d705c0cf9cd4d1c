//! Addressable status shape
//!
//! Objects that can be used as a destination publish their address under
//! `status.address.url`. Only the fields the resolver reads are modelled.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `status.address` block of an addressable object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressStatus {
    /// Absolute URL the object can be reached at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The subset of an addressable object's status the resolver reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressableStatus {
    /// Published address, absent until the object is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressStatus>,
}
