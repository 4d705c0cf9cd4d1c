//! Object store capability
//!
//! The resolver reads referenced objects through [`ObjectStore`]. Objects come
//! back already adapted to the capability the resolver needs: a plain service
//! exposes ports, anything else exposes a structured address.

use crds::{AddressStatus, AddressableStatus, Reference};
use k8s_openapi::api::core::v1::Service;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object with that identity exists
    #[error("not found: {0}")]
    NotFound(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The API server does not serve the referenced kind
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// The reference cannot be looked up (e.g. a selector reference)
    #[error("unsupported lookup: {0}")]
    Unsupported(String),
}

/// Read access to referenced objects.
///
/// Implementations must be cancel-safe: dropping the returned future abandons
/// the lookup.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the object named by `reference`.
    async fn get_by_reference(&self, reference: &Reference) -> Result<StoredObject, StoreError>;
}

/// Whether `reference` names a core `v1` `Service`, whose address follows the
/// cluster DNS naming convention instead of a status field.
pub fn is_well_known_service(reference: &Reference) -> bool {
    reference.api_group.is_empty() && reference.api_version == "v1" && reference.kind == "Service"
}

/// A named port on a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    /// Port name, if any
    pub name: Option<String>,
    /// Port number
    pub port: i32,
}

impl ServicePort {
    /// Port with a name.
    pub fn named(name: &str, port: i32) -> Self {
        Self {
            name: Some(name.to_string()),
            port,
        }
    }

    /// Port without a name.
    pub fn unnamed(port: i32) -> Self {
        Self { name: None, port }
    }
}

/// Objects whose address is derived from their exposed ports.
pub trait PortExposing {
    /// Ports in declaration order.
    fn ports(&self) -> &[ServicePort];
    /// Annotation value on the object.
    fn annotation(&self, key: &str) -> Option<&str>;
}

/// Objects that publish a structured address.
pub trait Addressable {
    /// The published `status.address`, if any.
    fn address(&self) -> Option<&AddressStatus>;
}

/// Port view of a `Service`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Object annotations
    pub annotations: BTreeMap<String, String>,
    /// Exposed ports
    pub ports: Vec<ServicePort>,
}

impl ServiceEndpoint {
    /// Adapts a typed `Service`.
    pub fn from_service(service: &Service) -> Self {
        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePort {
                        name: p.name.clone(),
                        port: p.port,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            annotations: service.metadata.annotations.clone().unwrap_or_default(),
            ports,
        }
    }
}

impl PortExposing for ServiceEndpoint {
    fn ports(&self) -> &[ServicePort] {
        &self.ports
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Address view of an arbitrary addressable object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressableObject {
    /// `status.address`, if published
    pub address: Option<AddressStatus>,
}

impl AddressableObject {
    /// Object publishing `url` (or an address block without a URL when `None`).
    pub fn with_url(url: Option<&str>) -> Self {
        Self {
            address: Some(AddressStatus {
                url: url.map(str::to_string),
            }),
        }
    }

    /// Adapts a dynamic object by reading `status.address`.
    ///
    /// A malformed status is treated as no address.
    pub fn from_dynamic(obj: &DynamicObject) -> Self {
        let address = obj
            .data
            .get("status")
            .cloned()
            .and_then(|status| serde_json::from_value::<AddressableStatus>(status).ok())
            .and_then(|status| status.address);
        Self { address }
    }
}

impl Addressable for AddressableObject {
    fn address(&self) -> Option<&AddressStatus> {
        self.address.as_ref()
    }
}

/// A referenced object, adapted to the capability used to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredObject {
    /// A plain network service
    Service(ServiceEndpoint),
    /// An object with `status.address`
    Addressable(AddressableObject),
}
