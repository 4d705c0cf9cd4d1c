//! Kubernetes-backed object store

use crate::store::{
    is_well_known_service, AddressableObject, ObjectStore, ServiceEndpoint, StoreError, StoredObject,
};
use crds::Reference;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::{discovery, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Reads referenced objects from the Kubernetes API.
///
/// Services are read through the typed API; every other kind is read as a
/// dynamic object. Kinds are resolved through API discovery once and cached.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    resources: Arc<Mutex<HashMap<GroupVersionKind, ApiResource>>>,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    /// Creates a store using `client`.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Looks up how the API server serves `gvk`.
    ///
    /// A kind the server does not know is reported as
    /// [`StoreError::UnknownKind`]; other failures are retried on the next call.
    pub async fn discover(&self, gvk: &GroupVersionKind) -> Result<ApiResource, StoreError> {
        if let Some(resource) = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(gvk)
        {
            return Ok(resource.clone());
        }

        let (resource, _) = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| discovery_error(gvk, e))?;
        info!("Discovered {}/{} {} as {}", gvk.group, gvk.version, gvk.kind, resource.plural);

        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(gvk.clone(), resource.clone());
        Ok(resource)
    }
}

/// Classifies a discovery failure for `gvk`.
fn discovery_error(gvk: &GroupVersionKind, err: kube::Error) -> StoreError {
    let unknown = || StoreError::UnknownKind(format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind));
    match err {
        kube::Error::Discovery(_) => unknown(),
        kube::Error::Api(resp) if resp.code == 404 => unknown(),
        other => StoreError::Kube(other),
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_by_reference(&self, reference: &Reference) -> Result<StoredObject, StoreError> {
        let Some(name) = reference.object_name() else {
            return Err(StoreError::Unsupported(format!(
                "selector reference {reference} does not name a single object"
            )));
        };
        debug!("Fetching {}", reference);

        if is_well_known_service(reference) {
            let api: Api<Service> = Api::namespaced(self.client.clone(), &reference.namespace);
            return match api.get_opt(name).await? {
                Some(service) => Ok(StoredObject::Service(ServiceEndpoint::from_service(&service))),
                None => Err(StoreError::NotFound(reference.canonical_key())),
            };
        }

        let gvk = GroupVersionKind::gvk(&reference.api_group, &reference.api_version, &reference.kind);
        let resource = self.discover(&gvk).await?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &reference.namespace, &resource);
        match api.get_opt(name).await? {
            Some(obj) => Ok(StoredObject::Addressable(AddressableObject::from_dynamic(&obj))),
            None => Err(StoreError::NotFound(reference.canonical_key())),
        }
    }
}
