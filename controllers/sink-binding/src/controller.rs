//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the tracker, the
//! resolver and the watchers together and supervises their tasks.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::{FailureCounts, Reconciler};
use crate::watcher::{
    run_compactor, watch_addressables, watch_binding_deletions, watch_services, watch_sink_bindings,
};
use crds::SinkBinding;
use futures::channel::mpsc;
use k8s_openapi::api::core::v1::Service;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::{Api, Client, Resource};
use resolver::{DestinationResolver, KubeObjectStore, StoreError};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracker::{ObserverKey, Tracker};

type Task = JoinHandle<Result<(), ControllerError>>;

/// Main controller for SinkBinding management.
pub struct Controller {
    tasks: Vec<(String, Task)>,
}

/// API for `K` in `namespace`, or across all namespaces.
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Startup error for an addressable kind that could not be discovered.
fn discovery_failure(gvk: &GroupVersionKind, err: StoreError) -> ControllerError {
    match err {
        StoreError::UnknownKind(kind) => {
            ControllerError::InvalidConfig(format!("ADDRESSABLE_KINDS names unknown kind {kind}"))
        }
        other => ControllerError::Watch(format!("discovery of {} failed: {other}", gvk.kind)),
    }
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing SinkBinding Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Tracker enqueues go through a channel so reconciliation never runs
        // inside a change callback.
        let (enqueue_tx, enqueue_rx) = mpsc::unbounded::<ObserverKey>();
        let tracker = Arc::new(Tracker::new(config.lease_duration, move |observer| {
            if let Err(e) = enqueue_tx.unbounded_send(observer) {
                warn!("Dropped enqueue of {}: controller stopped", e.into_inner());
            }
        }));

        let store = KubeObjectStore::new(kube_client.clone());
        let resolver = DestinationResolver::new(
            Arc::new(store.clone()),
            Arc::clone(&tracker),
            config.resolver_config(),
        );
        let failures = Arc::new(FailureCounts::default());
        let reconciler = Arc::new(Reconciler::new(
            resolver,
            kube_client.clone(),
            config.resync_period,
            Arc::clone(&failures),
        ));

        let ns = config.namespace.as_deref();

        // Unknown addressable kinds fail startup before anything is spawned.
        if config.addressable_kinds.is_empty() {
            info!("No ADDRESSABLE_KINDS configured, only Service changes re-enqueue bindings");
        }
        let mut addressable_apis = Vec::with_capacity(config.addressable_kinds.len());
        for gvk in &config.addressable_kinds {
            let resource = store
                .discover(gvk)
                .await
                .map_err(|e| discovery_failure(gvk, e))?;
            let api: Api<DynamicObject> = match ns {
                Some(ns) => Api::namespaced_with(kube_client.clone(), ns, &resource),
                None => Api::all_with(kube_client.clone(), &resource),
            };
            addressable_apis.push((gvk.clone(), api));
        }

        let binding_api: Api<SinkBinding> = scoped_api(kube_client.clone(), ns);
        let service_api: Api<Service> = scoped_api(kube_client.clone(), ns);

        let mut tasks: Vec<(String, Task)> = vec![
            (
                "SinkBinding watcher".to_string(),
                tokio::spawn(watch_sink_bindings(binding_api.clone(), reconciler, enqueue_rx)),
            ),
            (
                "SinkBinding deletion watcher".to_string(),
                tokio::spawn(watch_binding_deletions(binding_api, Arc::clone(&tracker), failures)),
            ),
            (
                "Service change feed".to_string(),
                tokio::spawn(watch_services(service_api, Arc::clone(&tracker))),
            ),
            (
                "Lease compactor".to_string(),
                tokio::spawn(run_compactor(Arc::clone(&tracker), config.resync_period)),
            ),
        ];

        for (gvk, api) in addressable_apis {
            tasks.push((
                format!("{} change feed", gvk.kind),
                tokio::spawn(watch_addressables(api, gvk, Arc::clone(&tracker))),
            ));
        }

        Ok(Self { tasks })
    }

    /// Runs the controller until a task exits or the process is interrupted.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("SinkBinding Controller running");

        let (names, handles): (Vec<String>, Vec<Task>) = self.tasks.into_iter().unzip();

        // Every task is expected to run forever.
        tokio::select! {
            (result, index, remaining) = futures::future::select_all(handles) => {
                for handle in remaining {
                    handle.abort();
                }
                let name = &names[index];
                result
                    .map_err(|e| ControllerError::Watch(format!("{name} panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("{name} error: {e}")))?;
                warn!("{} exited", name);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}
