//! Kubernetes resource watchers.
//!
//! Two kinds of watchers run side by side:
//! - the SinkBinding reconcile loop, driven by `kube_runtime::Controller`;
//! - change feeds on referenced kinds (`Service` and the configured
//!   addressable kinds) that only notify the tracker.
//!
//! The tracker turns a change into the keys of the bindings that reference
//! the changed object; those keys arrive on the enqueue channel and are fed
//! into the SinkBinding controller's own queue.

use crate::error::ControllerError;
use crate::reconciler::{FailureCounts, Reconciler};
use crds::SinkBinding;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::Api;
use kube_runtime::controller::Config as RuntimeConfig;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracker::{ChangedObject, ObserverKey, Tracker};

/// Every watch runs for the life of the process, so its end is an error.
fn stream_ended(what: &str) -> ControllerError {
    ControllerError::Watch(format!("{what} stream ended"))
}

/// Reference to the binding behind a tracker enqueue.
pub fn binding_ref(observer: &ObserverKey) -> ObjectRef<SinkBinding> {
    ObjectRef::new(&observer.name).within(&observer.namespace)
}

/// Runs the SinkBinding reconcile loop.
///
/// Bindings arriving on `enqueued` share the controller's queue, so a binding
/// is never reconciled twice at once and failures go through the error policy.
pub async fn watch_sink_bindings(
    api: Api<SinkBinding>,
    reconciler: Arc<Reconciler>,
    enqueued: UnboundedReceiver<ObserverKey>,
) -> Result<(), ControllerError> {
    info!("Starting SinkBinding watcher");

    let reconcile = |binding: Arc<SinkBinding>, ctx: Arc<Reconciler>| async move {
        ctx.reconcile_sink_binding(&binding).await
    };
    let error_policy = |binding: Arc<SinkBinding>, err: &ControllerError, ctx: Arc<Reconciler>| {
        ctx.error_policy(&binding, err)
    };

    // Debounce batches the burst of events from our own status patches.
    let config = RuntimeConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(8);

    Controller::new(api, watcher::Config::default())
        .with_config(config)
        .reconcile_on(enqueued.map(|observer| {
            debug!("Re-enqueued {}", observer);
            binding_ref(&observer)
        }))
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled SinkBinding {}", obj),
                Err(e) => warn!("SinkBinding controller error: {}", e),
            }
        })
        .await;

    Err(stream_ended("SinkBinding controller"))
}

/// Releases the leases and failure history of a deleted binding.
pub fn forget_binding(tracker: &Tracker, failures: &FailureCounts, observer: &ObserverKey) {
    tracker.on_deleted_observer(observer);
    failures.reset(observer);
}

/// Forgets deleted bindings.
pub async fn watch_binding_deletions(
    api: Api<SinkBinding>,
    tracker: Arc<Tracker>,
    failures: Arc<FailureCounts>,
) -> Result<(), ControllerError> {
    info!("Starting SinkBinding deletion watcher");

    let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Delete(binding)) => {
                if let Some(observer) = ObserverKey::from_resource(&binding) {
                    info!("SinkBinding deleted: {}", observer);
                    forget_binding(&tracker, &failures, &observer);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("SinkBinding deletion watcher error: {}", e),
        }
    }

    Err(stream_ended("SinkBinding deletion"))
}

/// Feeds Service changes to the tracker.
pub async fn watch_services(api: Api<Service>, tracker: Arc<Tracker>) -> Result<(), ControllerError> {
    feed_changes(api, tracker, "Service", |svc: &Service| ChangedObject::from_resource(svc)).await
}

/// Feeds changes of one addressable kind to the tracker.
pub async fn watch_addressables(
    api: Api<DynamicObject>,
    gvk: GroupVersionKind,
    tracker: Arc<Tracker>,
) -> Result<(), ControllerError> {
    let kind = format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind);
    // List responses may omit apiVersion/kind on items, so the identity is
    // built from the watched kind rather than the object.
    feed_changes(api, tracker, &kind, move |obj: &DynamicObject| {
        ChangedObject::new(
            &gvk.group,
            &gvk.version,
            &gvk.kind,
            obj.metadata.namespace.as_deref(),
            obj.metadata.name.as_deref(),
        )
        .with_labels(obj.metadata.labels.clone().unwrap_or_default())
    })
    .await
}

/// Calls [`Tracker::on_changed`] for every applied or deleted object.
async fn feed_changes<K, F>(
    api: Api<K>,
    tracker: Arc<Tracker>,
    kind: &str,
    snapshot: F,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Debug + serde::de::DeserializeOwned + Send + 'static,
    F: Fn(&K) -> ChangedObject,
{
    info!("Starting {} change feed", kind);

    let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(obj) | watcher::Event::Delete(obj)) => {
                tracker.on_changed(&snapshot(&obj));
            }
            Ok(watcher::Event::InitApply(obj)) => {
                // A relist may hide changes missed while disconnected.
                tracker.on_changed(&snapshot(&obj));
            }
            Ok(watcher::Event::Init) => debug!("{} change feed initializing", kind),
            Ok(watcher::Event::InitDone) => info!("{} change feed initialization complete", kind),
            Err(e) => warn!("{} change feed error: {}", kind, e),
        }
    }

    Err(stream_ended(&format!("{kind} change")))
}

/// Periodically drops expired leases.
pub async fn run_compactor(tracker: Arc<Tracker>, period: Duration) -> Result<(), ControllerError> {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = tracker.compact();
        debug!("Compacted {} expired leases, {} buckets remain", removed, tracker.bucket_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::Reference;

    fn binding(name: &str) -> ObserverKey {
        ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "team-a", name)
    }

    #[test]
    fn test_binding_ref_targets_enqueued_binding() {
        let r = binding_ref(&binding("b1"));
        assert_eq!(r.name, "b1");
        assert_eq!(r.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_ended_stream_is_a_watch_error() {
        let err = stream_ended("SinkBinding controller");
        assert!(matches!(err, ControllerError::Watch(_)), "{err}");
        assert_eq!(err.to_string(), "Resource watch failed: SinkBinding controller stream ended");
    }

    #[test]
    fn test_forget_binding_clears_leases_and_failures() {
        let tracker = Tracker::new(Duration::from_secs(60), |_| {});
        let failures = FailureCounts::default();
        let web = Reference::named("", "v1", "Service", "team-a", "web");

        tracker.track(&web, &binding("b1")).unwrap();
        tracker.track(&web, &binding("b2")).unwrap();
        failures.record(&binding("b1"));
        failures.record(&binding("b1"));
        failures.record(&binding("b2"));

        forget_binding(&tracker, &failures, &binding("b1"));

        let leases = tracker.leases_for(&web);
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].observer, binding("b2"));
        assert_eq!(failures.record(&binding("b1")), 1);
        assert_eq!(failures.record(&binding("b2")), 2);
    }
}
