//! Reconciliation logic for SinkBinding CRDs.
//!
//! This module resolves the sink of a `SinkBinding` with the binding as the
//! observer, publishes the result in the binding status and decides when the
//! binding is looked at again.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use crds::{BindingState, SinkBinding, SinkBindingStatus};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::controller::Action;
use resolver::{DestinationResolver, ErrorClass, ResolveError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracker::ObserverKey;

/// Consecutive reconcile failures per binding.
///
/// Shared with the deletion watcher so a binding deleted while failing does
/// not leave its count behind.
#[derive(Debug, Default)]
pub struct FailureCounts {
    counts: Mutex<HashMap<ObserverKey, u32>>,
}

impl FailureCounts {
    /// Counts one more failure for `observer` and returns the new total.
    pub fn record(&self, observer: &ObserverKey) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(observer.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forgets the failure history of `observer`.
    pub fn reset(&self, observer: &ObserverKey) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(observer);
    }
}

/// Reconciles SinkBinding resources.
pub struct Reconciler {
    resolver: DestinationResolver,
    client: Client,
    resync_period: Duration,
    backoff: FibonacciBackoff,
    failures: Arc<FailureCounts>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        resolver: DestinationResolver,
        client: Client,
        resync_period: Duration,
        failures: Arc<FailureCounts>,
    ) -> Self {
        Self {
            resolver,
            client,
            resync_period,
            backoff: FibonacciBackoff::default(),
            failures,
        }
    }

    /// SinkBinding API for `namespace`.
    fn bindings(&self, namespace: &str) -> Api<SinkBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Reconciles a SinkBinding resource.
    ///
    /// This method:
    /// 1. Resolves `spec.sink` (defaulting its namespace to the binding's),
    ///    which also renews the lease on the referenced object
    /// 2. Patches the status if the outcome changed
    /// 3. Requeues after the resync period on success
    ///
    /// Resolution failures are returned after the status is patched, so the
    /// error policy picks the retry delay.
    pub async fn reconcile_sink_binding(&self, binding: &SinkBinding) -> Result<Action, ControllerError> {
        let name = binding
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("SinkBinding missing name".to_string()))?;
        let namespace = binding
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig(format!("SinkBinding {name} missing namespace")))?;
        let observer = ObserverKey::from_resource(binding)
            .ok_or_else(|| ControllerError::InvalidConfig(format!("SinkBinding {namespace}/{name} has no identity")))?;

        info!("Reconciling SinkBinding {}/{}", namespace, name);

        let sink = binding.spec.sink.clone().with_default_namespace(namespace);
        let result = self.resolver.uri_from_destination(&sink, &observer).await;

        let status = status_for(&result, Utc::now());
        if needs_update(binding.status.as_ref(), &status) {
            let patch = status_patch(&status);
            self.bindings(namespace)
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|e| {
                    error!("Failed to update SinkBinding {}/{} status: {}", namespace, name, e);
                    ControllerError::Kube(e)
                })?;
        } else {
            debug!("SinkBinding {}/{} status unchanged", namespace, name);
        }

        match result {
            Ok(uri) => {
                self.failures.reset(&observer);
                info!("SinkBinding {}/{} bound to {}", namespace, name, uri);
                Ok(Action::requeue(self.resync_period))
            }
            Err(e) => Err(ControllerError::Resolve(e)),
        }
    }

    /// Decides when a binding whose reconciliation failed is retried.
    ///
    /// Transient failures back off along the Fibonacci schedule; everything
    /// else waits for the resync period (or for the tracker to re-enqueue).
    pub fn error_policy(&self, binding: &SinkBinding, err: &ControllerError) -> Action {
        let Some(observer) = ObserverKey::from_resource(binding) else {
            return Action::requeue(self.resync_period);
        };

        let failures = self.failures.record(&observer);
        let delay = requeue_delay(err, failures, &self.backoff, self.resync_period);
        if err.is_transient() {
            warn!("SinkBinding {} not ready ({} failures), retrying in {:?}: {}", observer, failures, delay, err);
        } else {
            error!("SinkBinding {} failed, retrying in {:?}: {}", observer, delay, err);
        }
        Action::requeue(delay)
    }
}

/// Status describing the outcome of a resolution.
pub fn status_for(result: &Result<String, ResolveError>, now: DateTime<Utc>) -> SinkBindingStatus {
    match result {
        Ok(uri) => SinkBindingStatus {
            sink_uri: Some(uri.clone()),
            state: BindingState::Ready,
            last_reconciled: Some(now),
            error: None,
        },
        Err(e) => SinkBindingStatus {
            sink_uri: None,
            state: match e.class() {
                ErrorClass::Transient => BindingState::Pending,
                ErrorClass::Caller | ErrorClass::Configuration => BindingState::Failed,
            },
            last_reconciled: Some(now),
            error: Some(e.to_string()),
        },
    }
}

/// Whether `next` differs from `current` in anything but the timestamp.
pub fn needs_update(current: Option<&SinkBindingStatus>, next: &SinkBindingStatus) -> bool {
    current.is_none_or(|current| {
        current.sink_uri != next.sink_uri || current.state != next.state || current.error != next.error
    })
}

/// Merge patch for `status`; unset optional fields are sent as `null` so the
/// patch clears them.
pub fn status_patch(status: &SinkBindingStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "sinkUri": status.sink_uri,
            "state": status.state,
            "error": status.error,
            "lastReconciled": status.last_reconciled,
        }
    })
}

/// Retry delay after `failures` consecutive failures with `err`.
pub fn requeue_delay(
    err: &ControllerError,
    failures: u32,
    backoff: &FibonacciBackoff,
    resync_period: Duration,
) -> Duration {
    if err.is_transient() {
        backoff.delay_for(failures).min(resync_period)
    } else {
        resync_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use resolver::DestinationError;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn not_found() -> ResolveError {
        ResolveError::NotFound {
            reference: "serving.example.dev/v1, Kind=Route, ns/r".to_string(),
        }
    }

    #[test]
    fn test_status_ready() {
        let status = status_for(&Ok("http://web.ns.svc.cluster.local".to_string()), now());
        assert_eq!(status.state, BindingState::Ready);
        assert_eq!(status.sink_uri.as_deref(), Some("http://web.ns.svc.cluster.local"));
        assert_eq!(status.error, None);
        assert_eq!(status.last_reconciled, Some(now()));
    }

    #[test]
    fn test_status_pending_on_transient() {
        let status = status_for(&Err(not_found()), now());
        assert_eq!(status.state, BindingState::Pending);
        assert_eq!(status.sink_uri, None);
        assert!(status.error.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn test_status_failed_on_caller_error() {
        let status = status_for(&Err(ResolveError::InvalidDestination(DestinationError::Empty)), now());
        assert_eq!(status.state, BindingState::Failed);
        assert!(status.error.as_deref().unwrap().contains("expected at least one"));
    }

    #[test]
    fn test_needs_update_ignores_timestamp() {
        let ready = status_for(&Ok("http://a".to_string()), now());
        let mut later = ready.clone();
        later.last_reconciled = Some(now() + chrono::Duration::minutes(10));
        assert!(!needs_update(Some(&ready), &later));

        let moved = status_for(&Ok("http://b".to_string()), now());
        assert!(needs_update(Some(&ready), &moved));
        assert!(needs_update(None, &ready));
    }

    #[test]
    fn test_status_patch_clears_unset_fields() {
        let patch = status_patch(&status_for(&Err(not_found()), now()));
        assert_eq!(patch["status"]["state"], "Pending");
        assert!(patch["status"]["sinkUri"].is_null());
        assert!(patch["status"].as_object().unwrap().contains_key("sinkUri"));

        let patch = status_patch(&status_for(&Ok("http://a".to_string()), now()));
        assert_eq!(patch["status"]["sinkUri"], "http://a");
        assert!(patch["status"]["error"].is_null());
    }

    #[test]
    fn test_failure_counts_accumulate_and_reset() {
        let failures = FailureCounts::default();
        let b1 = ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "ns", "b1");
        let b2 = ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "ns", "b2");

        assert_eq!(failures.record(&b1), 1);
        assert_eq!(failures.record(&b1), 2);
        assert_eq!(failures.record(&b2), 1);

        failures.reset(&b1);
        assert_eq!(failures.record(&b1), 1);
        assert_eq!(failures.record(&b2), 2);
    }

    #[test]
    fn test_requeue_delay() {
        let backoff = FibonacciBackoff::new(2, 300);
        let resync = Duration::from_secs(600);

        let transient = ControllerError::Resolve(not_found());
        assert_eq!(requeue_delay(&transient, 1, &backoff, resync), Duration::from_secs(2));
        assert_eq!(requeue_delay(&transient, 5, &backoff, resync), Duration::from_secs(10));
        assert_eq!(
            requeue_delay(&transient, 5, &backoff, Duration::from_secs(3)),
            Duration::from_secs(3)
        );

        let ambiguous = ControllerError::Resolve(ResolveError::AmbiguousPort {
            reference: "v1, Kind=Service, ns/web".to_string(),
            count: 2,
            annotation: "bindings.microscaler.io/port".to_string(),
        });
        assert_eq!(requeue_delay(&ambiguous, 5, &backoff, resync), resync);

        let config = ControllerError::InvalidConfig("SinkBinding missing name".to_string());
        assert_eq!(requeue_delay(&config, 1, &backoff, resync), resync);
    }
}
