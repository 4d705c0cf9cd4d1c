//! Lease-based reverse index
//!
//! Maps the canonical key of a referenced object to the observers interested in
//! it. Named references live in exact buckets; selector references live in
//! selector buckets grouped by kind and namespace, since one change can match
//! many of them.

use crate::clock::{Clock, SystemClock};
use crate::error::TrackError;
use crate::observer::{ObjectIdentity, ObserverKey};
use crds::{LabelSelector, Reference};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Callback that schedules an observer for reconciliation.
///
/// Runs outside the index lock but on the caller's thread, so it must only
/// enqueue work, never perform it.
pub type EnqueueFn = Arc<dyn Fn(ObserverKey) + Send + Sync>;

/// A time-bounded record that an observer depends on a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Who to notify
    pub observer: ObserverKey,
    /// When the interest lapses unless renewed
    pub expires_at: Instant,
}

type Leases = HashMap<ObserverKey, Instant>;

#[derive(Debug)]
struct SelectorBucket {
    selector: LabelSelector,
    leases: Leases,
}

#[derive(Debug, Default)]
struct Index {
    /// canonical key -> leases
    exact: HashMap<String, Leases>,
    /// scope key (group/version/kind/namespace) -> canonical key -> bucket
    selectors: HashMap<String, HashMap<String, SelectorBucket>>,
}

/// Drops expired leases, returning how many were removed.
fn prune(leases: &mut Leases, now: Instant) -> usize {
    let before = leases.len();
    leases.retain(|_, expires_at| *expires_at > now);
    before - leases.len()
}

/// Tracks which observers depend on which objects and re-enqueues them on change.
///
/// Constructed once per process and shared (`Arc<Tracker>`) between the
/// reconcilers that call [`track`](Self::track) and the change feed that calls
/// [`on_changed`](Self::on_changed).
pub struct Tracker {
    lease_duration: Duration,
    enqueue: EnqueueFn,
    clock: Arc<dyn Clock>,
    index: Mutex<Index>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("lease_duration", &self.lease_duration)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Creates a tracker whose leases last `lease_duration` and which calls
    /// `enqueue` for every observer of a changed object.
    pub fn new<F>(lease_duration: Duration, enqueue: F) -> Self
    where
        F: Fn(ObserverKey) + Send + Sync + 'static,
    {
        Self::with_clock(lease_duration, enqueue, Arc::new(SystemClock))
    }

    /// Same as [`new`](Self::new) with an explicit time source.
    pub fn with_clock<F>(lease_duration: Duration, enqueue: F, clock: Arc<dyn Clock>) -> Self
    where
        F: Fn(ObserverKey) + Send + Sync + 'static,
    {
        Self {
            lease_duration,
            enqueue: Arc::new(enqueue),
            clock,
            index: Mutex::new(Index::default()),
        }
    }

    /// Duration every lease is granted for.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    fn index(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers (or renews) `observer`'s interest in `reference`.
    ///
    /// Repeated calls for the same pair keep a single lease and push its expiry
    /// forward. An invalid reference is rejected before the index is touched.
    pub fn track(&self, reference: &Reference, observer: &ObserverKey) -> Result<(), TrackError> {
        reference
            .validate()
            .map_err(|source| TrackError::InvalidReference {
                reference: reference.canonical_key(),
                source,
            })?;

        let expires_at = self.clock.now() + self.lease_duration;
        let key = reference.canonical_key();

        let mut index = self.index();
        let leases = match &reference.selector {
            Some(selector) => {
                &mut index
                    .selectors
                    .entry(reference.scope_key())
                    .or_default()
                    .entry(key.clone())
                    .or_insert_with(|| SelectorBucket {
                        selector: selector.clone(),
                        leases: Leases::new(),
                    })
                    .leases
            }
            None => index.exact.entry(key.clone()).or_default(),
        };

        let entry = leases.entry(observer.clone()).or_insert(expires_at);
        if *entry < expires_at {
            *entry = expires_at;
        }
        drop(index);

        debug!("{} tracks {} for {:?}", observer, key, self.lease_duration);
        Ok(())
    }

    /// Notifies every live observer of `changed`.
    ///
    /// Objects lacking a kind, namespace or name are ignored. Each observer is
    /// enqueued at most once per call, even when it matches through both a name
    /// and a selector.
    pub fn on_changed<O: ObjectIdentity + ?Sized>(&self, changed: &O) {
        let observers = self.collect(changed);
        if observers.is_empty() {
            return;
        }
        debug!("change notifies {} observer(s)", observers.len());
        for observer in observers {
            (self.enqueue)(observer);
        }
    }

    /// The live observers [`on_changed`](Self::on_changed) would notify for `changed`.
    pub fn observers_of<O: ObjectIdentity + ?Sized>(&self, changed: &O) -> Vec<ObserverKey> {
        self.collect(changed)
    }

    fn collect<O: ObjectIdentity + ?Sized>(&self, changed: &O) -> Vec<ObserverKey> {
        let (Some(gvk), Some(namespace), Some(name)) =
            (changed.gvk(), changed.namespace(), changed.name())
        else {
            trace!("ignoring change for object without full identity");
            return Vec::new();
        };
        if gvk.kind.is_empty() || namespace.is_empty() || name.is_empty() {
            return Vec::new();
        }

        let lookup = Reference::named(gvk.group, gvk.version, gvk.kind, namespace, name);
        let empty = BTreeMap::new();
        let labels = changed.labels().unwrap_or(&empty);
        let now = self.clock.now();

        let mut seen = HashSet::new();
        let mut observers = Vec::new();
        let mut notify = |leases: &Leases| {
            for observer in leases.keys() {
                if seen.insert(observer.clone()) {
                    observers.push(observer.clone());
                }
            }
        };

        let mut index = self.index();

        let key = lookup.canonical_key();
        if let Some(leases) = index.exact.get_mut(&key) {
            let expired = prune(leases, now);
            if expired > 0 {
                debug!("dropped {} expired lease(s) on {}", expired, key);
            }
            notify(leases);
            if leases.is_empty() {
                index.exact.remove(&key);
            }
        }

        let scope = lookup.scope_key();
        if let Some(buckets) = index.selectors.get_mut(&scope) {
            for (bucket_key, bucket) in buckets.iter_mut() {
                let expired = prune(&mut bucket.leases, now);
                if expired > 0 {
                    debug!("dropped {} expired lease(s) on {}", expired, bucket_key);
                }
                if bucket.selector.matches(labels) {
                    notify(&bucket.leases);
                }
            }
            buckets.retain(|_, bucket| !bucket.leases.is_empty());
            if buckets.is_empty() {
                index.selectors.remove(&scope);
            }
        }

        observers
    }

    /// Forgets every lease held by `observer`, e.g. after the observer was deleted.
    pub fn on_deleted_observer(&self, observer: &ObserverKey) {
        let mut removed = 0;
        let mut index = self.index();

        index.exact.retain(|_, leases| {
            removed += usize::from(leases.remove(observer).is_some());
            !leases.is_empty()
        });
        index.selectors.retain(|_, buckets| {
            buckets.retain(|_, bucket| {
                removed += usize::from(bucket.leases.remove(observer).is_some());
                !bucket.leases.is_empty()
            });
            !buckets.is_empty()
        });
        drop(index);

        if removed > 0 {
            debug!("released {} lease(s) held by deleted observer {}", removed, observer);
        }
    }

    /// Live leases in the bucket for `reference`. Expired leases found are dropped.
    pub fn leases_for(&self, reference: &Reference) -> Vec<Lease> {
        let now = self.clock.now();
        let key = reference.canonical_key();
        let mut index = self.index();

        let to_leases = |leases: &Leases| -> Vec<Lease> {
            leases
                .iter()
                .map(|(observer, expires_at)| Lease {
                    observer: observer.clone(),
                    expires_at: *expires_at,
                })
                .collect()
        };

        if reference.is_selector() {
            let scope = reference.scope_key();
            let Some(buckets) = index.selectors.get_mut(&scope) else {
                return Vec::new();
            };
            let Some(bucket) = buckets.get_mut(&key) else {
                return Vec::new();
            };
            prune(&mut bucket.leases, now);
            let live = to_leases(&bucket.leases);
            if live.is_empty() {
                buckets.remove(&key);
                if buckets.is_empty() {
                    index.selectors.remove(&scope);
                }
            }
            live
        } else {
            let Some(leases) = index.exact.get_mut(&key) else {
                return Vec::new();
            };
            prune(leases, now);
            let live = to_leases(leases);
            if live.is_empty() {
                index.exact.remove(&key);
            }
            live
        }
    }

    /// Sweeps the whole index, dropping expired leases and empty buckets.
    ///
    /// Never required for correctness; it only bounds memory held by references
    /// nobody reads anymore. Returns the number of leases removed.
    pub fn compact(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        let mut index = self.index();

        index.exact.retain(|_, leases| {
            removed += prune(leases, now);
            !leases.is_empty()
        });
        index.selectors.retain(|_, buckets| {
            buckets.retain(|_, bucket| {
                removed += prune(&mut bucket.leases, now);
                !bucket.leases.is_empty()
            });
            !buckets.is_empty()
        });
        drop(index);

        if removed > 0 {
            debug!("compaction dropped {} expired lease(s)", removed);
        }
        removed
    }

    /// Number of buckets currently held, named and selector combined.
    pub fn bucket_count(&self) -> usize {
        let index = self.index();
        index.exact.len() + index.selectors.values().map(HashMap::len).sum::<usize>()
    }
}
