//! Mock object store for unit testing
//!
//! Keeps objects in memory, keyed by the canonical key of their reference, and
//! counts lookups so tests can assert the store was (or was not) consulted.

use crate::store::{
    AddressableObject, ObjectStore, ServiceEndpoint, ServicePort, StoreError, StoredObject,
};
use crds::Reference;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory [`ObjectStore`]. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MockObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    lookups: Arc<AtomicUsize>,
}

impl MockObjectStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an object (for test setup)
    pub fn insert(&self, reference: &Reference, object: StoredObject) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.canonical_key(), object);
    }

    /// Add a service exposing `ports`, with optional annotations
    pub fn add_service(&self, reference: &Reference, ports: Vec<ServicePort>, annotations: &[(&str, &str)]) {
        let annotations: BTreeMap<String, String> = annotations
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.insert(
            reference,
            StoredObject::Service(ServiceEndpoint { annotations, ports }),
        );
    }

    /// Add an addressable object publishing `url`
    pub fn add_addressable(&self, reference: &Reference, url: &str) {
        self.insert(
            reference,
            StoredObject::Addressable(AddressableObject::with_url(Some(url))),
        );
    }

    /// Remove an object
    pub fn remove(&self, reference: &Reference) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&reference.canonical_key());
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn get_by_reference(&self, reference: &Reference) -> Result<StoredObject, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = reference.canonical_key();
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }
}
