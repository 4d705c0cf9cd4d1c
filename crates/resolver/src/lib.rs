//! Destination Resolver
//!
//! Turns a destination (a URI, a reference to an addressable object, or both)
//! into an absolute URI. Resolving a reference registers a lease with the
//! [`Tracker`](tracker::Tracker) first, so the observer is re-enqueued when
//! the referenced object changes, including when it appears or becomes ready.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use crds::{DestinationSpec, Reference};
//! use resolver::{DestinationResolver, KubeObjectStore, ResolverConfig};
//! use tracker::{ObserverKey, Tracker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let tracker = Arc::new(Tracker::new(Duration::from_secs(1800), |_| {}));
//! let resolver = DestinationResolver::new(
//!     Arc::new(KubeObjectStore::new(client)),
//!     tracker,
//!     ResolverConfig::default(),
//! );
//!
//! let sink = DestinationSpec::from_ref(Reference::named("", "v1", "Service", "default", "web"))
//!     .with_path("/events");
//! let observer = ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "default", "b1");
//! let uri = resolver.uri_from_destination(&sink, &observer).await?;
//! println!("sink resolved to {uri}");
//! # Ok(())
//! # }
//! ```

pub mod destination;
pub mod error;
pub mod kube_store;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod ports;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod resolver_test;

pub use destination::{Destination, DestinationError, Target};
pub use error::{ErrorClass, ResolveError};
pub use kube_store::KubeObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockObjectStore;
pub use resolver::{DestinationResolver, ResolverConfig};
pub use store::{
    Addressable, AddressableObject, ObjectStore, PortExposing, ServiceEndpoint, ServicePort,
    StoreError, StoredObject,
};

/// Re-exported so callers can build and inspect resolved URLs.
pub use reqwest::Url;
