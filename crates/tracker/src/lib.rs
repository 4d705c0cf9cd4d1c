//! Reference Tracker
//!
//! Lets a reconciler declare "observer X depends on object Y" and get X
//! re-enqueued whenever Y changes, without polling and without remembering
//! dependencies forever.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use crds::Reference;
//! use tracker::{ChangedObject, ObserverKey, Tracker};
//!
//! let tracker = Tracker::new(Duration::from_secs(1800), |observer| {
//!     println!("requeue {observer}");
//! });
//!
//! let web = Reference::named("", "v1", "Service", "default", "web");
//! let binding = ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "default", "b1");
//! tracker.track(&web, &binding)?;
//!
//! let changed = ChangedObject::new("", "v1", "Service", Some("default"), Some("web"));
//! assert_eq!(tracker.observers_of(&changed), vec![binding]);
//! # Ok::<(), tracker::TrackError>(())
//! ```
//!
//! Leases are never swept by a background task: expiry is checked whenever a
//! bucket is read, and expired leases are dropped at that point.

pub mod clock;
pub mod error;
pub mod observer;
pub mod tracker;

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use error::TrackError;
pub use observer::{ChangedObject, ObjectIdentity, ObserverKey};
pub use tracker::{Lease, Tracker};
