//! Binding CRD Definitions
//!
//! Kubernetes custom resources and the shared reference/destination types used
//! by the tracker, the resolver and the binding controller.

pub mod address;
pub mod destination;
pub mod reference;
pub mod selector;
pub mod sink_binding;

pub use address::*;
pub use destination::*;
pub use reference::*;
pub use selector::*;
pub use sink_binding::*;
