//! Core types shared between the lock coordination core and editor hosts.

/// Host event payloads delivered to lock observers.
pub mod event;
/// Identifier types for host-owned elements and editor instances.
pub mod ids;
/// Editor instance snapshots and host variants.
pub mod instance;
/// Lock control snapshots and classifications.
pub mod lock;

pub use event::{ActivationEvent, AttributeMutation};
pub use ids::{ElementId, InstanceId};
pub use instance::{EditorInstanceRef, HostVariant};
pub use lock::{Confidence, LockClassification, LockControl, LockSignals};
