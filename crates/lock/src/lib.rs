//! Lock detection, tracking and transactional writes for documents whose
//! editor host exposes a read-only toggle.
//!
//! The host owns editors and their lock controls; this crate only observes
//! them through [`LockHost`]. [`LockService`] ties the pieces together:
//!
//! * [`InstanceResolver`] picks the editor the user is addressing.
//! * [`SignalReader`] classifies that editor's lock from structural signals.
//! * [`LockStateTracker`] caches the classification and pushes transitions.
//! * [`TransactionCoordinator`] unlocks, runs a write, and restores the lock.
//!
//! Every lock failure fails open: an indeterminate state counts as unlocked.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod resolver;
pub mod service;
pub mod signal;
#[doc(hidden)]
pub mod test_helpers;
pub mod tracker;

pub use config::LockConfig;
pub use coordinator::{Backoff, RestorePolicy, TransactionCoordinator, TransactionRecord, TransactionSettings};
pub use error::{ConfigError, HostError, LockError};
pub use host::LockHost;
pub use resolver::{InstanceResolver, Resolution, ResolvedBy};
pub use service::LockService;
pub use signal::{LockProbe, SignalReader, SignalRules};
pub use tracker::{LockStateTracker, Subscription, TriggerSource};
