//! The seam between the lock core and the editor host.

use marginalia_primitives::{ActivationEvent, AttributeMutation, EditorInstanceRef, ElementId, HostVariant, InstanceId, LockControl};
use tokio::sync::mpsc;

use crate::error::HostError;

/// Everything the lock core consumes from the editor host.
///
/// Reads are synchronous snapshots of host UI state. The host owns the
/// instances and controls; implementations must not cache on the core's behalf.
pub trait LockHost: Send + Sync + 'static {
	fn variant(&self) -> HostVariant {
		HostVariant::Desktop
	}

	/// Open editor instances in host enumeration order.
	fn instances(&self) -> Vec<EditorInstanceRef>;

	/// Instance containing the current text selection or caret.
	fn selection_owner(&self) -> Option<InstanceId>;

	/// Locates the lock control in the instance's header and snapshots it.
	fn lock_control(&self, instance: &EditorInstanceRef) -> Option<LockControl>;

	/// Simulates a user activation on `element`.
	fn activate(&self, element: ElementId) -> Result<(), HostError>;

	/// Whether `element` is a lock control or lies inside one.
	fn is_within_lock_control(&self, element: ElementId) -> bool;

	/// Whether `element` is a lock control or has one among its descendants.
	fn contains_lock_control(&self, element: ElementId) -> bool;

	/// Installs a document-wide, capture-phase activation listener.
	///
	/// Dropping the receiver removes the listener.
	fn intercept_activations(&self) -> mpsc::UnboundedReceiver<ActivationEvent>;

	/// Installs an attribute observer over the whole document subtree.
	///
	/// Dropping the receiver disconnects the observer.
	fn observe_attributes(&self) -> mpsc::UnboundedReceiver<AttributeMutation>;
}
