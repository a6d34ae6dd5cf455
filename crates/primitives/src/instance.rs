use std::time::Instant;

use crate::ids::{ElementId, InstanceId};

/// Shape of the host shell, which decides how instances are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostVariant {
	/// Desktop shell: any number of editors across several windows.
	#[default]
	Desktop,
	/// Constrained shell (mobile) that only ever hosts one editor.
	SingleInstance,
}

/// Snapshot of a host-owned document editor.
///
/// The host creates and destroys editors; this is an observation taken at
/// one point in time and carries no ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorInstanceRef {
	/// Host-assigned instance identity.
	pub id: InstanceId,
	/// Root element of the editor.
	pub root: ElementId,
	/// Lock control element, when the host has rendered one.
	pub lock_control: Option<ElementId>,
	/// When the editor last received focus.
	pub last_focused_at: Option<Instant>,
	/// Whether the editor lives in the focused top-level window.
	pub in_active_window: bool,
}

impl EditorInstanceRef {
	/// Creates an unfocused instance without a lock control.
	pub const fn new(id: InstanceId, root: ElementId) -> Self {
		Self {
			id,
			root,
			lock_control: None,
			last_focused_at: None,
			in_active_window: false,
		}
	}

	#[must_use]
	pub const fn with_lock_control(mut self, control: ElementId) -> Self {
		self.lock_control = Some(control);
		self
	}

	#[must_use]
	pub const fn focused_at(mut self, at: Instant) -> Self {
		self.last_focused_at = Some(at);
		self
	}

	#[must_use]
	pub const fn in_active_window(mut self, active: bool) -> Self {
		self.in_active_window = active;
		self
	}
}
