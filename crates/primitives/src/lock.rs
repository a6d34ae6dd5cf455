use crate::ids::ElementId;

/// Raw signals read off a lock control.
///
/// Every field is optional and set independently by the host; the host may
/// update them on different ticks after an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LockSignals {
	/// Discrete subtype token, e.g. `lock` or `unlock`.
	pub subtype: Option<String>,
	/// Human-readable descriptive label.
	pub label: Option<String>,
	/// Icon reference identifier, e.g. `#iconUnlock`.
	pub icon: Option<String>,
}

impl LockSignals {
	#[must_use]
	pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
		self.subtype = Some(subtype.into());
		self
	}

	#[must_use]
	pub fn label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	#[must_use]
	pub fn icon(mut self, icon: impl Into<String>) -> Self {
		self.icon = Some(icon.into());
		self
	}
}

/// A located lock control and the signals it carried when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockControl {
	pub element: ElementId,
	pub signals: LockSignals,
}

/// How a classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Confidence {
	/// Decided from the subtype token or the icon reference.
	Structural,
	/// No structural signal was present.
	Unavailable,
}

/// Edit permission inferred from a lock control snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockClassification {
	pub is_locked: bool,
	pub confidence: Confidence,
}

impl LockClassification {
	/// Classification used when nothing could be read. Treated as unlocked.
	pub const UNAVAILABLE: Self = Self {
		is_locked: false,
		confidence: Confidence::Unavailable,
	};

	pub const fn structural(is_locked: bool) -> Self {
		Self {
			is_locked,
			confidence: Confidence::Structural,
		}
	}

	pub const fn is_available(&self) -> bool {
		matches!(self.confidence, Confidence::Structural)
	}
}
