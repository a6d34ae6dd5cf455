use crate::ids::ElementId;

/// A user activation (click, tap) intercepted before the host handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationEvent {
	/// Innermost element the activation landed on.
	pub target: ElementId,
}

/// An attribute change observed anywhere in the host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMutation {
	pub target: ElementId,
	/// Name of the attribute that changed.
	pub attribute: String,
}
