//! Active-instance resolution.
//!
//! Picks the editor the user is most likely addressing when several are
//! open. Precedence, first match wins:
//!
//! 1. the instance owning the text selection or caret
//! 2. an instance in the focused top-level window (most recently focused first)
//! 3. the most recently focused instance overall
//!
//! Single-instance hosts always resolve to their one editor.

use std::sync::Arc;

use marginalia_primitives::{EditorInstanceRef, HostVariant, InstanceId};

use crate::host::LockHost;

/// Which precedence rule selected the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
	SoleInstance,
	Selection,
	ActiveWindow,
	RecentFocus,
}

/// A resolved active instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
	pub instance: EditorInstanceRef,
	pub rule: ResolvedBy,
}

#[derive(Clone)]
pub struct InstanceResolver {
	host: Arc<dyn LockHost>,
}

impl InstanceResolver {
	pub fn new(host: Arc<dyn LockHost>) -> Self {
		Self { host }
	}

	/// Resolves the active instance, or `None` when no editor is open.
	pub fn resolve(&self) -> Option<Resolution> {
		let mut instances = self.host.instances();
		let selection = self.host.selection_owner();
		let (index, rule) = pick_active(self.host.variant(), &instances, selection)?;
		let instance = instances.swap_remove(index);
		tracing::trace!(instance = %instance.id, ?rule, "lock.resolve");
		Some(Resolution { instance, rule })
	}
}

/// Returns the index of the active instance and the rule that chose it.
pub fn pick_active(variant: HostVariant, instances: &[EditorInstanceRef], selection_owner: Option<InstanceId>) -> Option<(usize, ResolvedBy)> {
	if instances.is_empty() {
		return None;
	}
	if variant == HostVariant::SingleInstance {
		return Some((0, ResolvedBy::SoleInstance));
	}

	if let Some(owner) = selection_owner
		&& let Some(index) = instances.iter().position(|i| i.id == owner)
	{
		return Some((index, ResolvedBy::Selection));
	}

	if let Some(index) = most_recent(instances, |i| i.in_active_window) {
		return Some((index, ResolvedBy::ActiveWindow));
	}

	most_recent(instances, |_| true).map(|index| (index, ResolvedBy::RecentFocus))
}

/// Most recently focused instance among those passing `filter`.
///
/// Never-focused instances rank below focused ones; ties keep the earlier
/// enumeration position.
fn most_recent(instances: &[EditorInstanceRef], filter: impl Fn(&EditorInstanceRef) -> bool) -> Option<usize> {
	let mut best: Option<usize> = None;
	for (index, inst) in instances.iter().enumerate().filter(|(_, i)| filter(i)) {
		match best {
			Some(b) if instances[b].last_focused_at >= inst.last_focused_at => {}
			_ => best = Some(index),
		}
	}
	best
}

#[cfg(test)]
mod tests {
	use std::time::{Duration, Instant};

	use marginalia_primitives::ElementId;
	use rstest::rstest;

	use super::*;

	fn inst(id: u64) -> EditorInstanceRef {
		EditorInstanceRef::new(InstanceId(id), ElementId(id * 10))
	}

	#[test]
	fn empty_host_resolves_nothing() {
		assert_eq!(pick_active(HostVariant::Desktop, &[], None), None);
		assert_eq!(pick_active(HostVariant::SingleInstance, &[], Some(InstanceId(1))), None);
	}

	#[test]
	fn selection_wins_over_window_and_focus() {
		let t0 = Instant::now();
		let instances = [
			inst(1).in_active_window(true).focused_at(t0 + Duration::from_secs(5)),
			inst(2).focused_at(t0),
		];
		assert_eq!(pick_active(HostVariant::Desktop, &instances, Some(InstanceId(2))), Some((1, ResolvedBy::Selection)));
	}

	#[test]
	fn stale_selection_owner_falls_through() {
		let instances = [inst(1), inst(2).in_active_window(true)];
		assert_eq!(pick_active(HostVariant::Desktop, &instances, Some(InstanceId(9))), Some((1, ResolvedBy::ActiveWindow)));
	}

	#[test]
	fn active_window_prefers_most_recent_focus() {
		let t0 = Instant::now();
		let instances = [
			inst(1).in_active_window(true).focused_at(t0),
			inst(2).focused_at(t0 + Duration::from_secs(9)),
			inst(3).in_active_window(true).focused_at(t0 + Duration::from_secs(1)),
		];
		assert_eq!(pick_active(HostVariant::Desktop, &instances, None), Some((2, ResolvedBy::ActiveWindow)));
	}

	#[rstest]
	#[case::latest_timestamp(&[Some(1), Some(4), Some(2)], 1)]
	#[case::never_focused_ranks_last(&[None, Some(0), None], 1)]
	#[case::ties_keep_first(&[Some(3), Some(3)], 0)]
	#[case::no_timestamps(&[None, None], 0)]
	fn recent_focus_fallback(#[case] focus_secs: &[Option<u64>], #[case] expected: usize) {
		let t0 = Instant::now();
		let instances: Vec<_> = focus_secs
			.iter()
			.enumerate()
			.map(|(i, secs)| {
				let inst = inst(i as u64);
				match secs {
					Some(s) => inst.focused_at(t0 + Duration::from_secs(*s)),
					None => inst,
				}
			})
			.collect();
		assert_eq!(pick_active(HostVariant::Desktop, &instances, None), Some((expected, ResolvedBy::RecentFocus)));
	}

	#[test]
	fn single_instance_host_ignores_heuristics() {
		let instances = [inst(1), inst(2).in_active_window(true)];
		assert_eq!(
			pick_active(HostVariant::SingleInstance, &instances, Some(InstanceId(2))),
			Some((0, ResolvedBy::SoleInstance))
		);
	}
}
