//! Per-instance transaction serialization.

use std::future::Future;
use std::sync::Arc;

use marginalia_primitives::InstanceId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::OwnedMutexGuard;

tokio::task_local! {
	/// Instances whose transaction encloses the current task's code.
	static ENCLOSING: Vec<InstanceId>;
}

/// Whether the current task is already inside a transaction on `instance`.
pub(crate) fn is_enclosed(instance: InstanceId) -> bool {
	ENCLOSING.try_with(|ids| ids.contains(&instance)).unwrap_or(false)
}

/// Runs `fut` marked as enclosed by a transaction on `instance`.
pub(crate) async fn enclose<F: Future>(instance: InstanceId, fut: F) -> F::Output {
	let mut ids = ENCLOSING.try_with(Clone::clone).unwrap_or_default();
	ids.push(instance);
	ENCLOSING.scope(ids, fut).await
}

/// One async mutex per instance, created on demand.
#[derive(Default)]
pub(crate) struct InstanceGates {
	gates: Mutex<FxHashMap<InstanceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceGates {
	/// Waits for exclusive access to `instance`.
	pub(crate) async fn acquire(&self, instance: InstanceId) -> OwnedMutexGuard<()> {
		let gate = {
			let mut gates = self.gates.lock();
			// Idle gates are only referenced by the map.
			gates.retain(|_, gate| Arc::strong_count(gate) > 1);
			Arc::clone(gates.entry(instance).or_default())
		};
		gate.lock_owned().await
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.gates.lock().len()
	}
}
