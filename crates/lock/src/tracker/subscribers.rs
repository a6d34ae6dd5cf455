use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
	next_id: u64,
	entries: Vec<(u64, Callback)>,
}

/// Ordered set of transition callbacks.
#[derive(Default, Clone)]
pub(crate) struct SubscriberRegistry {
	inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriberRegistry {
	pub(crate) fn insert(&self, callback: Callback) -> Subscription {
		let mut inner = self.inner.lock();
		inner.next_id = inner.next_id.wrapping_add(1);
		let id = inner.next_id;
		inner.entries.push((id, callback));
		Subscription {
			id,
			registry: Arc::downgrade(&self.inner),
		}
	}

	/// Invokes every callback in subscription order.
	///
	/// Callbacks run outside the registry lock so they may subscribe or
	/// unsubscribe re-entrantly.
	pub(crate) fn notify(&self, locked: bool) {
		let callbacks: Vec<Callback> = self.inner.lock().entries.iter().map(|(_, cb)| Arc::clone(cb)).collect();
		for callback in callbacks {
			callback(locked);
		}
	}

	pub(crate) fn clear(&self) {
		self.inner.lock().entries.clear();
	}

	pub(crate) fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}
}

/// Handle to a transition callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
	id: u64,
	registry: Weak<Mutex<RegistryInner>>,
}

impl Subscription {
	pub fn unsubscribe(self) {}

	/// Whether the callback is still registered.
	pub fn is_active(&self) -> bool {
		self.registry
			.upgrade()
			.is_some_and(|inner| inner.lock().entries.iter().any(|(id, _)| *id == self.id))
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(inner) = self.registry.upgrade() {
			inner.lock().entries.retain(|(id, _)| *id != self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
	}
}
