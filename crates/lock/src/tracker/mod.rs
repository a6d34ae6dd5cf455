//! Push-model lock state tracking.
//!
//! [`LockStateTracker`] caches the active instance's lock classification and
//! re-derives it when a lock control is activated or its attributes change.
//! Subscribers hear about transitions only, never about repeated identical
//! classifications.
//!
//! # States
//!
//! `Stopped -> Monitoring` via [`LockStateTracker::start`], back via
//! [`LockStateTracker::stop`]. Stopping keeps subscribers and the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;
use crate::host::LockHost;
use crate::signal::SignalReader;

mod subscribers;
mod trigger;

pub use subscribers::Subscription;
use subscribers::SubscriberRegistry;
pub use trigger::TriggerSource;
use trigger::{drain_debounced, forward_activations, forward_mutations};

struct TrackerShared {
	reader: SignalReader,
	cached: Mutex<Option<bool>>,
	subscribers: SubscriberRegistry,
	/// Held from classification through notification so subscribers see
	/// transitions in cache order. Re-entrant: callbacks may force updates.
	updating: ReentrantMutex<()>,
}

impl TrackerShared {
	/// Reclassifies, and on change updates the cache and notifies subscribers.
	fn update_state(&self, cause: &'static str) -> bool {
		let _updating = self.updating.lock();
		let probe = self.reader.probe();
		let locked = probe.classification.is_locked;
		let previous = self.cached.lock().replace(locked);
		if previous == Some(locked) {
			tracing::trace!(locked, cause, "lock.tracker.unchanged");
			return locked;
		}

		tracing::debug!(
			instance = ?probe.instance_id(),
			locked,
			?previous,
			confidence = ?probe.classification.confidence,
			cause,
			"lock.tracker.transition"
		);
		self.subscribers.notify(locked);
		locked
	}
}

/// Live producer and consumer tasks of one monitoring session.
struct Monitor {
	generation: u64,
	cancel: CancellationToken,
	tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
	fn shutdown(self) {
		self.cancel.cancel();
		for task in self.tasks {
			task.abort();
		}
		tracing::debug!(generation = self.generation, "lock.tracker.stop");
	}
}

/// Cached, trigger-driven lock classification with transition subscribers.
pub struct LockStateTracker {
	host: Arc<dyn LockHost>,
	shared: Arc<TrackerShared>,
	config: TrackerConfig,
	monitor: Mutex<Option<Monitor>>,
	generations: AtomicU64,
}

impl LockStateTracker {
	pub fn new(host: Arc<dyn LockHost>, reader: SignalReader, config: TrackerConfig) -> Self {
		Self {
			host,
			shared: Arc::new(TrackerShared {
				reader,
				cached: Mutex::new(None),
				subscribers: SubscriberRegistry::default(),
				updating: ReentrantMutex::new(()),
			}),
			config,
			monitor: Mutex::new(None),
			generations: AtomicU64::new(0),
		}
	}

	/// Classifies once, then installs both re-classification triggers.
	///
	/// A second call while monitoring logs and does nothing.
	///
	/// # Panics
	///
	/// Panics when called outside a tokio runtime.
	pub fn start(&self) {
		if let Some(generation) = self.monitor.lock().as_ref().map(|m| m.generation) {
			tracing::debug!(generation, "lock.tracker.already_started");
			return;
		}

		// Subscribers run inside update_state; keep the monitor lock released.
		self.shared.update_state("start");

		let mut monitor = self.monitor.lock();
		if monitor.is_some() {
			return;
		}
		let generation = self.generations.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
		let cancel = CancellationToken::new();
		let (queue_tx, queue_rx) = mpsc::unbounded_channel();

		let activations = tokio::spawn(forward_activations(
			Arc::clone(&self.host),
			self.host.intercept_activations(),
			queue_tx.clone(),
			self.config.activation_settle(),
			cancel.child_token(),
		));
		let mutations = tokio::spawn(forward_mutations(
			Arc::clone(&self.host),
			self.host.observe_attributes(),
			queue_tx,
			self.config.attribute_settle(),
			cancel.child_token(),
		));
		let shared = Arc::clone(&self.shared);
		let max_wait = self.config.activation_settle().max(self.config.attribute_settle());
		let consumer = tokio::spawn(drain_debounced(queue_rx, max_wait, cancel.child_token(), move |source| {
			let cause = match source {
				TriggerSource::Activation => "activation",
				TriggerSource::Attribute => "attribute",
			};
			shared.update_state(cause);
		}));

		tracing::debug!(generation, "lock.tracker.start");
		*monitor = Some(Monitor {
			generation,
			cancel,
			tasks: vec![activations, mutations, consumer],
		});
	}

	/// Removes both triggers. Subscribers and the cached value survive.
	pub fn stop(&self) {
		if let Some(monitor) = self.monitor.lock().take() {
			monitor.shutdown();
		}
	}

	pub fn is_monitoring(&self) -> bool {
		self.monitor.lock().is_some()
	}

	/// Registers a transition callback.
	///
	/// The callback runs immediately with the cached value when one exists.
	pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
		let callback: Arc<dyn Fn(bool) + Send + Sync> = Arc::new(callback);
		let _updating = self.shared.updating.lock();
		let subscription = self.shared.subscribers.insert(Arc::clone(&callback));
		let cached = *self.shared.cached.lock();
		if let Some(locked) = cached {
			callback(locked);
		}
		subscription
	}

	/// Reclassifies now, notifying subscribers on change. Returns the lock state.
	pub fn force_update(&self) -> bool {
		self.shared.update_state("manual")
	}

	/// Cached classification, `None` until the first one.
	pub fn current_state(&self) -> Option<bool> {
		*self.shared.cached.lock()
	}

	pub fn subscriber_count(&self) -> usize {
		self.shared.subscribers.len()
	}

	/// Stops monitoring, drops every subscriber and forgets the cached value.
	pub(crate) fn teardown(&self) {
		self.stop();
		self.shared.subscribers.clear();
		*self.shared.cached.lock() = None;
	}
}

impl Drop for LockStateTracker {
	fn drop(&mut self) {
		self.stop();
	}
}
