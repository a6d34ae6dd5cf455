//! The lock subsystem handle shared across feature modules.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::LockConfig;
use crate::coordinator::{TransactionCoordinator, TransactionSettings};
use crate::host::LockHost;
use crate::signal::{SignalReader, SignalRules};
use crate::tracker::{LockStateTracker, Subscription};

struct ServiceInner {
	config: LockConfig,
	reader: SignalReader,
	tracker: LockStateTracker,
	coordinator: TransactionCoordinator,
	torn_down: AtomicBool,
}

/// Owns the tracker and coordinator for one host.
///
/// Constructed once by the plugin root; clones are cheap handles onto the
/// same subsystem. Construction starts the restore grace period.
#[derive(Clone)]
pub struct LockService {
	inner: Arc<ServiceInner>,
}

impl LockService {
	pub fn new(host: Arc<dyn LockHost>, config: LockConfig) -> Self {
		let reader = SignalReader::new(Arc::clone(&host), SignalRules::from(&config.signals));
		let tracker = LockStateTracker::new(Arc::clone(&host), reader.clone(), config.tracker.clone());
		let coordinator = TransactionCoordinator::new(host, reader.clone(), TransactionSettings::from(&config));
		tracing::debug!(
			grace_period = ?coordinator.settings().grace_period,
			serialize_per_instance = coordinator.settings().serialize_per_instance,
			"lock.service.new"
		);
		Self {
			inner: Arc::new(ServiceInner {
				config,
				reader,
				tracker,
				coordinator,
				torn_down: AtomicBool::new(false),
			}),
		}
	}

	pub fn config(&self) -> &LockConfig {
		&self.inner.config
	}

	pub fn tracker(&self) -> &LockStateTracker {
		&self.inner.tracker
	}

	pub fn coordinator(&self) -> &TransactionCoordinator {
		&self.inner.coordinator
	}

	/// Starts lock monitoring. Ignored once torn down.
	pub fn start(&self) {
		if self.is_torn_down() {
			tracing::debug!("lock.service.closed");
			return;
		}
		self.inner.tracker.start();
	}

	pub fn stop(&self) {
		self.inner.tracker.stop();
	}

	/// Stops monitoring, drops all subscribers and refuses further transactions.
	pub fn teardown(&self) {
		if self.inner.torn_down.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.tracker.teardown();
		tracing::debug!("lock.service.teardown");
	}

	pub fn is_torn_down(&self) -> bool {
		self.inner.torn_down.load(Ordering::Acquire)
	}

	/// Runs `operation` inside a lock transaction.
	///
	/// Returns `Ok(None)` without running it after [`teardown`](Self::teardown).
	pub async fn run<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<Option<T>, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if self.is_torn_down() {
			tracing::debug!(name, "lock.service.closed");
			return Ok(None);
		}
		self.inner.coordinator.run(name, operation).await.map(Some)
	}

	/// Fresh read of the active instance's lock, failing open.
	pub fn is_locked(&self) -> bool {
		self.inner.reader.is_locked()
	}

	pub fn is_editable(&self) -> bool {
		!self.is_locked()
	}

	/// See [`LockStateTracker::subscribe`].
	pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
		self.inner.tracker.subscribe(callback)
	}

	pub fn force_update(&self) -> bool {
		self.inner.tracker.force_update()
	}

	pub fn current_state(&self) -> Option<bool> {
		self.inner.tracker.current_state()
	}
}
