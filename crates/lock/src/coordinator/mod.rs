//! Transactional writes to host-locked documents.
//!
//! [`TransactionCoordinator::run`] unlocks the active document if needed,
//! runs the operation, and leaves the lock as it found it:
//!
//! 1. resolve the active instance and classify its lock, fresh
//! 2. locked: activate the control and wait for the host to settle
//! 3. run the operation, capturing its result or panic
//! 4. restore (unless still in the startup grace period) with bounded,
//!    label-confirmed retries
//! 5. hand back the operation's result untouched
//!
//! Lock infrastructure failures are logged and absorbed. A missing control
//! fails open: the operation runs unguarded.
//!
//! Once the unlock has fired the restore always runs, even if the caller
//! stops polling the transaction; it is then finished on the runtime.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use marginalia_primitives::{EditorInstanceRef, ElementId};
use tokio::sync::OwnedMutexGuard;
use tokio::time::{Instant, sleep};
use tracing::Instrument;

use crate::error::LockError;
use crate::host::LockHost;
use crate::resolver::Resolution;
use crate::signal::SignalReader;

mod gate;
mod policy;

use gate::InstanceGates;
pub use policy::{Backoff, RestorePolicy, TransactionSettings};

/// Per-invocation bookkeeping. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionRecord {
	pub was_locked_beforehand: bool,
	pub restore_attempts: u32,
}

/// Result of one restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
	Confirmed,
	Unconfirmed,
}

/// Restore work owed after an unlock.
struct PendingRestore {
	name: String,
	instance: EditorInstanceRef,
	record: TransactionRecord,
}

struct CoordinatorInner {
	host: Arc<dyn LockHost>,
	reader: SignalReader,
	settings: TransactionSettings,
	constructed_at: Instant,
	gates: InstanceGates,
}

/// Wraps operations with unlock-before / restore-after semantics.
#[derive(Clone)]
pub struct TransactionCoordinator {
	inner: Arc<CoordinatorInner>,
}

impl TransactionCoordinator {
	/// Creates a coordinator. The restore grace period starts now.
	pub fn new(host: Arc<dyn LockHost>, reader: SignalReader, settings: TransactionSettings) -> Self {
		Self {
			inner: Arc::new(CoordinatorInner {
				host,
				reader,
				settings,
				constructed_at: Instant::now(),
				gates: InstanceGates::default(),
			}),
		}
	}

	pub fn settings(&self) -> &TransactionSettings {
		&self.inner.settings
	}

	/// Whether restores are still suppressed after construction.
	pub fn in_grace_period(&self) -> bool {
		self.inner.in_grace_period()
	}

	/// Runs `operation` while the active document is writable.
	///
	/// The operation's error (or panic) reaches the caller only after the
	/// restore phase finished; lock failures never do.
	pub async fn run<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let Some(resolution) = self.inner.reader.resolver().resolve() else {
			tracing::warn!(name, reason = %LockError::NoActiveInstance, "lock.txn.fail_open");
			return operation().await;
		};
		let instance = resolution.instance.id;

		if gate::is_enclosed(instance) {
			tracing::debug!(name, %instance, "lock.txn.nested");
			return operation().await;
		}

		let span = tracing::debug_span!("lock.txn", name, %instance, rule = ?resolution.rule);
		let transaction = async {
			let permit = if self.inner.settings.serialize_per_instance {
				Some(self.inner.gates.acquire(instance).await)
			} else {
				None
			};
			gate::enclose(instance, self.transact(name, resolution, permit, operation)).await
		};
		transaction.instrument(span).await
	}

	async fn transact<T, E, F, Fut>(&self, name: &str, resolution: Resolution, permit: Option<OwnedMutexGuard<()>>, operation: F) -> Result<T, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let inner = &self.inner;
		let instance = resolution.instance.clone();
		let probe = inner.reader.probe_resolved(Some(resolution));
		let mut guard = RestoreGuard {
			inner: Arc::clone(inner),
			pending: None,
			permit,
		};

		match &probe.control {
			None => {
				tracing::warn!(name, reason = %LockError::ControlNotFound { instance: instance.id }, "lock.txn.fail_open");
			}
			Some(control) if probe.classification.is_locked => {
				if inner.begin_unlock(name, &instance, control.element) {
					guard.pending = Some(PendingRestore {
						name: name.to_owned(),
						instance: instance.clone(),
						record: TransactionRecord {
							was_locked_beforehand: true,
							restore_attempts: 0,
						},
					});
					inner.settle_unlock(name, &instance).await;
				}
			}
			Some(_) => {
				if let Some(reason) = probe.failure() {
					tracing::warn!(name, instance = %instance.id, %reason, "lock.txn.fail_open");
				}
			}
		}

		let outcome = AssertUnwindSafe(async move { operation().await }).catch_unwind().await;
		guard.finish().await;

		match outcome {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => {
				tracing::debug!(name, "lock.txn.operation_failed");
				Err(err)
			}
			Err(panic) => {
				tracing::warn!(name, "lock.txn.operation_panicked");
				std::panic::resume_unwind(panic)
			}
		}
	}
}

impl CoordinatorInner {
	fn in_grace_period(&self) -> bool {
		self.constructed_at.elapsed() < self.settings.grace_period
	}

	/// Activates a locked control. Returns whether the unlock fired.
	fn begin_unlock(&self, name: &str, instance: &EditorInstanceRef, control: ElementId) -> bool {
		if let Err(err) = self.host.activate(control) {
			tracing::warn!(name, instance = %instance.id, error = %LockError::from(err), "lock.txn.unlock_failed");
			return false;
		}
		true
	}

	/// Gives the host time to apply the unlock.
	async fn settle_unlock(&self, name: &str, instance: &EditorInstanceRef) {
		sleep(self.settings.unlock_settle).await;
		if self.reader.classify(instance).is_locked {
			tracing::warn!(name, instance = %instance.id, "lock.txn.unlock_unsettled");
		} else {
			tracing::debug!(name, instance = %instance.id, "lock.txn.unlocked");
		}
	}

	async fn restore(&self, pending: &mut PendingRestore) {
		let instance = pending.instance.id;
		if self.in_grace_period() {
			tracing::info!(name = %pending.name, %instance, "lock.txn.restore_skipped_grace");
			return;
		}

		let policy = &self.settings.restore;
		for attempt in 1..=policy.max_attempts {
			pending.record.restore_attempts = attempt;
			if self.restore_attempt(pending, attempt).await == AttemptOutcome::Confirmed {
				tracing::debug!(name = %pending.name, %instance, attempt, "lock.txn.restored");
				return;
			}
			if attempt < policy.max_attempts {
				sleep(policy.backoff.delay(attempt)).await;
			}
		}

		let err = LockError::ActivationNotConfirmed {
			instance,
			attempts: pending.record.restore_attempts,
		};
		tracing::warn!(name = %pending.name, error = %err, "lock.txn.restore_gave_up");
	}

	/// Activates the control unless it already reads locked, then checks the label.
	async fn restore_attempt(&self, pending: &PendingRestore, attempt: u32) -> AttemptOutcome {
		let control = match self.reader.locate(&pending.instance) {
			Ok(control) => control,
			Err(err) => {
				tracing::warn!(name = %pending.name, attempt, error = %err, "lock.txn.restore_attempt");
				return AttemptOutcome::Unconfirmed;
			}
		};

		// A lagging label must not make a retry toggle the document back open.
		if self.reader.rules().classify(&control.signals).is_locked {
			tracing::debug!(name = %pending.name, attempt, "lock.txn.restore_awaiting_label");
		} else if let Err(err) = self.host.activate(control.element) {
			tracing::warn!(name = %pending.name, attempt, error = %LockError::from(err), "lock.txn.restore_attempt");
			return AttemptOutcome::Unconfirmed;
		}

		sleep(self.settings.restore.confirm_delay).await;
		let confirmed = self
			.reader
			.locate(&pending.instance)
			.ok()
			.and_then(|control| control.signals.label)
			.is_some_and(|label| self.reader.rules().label_confirms_locked(&label));
		if confirmed {
			AttemptOutcome::Confirmed
		} else {
			tracing::debug!(name = %pending.name, attempt, "lock.txn.restore_unconfirmed");
			AttemptOutcome::Unconfirmed
		}
	}
}

/// Owes a restore from the moment the unlock fired.
///
/// Dropped before [`RestoreGuard::finish`] completes (the caller stopped
/// polling), it finishes the restore on the runtime instead.
struct RestoreGuard {
	inner: Arc<CoordinatorInner>,
	pending: Option<PendingRestore>,
	/// Keeps other transactions on the instance queued until restore ends.
	permit: Option<OwnedMutexGuard<()>>,
}

impl RestoreGuard {
	async fn finish(&mut self) {
		if let Some(pending) = self.pending.as_mut() {
			self.inner.restore(pending).await;
			tracing::debug!(
				name = %pending.name,
				was_locked_beforehand = pending.record.was_locked_beforehand,
				restore_attempts = pending.record.restore_attempts,
				"lock.txn.done"
			);
		}
		self.pending = None;
	}
}

impl Drop for RestoreGuard {
	fn drop(&mut self) {
		let Some(mut pending) = self.pending.take() else {
			return;
		};
		tracing::warn!(name = %pending.name, instance = %pending.instance.id, "lock.txn.abandoned");
		let inner = Arc::clone(&self.inner);
		let permit = self.permit.take();
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					inner.restore(&mut pending).await;
					drop(permit);
				});
			}
			Err(_) => {
				tracing::warn!(name = %pending.name, "lock.txn.restore_lost");
			}
		}
	}
}

#[cfg(test)]
mod tests;
