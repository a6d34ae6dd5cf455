use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use marginalia_primitives::{InstanceId, LockSignals};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::time::{Instant, sleep, timeout};

use super::*;
use crate::signal::SignalRules;
use crate::test_helpers::FakeHost;

const DOC: InstanceId = InstanceId(1);

fn settings() -> TransactionSettings {
	TransactionSettings {
		grace_period: Duration::ZERO,
		..TransactionSettings::default()
	}
}

fn coordinator(host: &Arc<FakeHost>, settings: TransactionSettings) -> TransactionCoordinator {
	let host: Arc<dyn LockHost> = host.clone();
	let reader = SignalReader::new(Arc::clone(&host), SignalRules::default());
	TransactionCoordinator::new(host, reader, settings)
}

/// Locked structurally, but the label still reads unlocked.
fn locked_with_stale_label() -> LockSignals {
	LockSignals::default().subtype("lock").icon("#iconLock").label("Unlocked")
}

#[tokio::test(start_paused = true)]
async fn locked_document_is_writable_during_operation_and_relocked_after() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());

	let probe = Arc::clone(&host);
	let result = coord
		.run("insert", || async move {
			assert_eq!(probe.is_locked(DOC), Some(false));
			Ok::<_, ()>(42)
		})
		.await;

	assert_eq!(result, Ok(42));
	assert_eq!(host.is_locked(DOC), Some(true));
	assert_eq!(host.label(DOC).as_deref(), Some("Locked"));
	assert_eq!(host.activation_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn operation_error_is_returned_after_restore() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());

	let result: Result<(), &str> = coord.run("insert", || async { Err("write rejected") }).await;

	assert_eq!(result, Err("write rejected"));
	assert_eq!(host.is_locked(DOC), Some(true));
}

#[tokio::test(start_paused = true)]
async fn unlocked_document_is_never_touched() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, false);
	let coord = coordinator(&host, settings());

	let started = Instant::now();
	let result = coord.run("insert", || async { Ok::<_, ()>("done") }).await;

	assert_eq!(result, Ok("done"));
	assert_eq!(host.activation_count(), 0);
	assert_eq!(host.is_locked(DOC), Some(false));
	assert!(started.elapsed() < Duration::from_millis(1), "no settle wait without an unlock");

	let failed: Result<(), &str> = coord.run("insert", || async { Err("write rejected") }).await;
	assert_eq!(failed, Err("write rejected"));
	assert_eq!(host.activation_count(), 0);
	assert_eq!(host.is_locked(DOC), Some(false));
}

#[tokio::test(start_paused = true)]
async fn missing_control_or_instance_fails_open() {
	let host = FakeHost::new();
	let coord = coordinator(&host, settings());
	assert_eq!(coord.run("insert", || async { Ok::<_, ()>(1) }).await, Ok(1));

	host.add_instance(DOC);
	assert_eq!(coord.run("insert", || async { Ok::<_, ()>(42) }).await, Ok(42));
	assert_eq!(host.activation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn restore_is_skipped_during_grace_period() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, TransactionSettings::default());
	assert!(coord.in_grace_period());

	coord.run("insert", || async { Ok::<_, ()>(()) }).await.unwrap();
	assert_eq!(host.is_locked(DOC), Some(false), "startup restores would fight host init");
	assert_eq!(host.activation_count(), 1);

	host.set_signals(DOC, LockSignals::default().subtype("lock").icon("#iconLock").label("Locked"));
	sleep(Duration::from_secs(3)).await;
	assert!(!coord.in_grace_period());
	coord.run("insert", || async { Ok::<_, ()>(()) }).await.unwrap();
	assert_eq!(host.is_locked(DOC), Some(true));
	assert_eq!(host.activation_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_restore_gives_up_after_max_attempts_without_retoggling() {
	let host = FakeHost::new();
	host.add_instance(DOC);
	host.set_control(DOC, FakeHost::control_of(DOC), locked_with_stale_label());
	host.freeze_labels(true);
	let coord = coordinator(&host, settings());

	let started = Instant::now();
	let result = coord.run("insert", || async { Ok::<_, ()>(7) }).await;

	assert_eq!(result, Ok(7));
	// Unlock plus the first restore; later attempts see the structural lock.
	assert_eq!(host.activation_count(), 2);
	assert_eq!(host.is_locked(DOC), Some(true));
	// settle + 3 confirms + 2 backoffs
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_millis(1350) && elapsed < Duration::from_millis(1400), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn lagging_label_confirms_on_a_later_attempt() {
	let host = FakeHost::new();
	host.add_instance(DOC);
	host.set_control(DOC, FakeHost::control_of(DOC), locked_with_stale_label());
	host.set_label_lag(Duration::from_millis(350));
	let coord = coordinator(&host, settings());

	let started = Instant::now();
	coord.run("insert", || async { Ok::<_, ()>(()) }).await.unwrap();

	assert_eq!(host.activation_count(), 2);
	assert_eq!(host.label(DOC).as_deref(), Some("Locked"));
	// settle + confirm + backoff + confirm
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_millis(850) && elapsed < Duration::from_millis(900), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn rejected_unlock_runs_operation_unguarded() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	host.reject_activations(true);
	let coord = coordinator(&host, settings());

	let result = coord.run("insert", || async { Ok::<_, ()>(3) }).await;

	assert_eq!(result, Ok(3));
	assert_eq!(host.activation_count(), 0);
	assert_eq!(host.is_locked(DOC), Some(true));
}

#[tokio::test(start_paused = true)]
async fn transactions_on_one_instance_do_not_interleave() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());
	let log = Arc::new(Mutex::new(Vec::new()));

	let op = |tag: &'static str| {
		let log = Arc::clone(&log);
		let host = Arc::clone(&host);
		move || async move {
			log.lock().push((tag, "start", host.is_locked(DOC)));
			sleep(Duration::from_millis(50)).await;
			log.lock().push((tag, "end", host.is_locked(DOC)));
			Ok::<_, ()>(())
		}
	};
	let (a, b) = tokio::join!(coord.run("a", op("a")), coord.run("b", op("b")));
	a.unwrap();
	b.unwrap();

	assert_eq!(
		*log.lock(),
		vec![
			("a", "start", Some(false)),
			("a", "end", Some(false)),
			("b", "start", Some(false)),
			("b", "end", Some(false)),
		]
	);
	assert_eq!(host.is_locked(DOC), Some(true));
	assert_eq!(host.activation_count(), 4);
	assert_eq!(coord.inner.gates.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn nested_run_on_same_instance_runs_directly() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());

	let nested = coord.clone();
	let result = coord
		.run("outer", || async move { nested.run("inner", || async { Ok::<_, ()>(5) }).await })
		.await;

	assert_eq!(result, Ok(5));
	assert_eq!(host.activation_count(), 2, "only the outer transaction toggles");
	assert_eq!(host.is_locked(DOC), Some(true));
}

#[tokio::test(start_paused = true)]
async fn panicking_operation_still_restores() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());

	let probe = Arc::clone(&host);
	let outcome = std::panic::AssertUnwindSafe(coord.run("insert", || async move {
		if probe.is_locked(DOC) == Some(false) {
			panic!("operation blew up");
		}
		Ok::<_, ()>(())
	}))
	.catch_unwind()
	.await;

	assert!(outcome.is_err());
	assert_eq!(host.is_locked(DOC), Some(true));
	assert_eq!(host.activation_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_transaction_restores_in_background() {
	let host = FakeHost::new();
	host.add_instance_with_lock(DOC, true);
	let coord = coordinator(&host, settings());

	let pending = coord.run("stuck", || std::future::pending::<Result<(), ()>>());
	assert!(timeout(Duration::from_millis(500), pending).await.is_err());
	assert_eq!(host.is_locked(DOC), Some(false));

	sleep(Duration::from_secs(1)).await;
	assert_eq!(host.is_locked(DOC), Some(true));
	assert_eq!(host.activation_count(), 2);
}
