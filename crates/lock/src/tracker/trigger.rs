//! Re-classification triggers.
//!
//! Two independent producers (activation interception and attribute
//! observation) filter host events down to lock controls and push
//! [`Trigger`]s into one queue. A single consumer debounces the queue and
//! fires one re-classification per burst, at the latest settle deadline any
//! trigger in the burst asked for, bounded by the longest settle delay
//! counted from the burst's first trigger.

use std::sync::Arc;
use std::time::Duration;

use marginalia_primitives::{ActivationEvent, AttributeMutation};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::host::LockHost;

/// Which producer requested a re-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
	Activation,
	Attribute,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Trigger {
	pub source: TriggerSource,
	/// Delay letting the host's own handlers settle first.
	pub settle: Duration,
}

/// Forwards activations landing on or inside a lock control.
pub(crate) async fn forward_activations(
	host: Arc<dyn LockHost>,
	mut events: mpsc::UnboundedReceiver<ActivationEvent>,
	queue: mpsc::UnboundedSender<Trigger>,
	settle: Duration,
	cancel: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			event = events.recv() => event,
		};
		let Some(event) = event else {
			tracing::debug!("lock.tracker.activation_listener_closed");
			break;
		};
		if !host.is_within_lock_control(event.target) {
			continue;
		}
		tracing::trace!(target_element = %event.target, "lock.tracker.activation");
		let trigger = Trigger {
			source: TriggerSource::Activation,
			settle,
		};
		if queue.send(trigger).is_err() {
			break;
		}
	}
}

/// Forwards attribute changes on elements that are or contain a lock control.
pub(crate) async fn forward_mutations(
	host: Arc<dyn LockHost>,
	mut events: mpsc::UnboundedReceiver<AttributeMutation>,
	queue: mpsc::UnboundedSender<Trigger>,
	settle: Duration,
	cancel: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			event = events.recv() => event,
		};
		let Some(mutation) = event else {
			tracing::debug!("lock.tracker.attribute_observer_closed");
			break;
		};
		if !host.contains_lock_control(mutation.target) {
			continue;
		}
		tracing::trace!(target_element = %mutation.target, attribute = %mutation.attribute, "lock.tracker.mutation");
		let trigger = Trigger {
			source: TriggerSource::Attribute,
			settle,
		};
		if queue.send(trigger).is_err() {
			break;
		}
	}
}

/// A run of triggers that settles into one re-classification.
#[derive(Debug, Clone, Copy)]
struct Burst {
	deadline: Instant,
	source: TriggerSource,
	/// No trigger may push `deadline` past this.
	cap: Instant,
	/// Triggers that wanted to settle beyond `cap`: (first arrival, latest deadline, source).
	overflow: Option<(Instant, Instant, TriggerSource)>,
}

impl Burst {
	fn open(arrived: Instant, deadline: Instant, source: TriggerSource, max_wait: Duration) -> Self {
		Self {
			deadline,
			source,
			cap: (arrived + max_wait).max(deadline),
			overflow: None,
		}
	}

	fn absorb(&mut self, arrived: Instant, at: Instant, source: TriggerSource) {
		if at <= self.deadline {
			return;
		}
		if at <= self.cap {
			self.deadline = at;
			self.source = source;
			return;
		}
		self.deadline = self.cap;
		self.overflow = match self.overflow {
			Some((first, latest, kept)) if latest >= at => Some((first, latest, kept)),
			Some((first, ..)) => Some((first, at, source)),
			None => Some((arrived, at, source)),
		};
	}

	/// The burst that continues after this one fires, if any trigger overflowed.
	fn carry_over(self, max_wait: Duration) -> Option<Self> {
		self.overflow
			.map(|(arrived, deadline, source)| Self::open(arrived, deadline, source, max_wait))
	}
}

/// Debounces the trigger queue, calling `fire` once per settled burst.
///
/// A burst fires at the latest settle deadline its triggers asked for, but
/// never later than `max_wait` after its first trigger, so a steady stream of
/// triggers still re-classifies periodically. Triggers cut short by that cap
/// open the next burst.
///
/// Returns when cancelled or once every producer has hung up and nothing is
/// pending.
pub(crate) async fn drain_debounced<F>(mut queue: mpsc::UnboundedReceiver<Trigger>, max_wait: Duration, cancel: CancellationToken, mut fire: F)
where
	F: FnMut(TriggerSource),
{
	let mut pending: Option<Burst> = None;
	let mut open = true;

	loop {
		if !open && pending.is_none() {
			break;
		}
		let deadline = pending.map_or_else(Instant::now, |burst| burst.deadline);
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			trigger = queue.recv(), if open => match trigger {
				Some(trigger) => {
					let now = Instant::now();
					let at = now + trigger.settle;
					match pending.as_mut() {
						Some(burst) => burst.absorb(now, at, trigger.source),
						None => pending = Some(Burst::open(now, at, trigger.source, max_wait)),
					}
				}
				None => open = false,
			},
			_ = sleep_until(deadline), if pending.is_some() => {
				if let Some(burst) = pending.take() {
					fire(burst.source);
					pending = burst.carry_over(max_wait);
				}
			}
		}
	}
}
