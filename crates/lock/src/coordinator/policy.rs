use std::time::Duration;

use crate::config::{BackoffConfig, LockConfig, RestoreConfig};

/// Delay between unconfirmed restore attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
	Fixed(Duration),
	/// `initial * factor^(attempt - 1)`, capped at `max`.
	Exponential { initial: Duration, factor: f64, max: Duration },
}

impl Backoff {
	/// Wait after the failed `attempt` (1-based) before the next one.
	pub fn delay(&self, attempt: u32) -> Duration {
		match *self {
			Self::Fixed(delay) => delay,
			Self::Exponential { initial, factor, max } => {
				let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
				let nanos = initial.as_nanos() as f64 * factor.powi(exponent);
				if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
					max
				} else {
					Duration::from_nanos(nanos as u64)
				}
			}
		}
	}
}

impl From<BackoffConfig> for Backoff {
	fn from(config: BackoffConfig) -> Self {
		match config {
			BackoffConfig::Fixed { delay_ms } => Self::Fixed(Duration::from_millis(delay_ms)),
			BackoffConfig::Exponential { initial_ms, factor, max_ms } => Self::Exponential {
				initial: Duration::from_millis(initial_ms),
				factor,
				max: Duration::from_millis(max_ms),
			},
		}
	}
}

/// Bounded retry policy for restoring a lock after a transaction.
///
/// An attempt only activates the control while it still reads unlocked.
/// Once it reads locked, remaining attempts just wait `confirm_delay` for
/// the label to catch up, so retries never toggle the document back open.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorePolicy {
	pub max_attempts: u32,
	/// Wait after each restore activation before reading the label.
	pub confirm_delay: Duration,
	pub backoff: Backoff,
}

impl Default for RestorePolicy {
	fn default() -> Self {
		Self::from(&RestoreConfig::default())
	}
}

impl From<&RestoreConfig> for RestorePolicy {
	fn from(config: &RestoreConfig) -> Self {
		Self {
			max_attempts: config.max_attempts.max(1),
			confirm_delay: Duration::from_millis(config.confirm_delay_ms),
			backoff: config.backoff.into(),
		}
	}
}

/// Timing and isolation of transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSettings {
	/// Wait after the unlock activation before running the operation.
	pub unlock_settle: Duration,
	/// Restores are skipped until this long after construction.
	pub grace_period: Duration,
	pub serialize_per_instance: bool,
	pub restore: RestorePolicy,
}

impl Default for TransactionSettings {
	fn default() -> Self {
		Self::from(&LockConfig::default())
	}
}

impl From<&LockConfig> for TransactionSettings {
	fn from(config: &LockConfig) -> Self {
		Self {
			unlock_settle: config.transaction.unlock_settle(),
			grace_period: config.transaction.grace_period(),
			serialize_per_instance: config.transaction.serialize_per_instance,
			restore: RestorePolicy::from(&config.restore),
		}
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn fixed_backoff_is_constant() {
		let backoff = Backoff::Fixed(Duration::from_millis(300));
		assert!((1..=5).all(|attempt| backoff.delay(attempt) == Duration::from_millis(300)));
	}

	#[rstest]
	#[case(1, 100)]
	#[case(2, 200)]
	#[case(3, 400)]
	#[case(4, 500)]
	#[case(40, 500)]
	fn exponential_backoff_grows_then_caps(#[case] attempt: u32, #[case] expected_ms: u64) {
		let backoff = Backoff::Exponential {
			initial: Duration::from_millis(100),
			factor: 2.0,
			max: Duration::from_millis(500),
		};
		assert_eq!(backoff.delay(attempt), Duration::from_millis(expected_ms));
	}

	#[test]
	fn defaults_mirror_config_defaults() {
		let policy = RestorePolicy::default();
		assert_eq!(policy.max_attempts, 3);
		assert_eq!(policy.confirm_delay, Duration::from_millis(200));
		assert_eq!(policy.backoff, Backoff::Fixed(Duration::from_millis(300)));

		let settings = TransactionSettings::default();
		assert_eq!(settings.unlock_settle, Duration::from_millis(150));
		assert_eq!(settings.grace_period, Duration::from_secs(3));
		assert!(settings.serialize_per_instance);
	}
}
