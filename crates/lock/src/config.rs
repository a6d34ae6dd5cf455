//! Lock coordination configuration.
//!
//! Every value has a default, so an empty document is a valid config. Delays
//! are written in milliseconds:
//!
//! ```toml
//! [transaction]
//! grace_period_ms = 3000
//!
//! [restore]
//! max_attempts = 3
//! backoff = { kind = "exponential", initial_ms = 150, factor = 2.0, max_ms = 1000 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level lock configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
	pub signals: SignalConfig,
	pub tracker: TrackerConfig,
	pub transaction: TransactionConfig,
	pub restore: RestoreConfig,
}

impl LockConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(src)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml(&src)?;
		tracing::debug!(path = %path.display(), "lock.config.loaded");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.restore.max_attempts == 0 {
			return Err(ConfigError::Invalid("restore.max_attempts must be at least 1".into()));
		}
		if self.signals.unlocked_subtype.is_empty() {
			return Err(ConfigError::Invalid("signals.unlocked_subtype must not be empty".into()));
		}
		if self.signals.locked_phrases.iter().any(|p| p.trim().is_empty()) {
			return Err(ConfigError::Invalid("signals.locked_phrases must not contain blank phrases".into()));
		}
		if let BackoffConfig::Exponential { factor, initial_ms, max_ms } = self.restore.backoff {
			if !factor.is_finite() || factor < 1.0 {
				return Err(ConfigError::Invalid(format!("restore.backoff.factor must be finite and >= 1.0, got {factor}")));
			}
			if max_ms < initial_ms {
				return Err(ConfigError::Invalid("restore.backoff.max_ms must not be below initial_ms".into()));
			}
		}
		Ok(())
	}
}

/// Signal vocabulary of the host's lock control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalConfig {
	/// Subtype token meaning "unlocked". Any other token means locked.
	pub unlocked_subtype: String,
	/// Icon reference meaning "unlocked". Any other icon means locked.
	pub unlocked_icon: String,
	/// Label phrases confirming a locked document after a restore.
	pub locked_phrases: Vec<String>,
}

impl Default for SignalConfig {
	fn default() -> Self {
		Self {
			unlocked_subtype: "unlock".into(),
			unlocked_icon: "#iconUnlock".into(),
			locked_phrases: ["locked", "read-only", "readonly", "只读"].map(String::from).to_vec(),
		}
	}
}

/// Settle delays for the tracker's two re-classification triggers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
	pub activation_settle_ms: u64,
	pub attribute_settle_ms: u64,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			activation_settle_ms: 150,
			attribute_settle_ms: 100,
		}
	}
}

impl TrackerConfig {
	pub fn activation_settle(&self) -> Duration {
		Duration::from_millis(self.activation_settle_ms)
	}

	pub fn attribute_settle(&self) -> Duration {
		Duration::from_millis(self.attribute_settle_ms)
	}
}

/// Transaction timing and isolation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
	/// Wait after the unlock activation before running the operation.
	pub unlock_settle_ms: u64,
	/// Startup window during which restores are skipped.
	pub grace_period_ms: u64,
	/// Queue transactions on the same instance behind each other.
	pub serialize_per_instance: bool,
}

impl Default for TransactionConfig {
	fn default() -> Self {
		Self {
			unlock_settle_ms: 150,
			grace_period_ms: 3000,
			serialize_per_instance: true,
		}
	}
}

impl TransactionConfig {
	pub fn unlock_settle(&self) -> Duration {
		Duration::from_millis(self.unlock_settle_ms)
	}

	pub fn grace_period(&self) -> Duration {
		Duration::from_millis(self.grace_period_ms)
	}
}

/// Restore retry behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreConfig {
	pub max_attempts: u32,
	/// Wait after each restore activation before reading the label.
	pub confirm_delay_ms: u64,
	pub backoff: BackoffConfig,
}

impl Default for RestoreConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			confirm_delay_ms: 200,
			backoff: BackoffConfig::default(),
		}
	}
}

/// Delay between unconfirmed restore attempts.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
	Fixed { delay_ms: u64 },
	Exponential { initial_ms: u64, factor: f64, max_ms: u64 },
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self::Fixed { delay_ms: 300 }
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config = LockConfig::from_toml("").unwrap();
		assert_eq!(config, LockConfig::default());
		assert_eq!(config.tracker.activation_settle(), Duration::from_millis(150));
		assert_eq!(config.tracker.attribute_settle(), Duration::from_millis(100));
		assert_eq!(config.transaction.grace_period(), Duration::from_secs(3));
		assert_eq!(config.restore.backoff, BackoffConfig::Fixed { delay_ms: 300 });
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let config = LockConfig::from_toml(
			r##"
			[signals]
			unlocked_icon = "#iconOpen"

			[restore]
			max_attempts = 5
			backoff = { kind = "exponential", initial_ms = 100, factor = 2.0, max_ms = 800 }
			"##,
		)
		.unwrap();

		assert_eq!(config.signals.unlocked_icon, "#iconOpen");
		assert_eq!(config.signals.unlocked_subtype, "unlock");
		assert_eq!(config.restore.max_attempts, 5);
		assert_eq!(config.restore.confirm_delay_ms, 200);
		assert_eq!(
			config.restore.backoff,
			BackoffConfig::Exponential {
				initial_ms: 100,
				factor: 2.0,
				max_ms: 800
			}
		);
		assert!(config.transaction.serialize_per_instance);
	}

	#[test]
	fn rejects_zero_attempts() {
		let err = LockConfig::from_toml("[restore]\nmax_attempts = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
	}

	#[test]
	fn rejects_shrinking_backoff() {
		let err = LockConfig::from_toml("[restore]\nbackoff = { kind = \"exponential\", initial_ms = 100, factor = 0.5, max_ms = 800 }").unwrap_err();
		assert!(err.to_string().contains("factor"), "{err}");
	}

	#[test]
	fn rejects_unknown_keys() {
		let err = LockConfig::from_toml("[tracker]\nsettle_ms = 10").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)), "{err}");
	}

	#[test]
	fn load_reads_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("lock.toml");
		std::fs::write(&path, "[transaction]\ngrace_period_ms = 0\nserialize_per_instance = false\n").unwrap();

		let config = LockConfig::load(&path).unwrap();
		assert_eq!(config.transaction.grace_period(), Duration::ZERO);
		assert!(!config.transaction.serialize_per_instance);

		let missing = LockConfig::load(dir.path().join("absent.toml")).unwrap_err();
		assert!(matches!(missing, ConfigError::Io { .. }));
	}
}
