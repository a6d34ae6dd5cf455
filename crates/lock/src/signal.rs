//! Lock-signal reading and classification.
//!
//! Classification is a pure function of a [`LockSignals`] snapshot:
//!
//! 1. subtype token present: the unlocked token means unlocked, anything else locked
//! 2. icon reference present: the unlocked icon means unlocked, anything else locked
//! 3. neither: unavailable, which callers treat as unlocked
//!
//! The label is never used to classify. It updates on a different tick than
//! the structural attributes after an activation, and only serves to confirm
//! a restore took effect (see [`SignalRules::label_confirms_locked`]).

use std::sync::Arc;

use marginalia_primitives::{EditorInstanceRef, InstanceId, LockClassification, LockControl, LockSignals};

use crate::config::SignalConfig;
use crate::error::LockError;
use crate::host::LockHost;
use crate::resolver::{InstanceResolver, Resolution};

/// Signal vocabulary used to classify a lock control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRules {
	unlocked_subtype: String,
	unlocked_icon: String,
	/// Lowercased.
	locked_phrases: Vec<String>,
}

impl Default for SignalRules {
	fn default() -> Self {
		Self::from(&SignalConfig::default())
	}
}

impl From<&SignalConfig> for SignalRules {
	fn from(config: &SignalConfig) -> Self {
		Self {
			unlocked_subtype: config.unlocked_subtype.clone(),
			unlocked_icon: config.unlocked_icon.clone(),
			locked_phrases: config.locked_phrases.iter().map(|p| p.trim().to_lowercase()).collect(),
		}
	}
}

impl SignalRules {
	/// Classifies a signal snapshot.
	pub fn classify(&self, signals: &LockSignals) -> LockClassification {
		if let Some(subtype) = &signals.subtype {
			return LockClassification::structural(*subtype != self.unlocked_subtype);
		}
		if let Some(icon) = &signals.icon {
			return LockClassification::structural(*icon != self.unlocked_icon);
		}
		LockClassification::UNAVAILABLE
	}

	/// Whether `label` states that the document is locked.
	///
	/// Phrases match case-insensitively, but not when glued to a preceding
	/// letter or digit: `Unlocked` does not confirm `locked`.
	pub fn label_confirms_locked(&self, label: &str) -> bool {
		let label = label.to_lowercase();
		self.locked_phrases.iter().any(|phrase| {
			label.match_indices(phrase.as_str()).any(|(at, _)| {
				label[..at].chars().next_back().is_none_or(|c| !c.is_alphanumeric())
			})
		})
	}
}

/// Outcome of reading the active instance's lock in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockProbe {
	pub resolution: Option<Resolution>,
	pub control: Option<LockControl>,
	pub classification: LockClassification,
}

impl LockProbe {
	pub fn instance_id(&self) -> Option<InstanceId> {
		self.resolution.as_ref().map(|r| r.instance.id)
	}

	/// Why the probe failed to classify structurally, if it did.
	pub fn failure(&self) -> Option<LockError> {
		let Some(resolution) = &self.resolution else {
			return Some(LockError::NoActiveInstance);
		};
		let instance = resolution.instance.id;
		if self.control.is_none() {
			return Some(LockError::ControlNotFound { instance });
		}
		(!self.classification.is_available()).then_some(LockError::ClassificationUnavailable { instance })
	}
}

/// Locates lock controls through the host and classifies them.
#[derive(Clone)]
pub struct SignalReader {
	host: Arc<dyn LockHost>,
	resolver: InstanceResolver,
	rules: SignalRules,
}

impl SignalReader {
	pub fn new(host: Arc<dyn LockHost>, rules: SignalRules) -> Self {
		Self {
			resolver: InstanceResolver::new(Arc::clone(&host)),
			host,
			rules,
		}
	}

	pub fn rules(&self) -> &SignalRules {
		&self.rules
	}

	pub fn resolver(&self) -> &InstanceResolver {
		&self.resolver
	}

	/// Locates the instance's lock control.
	pub fn locate(&self, instance: &EditorInstanceRef) -> Result<LockControl, LockError> {
		self.host
			.lock_control(instance)
			.ok_or(LockError::ControlNotFound { instance: instance.id })
	}

	/// Classifies the instance's lock. A missing control is unavailable.
	pub fn classify(&self, instance: &EditorInstanceRef) -> LockClassification {
		self.locate(instance)
			.map_or(LockClassification::UNAVAILABLE, |control| self.rules.classify(&control.signals))
	}

	/// Resolves the active instance, then locates and classifies its control.
	pub fn probe(&self) -> LockProbe {
		let resolution = self.resolver.resolve();
		self.probe_resolved(resolution)
	}

	/// Locates and classifies the control of an already resolved instance.
	pub fn probe_resolved(&self, resolution: Option<Resolution>) -> LockProbe {
		let control = resolution.as_ref().and_then(|r| self.locate(&r.instance).ok());
		let classification = control
			.as_ref()
			.map_or(LockClassification::UNAVAILABLE, |c| self.rules.classify(&c.signals));
		let probe = LockProbe {
			resolution,
			control,
			classification,
		};
		if let Some(reason) = probe.failure() {
			tracing::trace!(%reason, "lock.probe.fail_open");
		}
		probe
	}

	/// Point-in-time lock state of the active instance, failing open.
	pub fn is_locked(&self) -> bool {
		self.probe().classification.is_locked
	}
}
