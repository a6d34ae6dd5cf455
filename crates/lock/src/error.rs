//! Error types for lock coordination.
//!
//! None of these reach the caller of a transaction: lock infrastructure
//! failures are logged and absorbed, and the operation's own error is the
//! only outcome a transaction reports.

use std::path::PathBuf;

use marginalia_primitives::{ElementId, InstanceId};
use thiserror::Error;

/// Failures reported by a [`LockHost`](crate::LockHost).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
	#[error("{0} is no longer attached to the document")]
	Detached(ElementId),
	#[error("activation dispatch failed: {0}")]
	Dispatch(String),
}

/// Lock infrastructure failures. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
	#[error("no editor instance is open")]
	NoActiveInstance,
	#[error("no lock control found for {instance}")]
	ControlNotFound { instance: InstanceId },
	#[error("lock control of {instance} carries no structural signal")]
	ClassificationUnavailable { instance: InstanceId },
	#[error("lock restore on {instance} not confirmed after {attempts} attempts")]
	ActivationNotConfirmed { instance: InstanceId, attempts: u32 },
	#[error(transparent)]
	Host(#[from] HostError),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid lock config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid lock config: {0}")]
	Invalid(String),
}
