//! Weekly key rotation.
//!
//! Rotation is simulated: the run records which managed secrets are due and
//! when, but generates and stores nothing. Secret management stays with the
//! deployment's secret store.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::config::RotationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    Simulated,
}

impl RotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStatus::Simulated => "simulated",
        }
    }
}

/// Outcome of a rotation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationRecord {
    pub rotated_keys: Vec<String>,
    pub rotated_at: DateTime<Utc>,
    pub status: RotationStatus,
}

/// Whether rotation runs in this invocation: on the configured weekday when
/// enabled, or always when forced.
pub fn is_due(config: &RotationConfig, now: DateTime<Utc>, force: bool) -> bool {
    force || (config.enabled && now.weekday() == config.weekday)
}

pub fn rotate(config: &RotationConfig, now: DateTime<Utc>) -> RotationRecord {
    for key in &config.managed_secrets {
        tracing::info!(key = %key, "Key rotation simulated");
    }

    RotationRecord {
        rotated_keys: config.managed_secrets.clone(),
        rotated_at: now,
        status: RotationStatus::Simulated,
    }
}
