use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::{ConfigError, default_true};

/// Weekly key rotation configuration.
///
/// Rotation is simulated: the run records which secrets would have been
/// rotated, it never touches secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    /// Whether the weekly rotation stage runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Day of the week (UTC) on which rotation runs, e.g. "mon".
    #[serde(default = "default_weekday")]
    pub weekday: Weekday,

    /// Names of the secrets that are rotated.
    #[serde(default = "default_managed_secrets")]
    pub managed_secrets: Vec<String>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: default_weekday(),
            managed_secrets: default_managed_secrets(),
        }
    }
}

impl RotationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.managed_secrets.is_empty() {
            return Err(ConfigError::Validation(
                "rotation.managed_secrets cannot be empty when rotation is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn default_weekday() -> Weekday {
    Weekday::Mon
}

fn default_managed_secrets() -> Vec<String> {
    vec!["JWT_SECRET".into(), "OPENAI_API_KEY".into()]
}
