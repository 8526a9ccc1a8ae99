use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, default_true};

/// Health snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Upper bound for each sub-probe, in seconds. A probe that exceeds it
    /// is reported as failed in its own section only.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Services whose liveness is checked. Each name is matched against the
    /// full command line of running processes.
    #[serde(default = "default_services")]
    pub services: Vec<String>,

    /// Sample host CPU, memory, disk and load average.
    /// Ignored when built without the `system-metrics` feature.
    #[serde(default = "default_true")]
    pub system_metrics: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            services: default_services(),
            system_metrics: true,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "health.probe_timeout_secs must be greater than 0".into(),
            ));
        }
        if let Some(blank) = self.services.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "health.services contains a blank service name: '{blank}'"
            )));
        }
        Ok(())
    }
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_services() -> Vec<String> {
    ["api", "signaling", "stt", "notes"]
        .into_iter()
        .map(String::from)
        .collect()
}
