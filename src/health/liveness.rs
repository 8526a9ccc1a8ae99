use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

/// Tells whether a named service is alive.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Never fails; anything that prevents an answer is `Unknown`.
    async fn status(&self, service: &str) -> ServiceStatus;
}

/// Checks for a process whose command line contains the service name,
/// using `pgrep -f`.
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe;

#[async_trait]
impl LivenessProbe for ProcessProbe {
    async fn status(&self, service: &str) -> ServiceStatus {
        let result = Command::new("pgrep")
            .arg("-f")
            .arg(service)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match result {
            // pgrep: 0 = matched, 1 = no match, anything else = error.
            Ok(status) => match status.code() {
                Some(0) => ServiceStatus::Running,
                Some(1) => ServiceStatus::Stopped,
                code => {
                    tracing::debug!(service, ?code, "pgrep exited abnormally");
                    ServiceStatus::Unknown
                }
            },
            Err(e) => {
                tracing::debug!(service, error = %e, "Failed to run pgrep");
                ServiceStatus::Unknown
            }
        }
    }
}
