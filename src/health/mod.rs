//! Point-in-time health snapshot.
//!
//! Probes the key-value store, the optional persistent store, service
//! liveness and host resources concurrently. Every probe runs under its own
//! timeout and reports failures in its own section, so one broken dependency
//! never blanks out the others.

mod database;
mod liveness;
mod store;
mod system;

use std::{collections::BTreeMap, fmt::Display, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
pub use database::{
    DatabaseError, DatabaseStats, PersistentStore, UnreachableDatabase, create_database,
};
#[cfg(feature = "database-postgres")]
pub use database::PostgresStore;
use futures::future::join_all;
pub use liveness::{LivenessProbe, ProcessProbe, ServiceStatus};
use serde::Serialize;
pub use store::StoreStats;
pub use system::SystemStats;
use thiserror::Error;
use tokio::time::Instant;

use crate::{config::HealthConfig, store::Store};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// One section of the snapshot: the probe's data, or the reason it is
/// missing, plus how long the probe took.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProbeSection<T> {
    #[serde(flatten)]
    pub data: Option<T>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl<T> ProbeSection<T> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Health of the system at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub captured_at: DateTime<Utc>,
    pub store: ProbeSection<StoreStats>,
    /// Absent when no persistent store is configured.
    pub database: Option<ProbeSection<DatabaseStats>>,
    pub services: ProbeSection<BTreeMap<String, ServiceStatus>>,
    /// Absent when host sampling is disabled or not compiled in.
    pub system: Option<ProbeSection<SystemStats>>,
}

impl HealthSnapshot {
    /// Errors of every section that has one, keyed by section name.
    pub fn errors(&self) -> Vec<(&'static str, &str)> {
        let mut errors = Vec::new();
        if let Some(e) = &self.store.error {
            errors.push(("store", e.as_str()));
        }
        if let Some(e) = self.database.as_ref().and_then(|s| s.error.as_deref()) {
            errors.push(("database", e));
        }
        if let Some(e) = &self.services.error {
            errors.push(("services", e.as_str()));
        }
        if let Some(e) = self.system.as_ref().and_then(|s| s.error.as_deref()) {
            errors.push(("system", e));
        }
        errors
    }
}

/// Runs the health probes.
pub struct HealthAggregator {
    store: Arc<dyn Store>,
    database: Option<Arc<dyn PersistentStore>>,
    liveness: Arc<dyn LivenessProbe>,
    services: Vec<String>,
    system_metrics: bool,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        config: &HealthConfig,
        store: Arc<dyn Store>,
        database: Option<Arc<dyn PersistentStore>>,
        liveness: Arc<dyn LivenessProbe>,
    ) -> Self {
        Self {
            store,
            database,
            liveness,
            services: config.services.clone(),
            system_metrics: config.system_metrics,
            probe_timeout: config.probe_timeout(),
        }
    }

    /// Build a snapshot. Never fails; failures land in the sections.
    pub async fn aggregate(&self) -> HealthSnapshot {
        let captured_at = Utc::now();

        let (store, database, services, system) = tokio::join!(
            self.probe_store(),
            self.probe_database(),
            self.probe_services(),
            self.probe_system(),
        );

        let snapshot = HealthSnapshot {
            captured_at,
            store,
            database,
            services,
            system,
        };

        for (section, error) in snapshot.errors() {
            tracing::warn!(section, error, "Health probe failed");
        }

        snapshot
    }

    async fn probe_store(&self) -> ProbeSection<StoreStats> {
        timed(self.probe_timeout, async {
            let info = self.store.info().await?;
            Ok::<_, crate::store::StoreError>(StoreStats::from_info(&info))
        })
        .await
    }

    async fn probe_database(&self) -> Option<ProbeSection<DatabaseStats>> {
        let database = self.database.as_ref()?;
        Some(timed(self.probe_timeout, database.stats()).await)
    }

    async fn probe_services(&self) -> ProbeSection<BTreeMap<String, ServiceStatus>> {
        let probe_timeout = self.probe_timeout;
        // Each service is bounded on its own; the section bound only has to
        // outlast them.
        timed(probe_timeout + Duration::from_secs(1), async {
            let statuses = join_all(self.services.iter().map(|service| async move {
                let status =
                    match tokio::time::timeout(probe_timeout, self.liveness.status(service)).await {
                        Ok(status) => status,
                        Err(_) => {
                            tracing::debug!(service, "Liveness probe timed out");
                            ServiceStatus::Unknown
                        }
                    };
                (service.clone(), status)
            }))
            .await;
            Ok::<_, ProbeError>(statuses.into_iter().collect())
        })
        .await
    }

    async fn probe_system(&self) -> Option<ProbeSection<SystemStats>> {
        if !self.system_metrics {
            return None;
        }
        #[cfg(feature = "system-metrics")]
        {
            Some(timed(self.probe_timeout, system::sample()).await)
        }
        #[cfg(not(feature = "system-metrics"))]
        {
            None
        }
    }
}

/// Run a probe under a timeout, capturing its duration and error.
async fn timed<T, E, F>(timeout: Duration, probe: F) -> ProbeSection<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, probe).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(data)) => ProbeSection {
            data: Some(data),
            error: None,
            duration_ms,
        },
        Ok(Err(e)) => ProbeSection {
            data: None,
            error: Some(e.to_string()),
            duration_ms,
        },
        Err(_) => ProbeSection {
            data: None,
            error: Some(ProbeError::Timeout(timeout).to_string()),
            duration_ms,
        },
    }
}

/// Format a byte count the way Redis' `*_human` fields do.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
