//! One maintenance run from start to report delivery.
//!
//! The run proceeds in stages: reachability check, retention sweep, health
//! snapshot, key rotation, report delivery. A failed reachability check or a
//! family scan failure is fatal and skips the stages that follow it, but the
//! report (with `fatal_error` set) is still rendered and handed to every sink.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    config::JanitorConfig,
    health::{HealthAggregator, LivenessProbe, PersistentStore},
    report::RunReport,
    retention::{self, SweepSettings, Sweeper},
    rotation,
    sinks::{ReportSink, SinkError},
    store::Store,
};

/// Clients the run talks to. Built once by the caller and injected.
pub struct MaintenanceDeps {
    pub store: Arc<dyn Store>,
    pub database: Option<Arc<dyn PersistentStore>>,
    pub liveness: Arc<dyn LivenessProbe>,
    pub sinks: Vec<Arc<dyn ReportSink>>,
}

/// Command-line overrides applied on top of the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Forces dry run even when the configuration does not ask for it.
    pub dry_run: bool,
    /// Run key rotation regardless of the weekday gate.
    pub force_rotation: bool,
}

pub struct Maintenance {
    config: JanitorConfig,
    options: RunOptions,
    deps: MaintenanceDeps,
}

impl Maintenance {
    pub fn new(config: JanitorConfig, options: RunOptions, deps: MaintenanceDeps) -> Self {
        Self {
            config,
            options,
            deps,
        }
    }

    fn dry_run(&self) -> bool {
        self.options.dry_run || self.config.retention.safety.dry_run
    }

    /// Execute one run. Always returns a report; fatal failures are recorded
    /// in [`RunReport::fatal_error`].
    pub async fn run_once(&self) -> RunReport {
        let now = Utc::now();
        let dry_run = self.dry_run();
        let mut report = RunReport::begin(now, dry_run);

        let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };
        tracing::info!(
            run_id = %report.run_id,
            store = self.deps.store.backend_name(),
            deadline_secs = self.config.run.deadline_secs,
            dry_run,
            "Starting maintenance run{}",
            dry_run_msg
        );

        if let Err(e) = self.check_reachable().await {
            tracing::error!(error = %e, "Store unreachable, skipping maintenance");
            report.fatal_error = Some(e);
        } else {
            self.run_stages(&mut report, now).await;
        }

        report.finished_at = Utc::now();
        self.deliver(&mut report).await;

        let totals = report.totals();
        if let Some(fatal) = &report.fatal_error {
            tracing::error!(run_id = %report.run_id, error = %fatal, "Maintenance run failed");
        } else {
            tracing::info!(
                run_id = %report.run_id,
                scanned = totals.total,
                deleted = totals.deleted,
                rebounded = totals.rebounded,
                errors = totals.errors,
                truncated = report.truncated,
                "Maintenance run complete{}",
                dry_run_msg
            );
        }

        report
    }

    async fn check_reachable(&self) -> Result<(), String> {
        let timeout = self.config.run.ping_timeout();
        match tokio::time::timeout(timeout, self.deps.store.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Store unreachable: {e}")),
            Err(_) => Err(format!("Store unreachable: ping timed out after {timeout:?}")),
        }
    }

    async fn run_stages(&self, report: &mut RunReport, now: chrono::DateTime<Utc>) {
        let families = retention::descriptors(&self.config.retention.periods);
        if !self.config.retention.has_any_retention() {
            tracing::info!("No retention periods configured, skipping sweep");
        }

        let mut settings = SweepSettings::from(&self.config.retention.safety);
        settings.dry_run = report.dry_run;
        let sweeper = Sweeper::new(self.deps.store.clone(), settings);

        let cancel = CancellationToken::new();
        let deadline = self.config.run.deadline().map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!(?deadline, "Run deadline reached, stopping sweep");
                cancel.cancel();
            })
        });

        report.families = retention::sweep_families(
            &sweeper,
            &families,
            self.config.retention.safety.family_concurrency,
            now,
            &cancel,
        )
        .await;

        if let Some(timer) = deadline {
            timer.abort();
        }

        report.truncated = report.families.iter().any(|r| r.truncated);

        let scan_failures: Vec<String> = report
            .families
            .iter()
            .filter_map(|r| r.scan_error.as_ref().map(|e| format!("{}: {e}", r.family)))
            .collect();
        if !scan_failures.is_empty() {
            report.fatal_error = Some(format!("Key scan failed ({})", scan_failures.join("; ")));
            return;
        }

        let aggregator = HealthAggregator::new(
            &self.config.health,
            self.deps.store.clone(),
            self.deps.database.clone(),
            self.deps.liveness.clone(),
        );
        report.health = Some(aggregator.aggregate().await);

        if rotation::is_due(&self.config.rotation, now, self.options.force_rotation) {
            report.key_rotation = Some(rotation::rotate(&self.config.rotation, now));
        } else {
            tracing::debug!(weekday = %self.config.rotation.weekday, "Key rotation not due");
        }
    }

    async fn deliver(&self, report: &mut RunReport) {
        deliver(&self.deps.sinks, &self.config, report).await;
    }

    /// Release network handles. Called on every exit path.
    pub async fn shutdown(self) {
        if let Some(database) = &self.deps.database {
            database.close().await;
        }
        tracing::debug!("Maintenance clients released");
    }
}

/// Report a run that could not start, such as when the store client cannot
/// be built. The minimal report still goes to every sink.
pub async fn report_setup_failure(
    config: &JanitorConfig,
    options: RunOptions,
    sinks: &[Arc<dyn ReportSink>],
    error: impl Into<String>,
) -> RunReport {
    let mut report = RunReport::begin(Utc::now(), options.dry_run || config.retention.safety.dry_run);
    report.fatal_error = Some(error.into());
    report.finished_at = Utc::now();

    deliver(sinks, config, &mut report).await;

    tracing::error!(
        run_id = %report.run_id,
        error = report.fatal_error.as_deref().unwrap_or_default(),
        "Maintenance run failed during setup"
    );
    report
}

/// Hand the report to every sink concurrently and record each outcome.
async fn deliver(sinks: &[Arc<dyn ReportSink>], config: &JanitorConfig, report: &mut RunReport) {
    let rendered = report.render();
    let timeout = Duration::from_secs(config.reporting.timeout_secs);
    let snapshot = &*report;

    let outcomes = join_all(sinks.iter().map(|sink| {
        let rendered = &rendered;
        async move {
            let result = match tokio::time::timeout(timeout, sink.deliver(snapshot, rendered)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(timeout)),
            };
            match &result {
                Ok(detail) => tracing::info!(sink = sink.name(), detail = %detail, "Report delivered"),
                Err(SinkError::NotConfigured(reason)) => {
                    tracing::debug!(sink = sink.name(), reason = %reason, "Report sink skipped")
                }
                Err(e) => tracing::warn!(sink = sink.name(), error = %e, "Report delivery failed"),
            }
            (sink.name(), SinkError::into_status(result))
        }
    }))
    .await;

    for (name, status) in outcomes {
        report.deliveries.insert(name.to_string(), status);
    }
}
