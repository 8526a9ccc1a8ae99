//! Run report and its human-readable rendering.

use std::{collections::BTreeMap, fmt::Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{health::HealthSnapshot, retention::FamilySweepResult, rotation::RotationRecord};

/// How a sink handled the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered { detail: String },
    Failed { error: String },
    Skipped { reason: String },
}

/// The complete outcome of one maintenance run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub families: Vec<FamilySweepResult>,
    /// Absent when a fatal error stopped the run before the health stage.
    pub health: Option<HealthSnapshot>,
    pub key_rotation: Option<RotationRecord>,
    /// The run deadline cut at least one family short.
    pub truncated: bool,
    pub fatal_error: Option<String>,
    /// Delivery outcome per sink name.
    pub deliveries: BTreeMap<String, DeliveryStatus>,
}

/// Title and markdown body handed to the sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub title: String,
    pub body: String,
}

/// Sums over all family results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepTotals {
    pub total: u64,
    pub deleted: u64,
    pub rebounded: u64,
    pub natively_expired: u64,
    pub deferred: u64,
    pub errors: u64,
}

impl RunReport {
    /// An empty report for a run starting now.
    pub fn begin(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            dry_run,
            families: Vec::new(),
            health: None,
            key_rotation: None,
            truncated: false,
            fatal_error: None,
            deliveries: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.fatal_error.is_none()
    }

    pub fn totals(&self) -> SweepTotals {
        self.families
            .iter()
            .fold(SweepTotals::default(), |acc, r| SweepTotals {
                total: acc.total + r.total,
                deleted: acc.deleted + r.deleted,
                rebounded: acc.rebounded + r.rebounded,
                natively_expired: acc.natively_expired + r.natively_expired,
                deferred: acc.deferred + r.deferred,
                errors: acc.errors + r.errors,
            })
    }

    /// Render the report as a markdown issue/email body.
    pub fn render(&self) -> RenderedReport {
        let date = self.started_at.format("%Y-%m-%d");
        let title = format!("Daily Maintenance Report - {date}");

        // Writing to a String cannot fail.
        let mut body = String::new();
        let _ = writeln!(body, "# {title}\n");
        let _ = writeln!(
            body,
            "Run `{}` from {} to {}",
            self.run_id,
            self.started_at.format("%H:%M:%S UTC"),
            self.finished_at.format("%H:%M:%S UTC"),
        );
        if self.dry_run {
            let _ = writeln!(body, "\n> **Dry run**: counts show what would have changed.");
        }
        if self.truncated {
            let _ = writeln!(
                body,
                "\n> **Truncated**: the run deadline elapsed before every family was swept."
            );
        }
        if let Some(error) = &self.fatal_error {
            let _ = writeln!(body, "\n## Fatal Error\n\n```\n{error}\n```");
        }

        self.render_cleanup(&mut body);
        if let Some(health) = &self.health {
            render_health(&mut body, health);
        }
        if let Some(rotation) = &self.key_rotation {
            let _ = writeln!(
                body,
                "\n## Key Rotation\n\n- **Rotated** ({}): {}",
                rotation.status.as_str(),
                rotation.rotated_keys.join(", ")
            );
        }

        let _ = writeln!(
            body,
            "\n---\n*This is an automated maintenance report generated by janitor*"
        );

        RenderedReport { title, body }
    }

    fn render_cleanup(&self, body: &mut String) {
        if self.families.is_empty() {
            return;
        }

        let _ = writeln!(body, "\n## Cleanup Results\n");
        let _ = writeln!(
            body,
            "| Family | Scanned | Deleted | TTL set | Expired natively (approx.) | Deferred | Errors | Remaining |"
        );
        let _ = writeln!(body, "|---|---:|---:|---:|---:|---:|---:|---:|");
        for r in &self.families {
            let mut family = r.family.to_string();
            if r.truncated {
                family.push_str(" (truncated)");
            }
            let _ = writeln!(
                body,
                "| {family} | {} | {} | {} | ~{} | {} | {} | {} |",
                r.total, r.deleted, r.rebounded, r.natively_expired, r.deferred, r.errors, r.remaining
            );
        }

        let failed_scans: Vec<_> = self
            .families
            .iter()
            .filter_map(|r| r.scan_error.as_ref().map(|e| (r.family, e)))
            .collect();
        if !failed_scans.is_empty() {
            let _ = writeln!(body);
            for (family, error) in failed_scans {
                let _ = writeln!(body, "- **{family}** scan failed: {error}");
            }
        }
    }
}

fn render_health(body: &mut String, health: &HealthSnapshot) {
    let _ = writeln!(body, "\n## System Health\n");

    match (&health.store.data, &health.store.error) {
        (Some(s), _) => {
            let _ = writeln!(
                body,
                "- **Store**: {} clients, {} used, hit ratio {}",
                display_opt(s.connected_clients),
                s.used_memory_human.as_deref().unwrap_or("N/A"),
                s.hit_ratio
                    .map(|r| format!("{:.1}%", r * 100.0))
                    .unwrap_or_else(|| "N/A".into()),
            );
        }
        (None, error) => {
            let _ = writeln!(body, "- **Store**: error: {}", error.as_deref().unwrap_or("N/A"));
        }
    }

    if let Some(db) = &health.database {
        match (&db.data, &db.error) {
            (Some(d), _) => {
                let _ = writeln!(
                    body,
                    "- **Database**: {}, {} active connections",
                    d.size_human, d.active_connections
                );
            }
            (None, error) => {
                let _ = writeln!(
                    body,
                    "- **Database**: error: {}",
                    error.as_deref().unwrap_or("N/A")
                );
            }
        }
    }

    if let Some(system) = &health.system {
        match (&system.data, &system.error) {
            (Some(s), _) => {
                let _ = writeln!(body, "- **CPU**: {:.1}%", s.cpu_percent);
                let _ = writeln!(body, "- **Memory**: {:.1}%", s.memory_percent);
                let _ = writeln!(
                    body,
                    "- **Disk**: {}",
                    s.disk_percent
                        .map(|d| format!("{d:.1}%"))
                        .unwrap_or_else(|| "N/A".into())
                );
                let [one, five, fifteen] = s.load_average;
                let _ = writeln!(
                    body,
                    "- **Load average**: {one:.2} {five:.2} {fifteen:.2}"
                );
            }
            (None, error) => {
                let _ = writeln!(
                    body,
                    "- **System**: error: {}",
                    error.as_deref().unwrap_or("N/A")
                );
            }
        }
    }

    let _ = writeln!(body, "\n## Service Status\n");
    match (&health.services.data, &health.services.error) {
        (Some(services), _) if !services.is_empty() => {
            for (name, status) in services {
                let _ = writeln!(body, "- {name}: {}", status.as_str());
            }
        }
        (Some(_), _) => {
            let _ = writeln!(body, "- no services configured");
        }
        (None, error) => {
            let _ = writeln!(body, "- error: {}", error.as_deref().unwrap_or("N/A"));
        }
    }
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".into(), |v| v.to_string())
}
