//! Sweep executor.
//!
//! Runs scan → evaluate → act over one family, tolerating per-key failures.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{
    evaluator::{Decision, RecordSnapshot, evaluate},
    family::{Expiry, FamilyDescriptor, RecordFamily},
    scanner::{self, ScannedKey},
};
use crate::{
    config::RetentionSafety,
    store::{Store, StoreError},
};

/// Counters for one family sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySweepResult {
    pub family: RecordFamily,
    /// Keys seen by the scan.
    pub total: u64,
    /// Keys deleted (or that would be deleted, in dry-run mode).
    pub deleted: u64,
    /// Keys whose TTL was set.
    pub rebounded: u64,
    /// Keys found already expired by the store. Approximate: keys the store
    /// evicted before the scan reached them are never seen.
    #[serde(rename = "natively_expired_approx")]
    pub natively_expired: u64,
    /// Expired keys left in place because the per-run delete limit was hit.
    pub deferred: u64,
    /// Keys that disappeared between the scan and the read.
    pub vanished: u64,
    /// Keys that could not be read, evaluated or acted on.
    pub errors: u64,
    /// `total - deleted`.
    pub remaining: u64,
    /// The run deadline stopped this sweep before the scan finished.
    pub truncated: bool,
    /// The scan itself failed; counts cover the keys seen before it did.
    pub scan_error: Option<String>,
    pub duration_ms: u64,
}

impl FamilySweepResult {
    pub fn new(family: RecordFamily) -> Self {
        Self {
            family,
            total: 0,
            deleted: 0,
            rebounded: 0,
            natively_expired: 0,
            deferred: 0,
            vanished: 0,
            errors: 0,
            remaining: 0,
            truncated: false,
            scan_error: None,
            duration_ms: 0,
        }
    }

    /// Check if the sweep changed (or would change) anything.
    pub fn has_actions(&self) -> bool {
        self.deleted > 0 || self.rebounded > 0
    }

    fn record(&mut self, outcome: KeyOutcome) {
        self.total += 1;
        match outcome {
            KeyOutcome::Deleted => self.deleted += 1,
            KeyOutcome::Rebounded => self.rebounded += 1,
            KeyOutcome::NativelyExpired => self.natively_expired += 1,
            KeyOutcome::Deferred => self.deferred += 1,
            KeyOutcome::Vanished => self.vanished += 1,
            KeyOutcome::Failed => self.errors += 1,
            KeyOutcome::Kept => {}
        }
    }
}

/// Sweep behaviour shared by every family in a run.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Decide and count without mutating the store.
    pub dry_run: bool,
    /// Per-family delete limit; `u64::MAX` when unlimited.
    pub max_deletes: u64,
    /// Keys processed concurrently within one family.
    pub key_concurrency: usize,
}

impl From<&RetentionSafety> for SweepSettings {
    fn from(safety: &RetentionSafety) -> Self {
        Self {
            dry_run: safety.dry_run,
            max_deletes: if safety.max_deletes_per_run == 0 {
                u64::MAX
            } else {
                safety.max_deletes_per_run
            },
            key_concurrency: safety.key_concurrency.max(1),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from(&RetentionSafety::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Kept,
    Deleted,
    Rebounded,
    NativelyExpired,
    Deferred,
    Vanished,
    Failed,
}

enum ScanItem {
    Key(ScannedKey),
    Failed(StoreError),
    /// Appended after the last key, so its absence means the sweep was cut.
    Exhausted,
}

enum Step {
    Outcome(KeyOutcome),
    ScanFailed(StoreError),
    Exhausted,
}

/// Executes family sweeps against one store.
pub struct Sweeper {
    store: Arc<dyn Store>,
    settings: SweepSettings,
}

impl Sweeper {
    pub fn new(store: Arc<dyn Store>, settings: SweepSettings) -> Self {
        Self { store, settings }
    }

    /// Sweep one family.
    ///
    /// Records are judged against `now`. Once `cancel` fires no new keys are
    /// started; keys already in flight finish and the result is marked
    /// truncated.
    pub async fn sweep(
        &self,
        descriptor: &FamilyDescriptor,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> FamilySweepResult {
        let started = Instant::now();
        let family = descriptor.family;
        let mut result = FamilySweepResult::new(family);
        let delete_slots = AtomicU64::new(0);

        tracing::debug!(
            family = %family,
            pattern = descriptor.pattern,
            dry_run = self.settings.dry_run,
            "Sweeping family"
        );

        let items = scanner::scan(self.store.as_ref(), descriptor)
            .map(|key| match key {
                Ok(key) => ScanItem::Key(key),
                Err(e) => ScanItem::Failed(e),
            })
            .chain(stream::once(async { ScanItem::Exhausted }))
            .take_until(cancel.cancelled());

        let steps = items
            .map(|item| {
                let delete_slots = &delete_slots;
                async move {
                    match item {
                        ScanItem::Key(key) => {
                            Step::Outcome(self.process_key(&key, descriptor, now, delete_slots).await)
                        }
                        ScanItem::Failed(e) => Step::ScanFailed(e),
                        ScanItem::Exhausted => Step::Exhausted,
                    }
                }
            })
            .buffer_unordered(self.settings.key_concurrency);
        let mut steps = std::pin::pin!(steps);

        let mut exhausted = false;
        while let Some(step) = steps.next().await {
            match step {
                Step::Outcome(outcome) => result.record(outcome),
                Step::ScanFailed(e) => {
                    tracing::error!(family = %family, error = %e, "Key scan failed");
                    result.scan_error = Some(e.to_string());
                }
                Step::Exhausted => exhausted = true,
            }
        }

        result.truncated = !exhausted && result.scan_error.is_none();
        result.remaining = result.total - result.deleted;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if result.truncated {
            tracing::warn!(
                family = %family,
                total = result.total,
                deleted = result.deleted,
                "Sweep truncated by run deadline"
            );
        } else if result.has_actions() || result.errors > 0 {
            tracing::info!(
                family = %family,
                total = result.total,
                deleted = result.deleted,
                rebounded = result.rebounded,
                natively_expired = result.natively_expired,
                deferred = result.deferred,
                errors = result.errors,
                dry_run = self.settings.dry_run,
                duration_ms = result.duration_ms,
                "Family sweep complete"
            );
        } else {
            tracing::debug!(
                family = %family,
                total = result.total,
                "Family sweep complete, nothing to do"
            );
        }

        result
    }

    async fn process_key(
        &self,
        scanned: &ScannedKey,
        descriptor: &FamilyDescriptor,
        now: DateTime<Utc>,
        delete_slots: &AtomicU64,
    ) -> KeyOutcome {
        let key = scanned.key.as_str();
        let family = scanned.family;

        let snapshot = match descriptor.expiry {
            Expiry::Timestamp { .. } => match self.store.get(key).await {
                Ok(Some(raw)) => RecordSnapshot::Value(raw),
                Ok(None) => {
                    tracing::debug!(family = %family, key, "Key vanished before it was read");
                    return KeyOutcome::Vanished;
                }
                Err(e) => {
                    tracing::warn!(family = %family, key, error = %e, "Failed to read record");
                    return KeyOutcome::Failed;
                }
            },
            Expiry::NativeTtl { .. } => match self.store.ttl(key).await {
                Ok(ttl) => RecordSnapshot::Ttl(ttl),
                Err(e) => {
                    tracing::warn!(family = %family, key, error = %e, "Failed to read TTL");
                    return KeyOutcome::Failed;
                }
            },
        };

        let decision = match evaluate(&snapshot, descriptor, now) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(family = %family, key, error = %e, "Keeping unreadable record");
                return KeyOutcome::Failed;
            }
        };

        match decision {
            Decision::Keep => KeyOutcome::Kept,
            Decision::CountOnly => KeyOutcome::NativelyExpired,
            Decision::Delete => {
                let reserved = delete_slots
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                        (used < self.settings.max_deletes).then_some(used + 1)
                    })
                    .is_ok();
                if !reserved {
                    return KeyOutcome::Deferred;
                }

                if self.settings.dry_run {
                    tracing::debug!(family = %family, key, "DRY RUN: Would delete expired record");
                    return KeyOutcome::Deleted;
                }

                match self.store.delete(key).await {
                    Ok(existed) => {
                        if !existed {
                            tracing::debug!(family = %family, key, "Record already gone at delete");
                        }
                        KeyOutcome::Deleted
                    }
                    Err(e) => {
                        tracing::warn!(family = %family, key, error = %e, "Failed to delete record");
                        KeyOutcome::Failed
                    }
                }
            }
            Decision::Rebound(ttl) => {
                if self.settings.dry_run {
                    tracing::debug!(
                        family = %family,
                        key,
                        ttl_secs = ttl.as_secs(),
                        "DRY RUN: Would set TTL"
                    );
                    return KeyOutcome::Rebounded;
                }

                match self.store.expire(key, ttl).await {
                    Ok(true) => KeyOutcome::Rebounded,
                    Ok(false) => {
                        tracing::debug!(family = %family, key, "Key expired before TTL was set");
                        KeyOutcome::NativelyExpired
                    }
                    Err(e) => {
                        tracing::warn!(family = %family, key, error = %e, "Failed to set TTL");
                        KeyOutcome::Failed
                    }
                }
            }
        }
    }
}
