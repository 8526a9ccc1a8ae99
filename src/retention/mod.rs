//! Retention sweep engine.
//!
//! Classifies the ephemeral records in the shared key-value namespace by
//! family and, per family:
//! 1. Deletes timestamped records older than their retention period
//! 2. Gives keys without a TTL a bounded one
//! 3. Tallies keys the store has already expired on its own
//!
//! Sweeps tolerate per-key failures, honour a run deadline and support
//! dry-run mode for testing retention policies.

mod evaluator;
mod family;
mod scanner;
mod sweeper;

use chrono::{DateTime, Utc};
pub use evaluator::{Decision, RecordError, RecordSnapshot, evaluate, parse_timestamp};
pub use family::{
    DeletionPolicy, Expiry, FamilyDescriptor, RecordFamily, TimestampField, TimestampFormat,
    descriptors, table,
};
use futures::{StreamExt, stream};
pub use scanner::{ScannedKey, scan};
pub use sweeper::{FamilySweepResult, SweepSettings, Sweeper};
use tokio_util::sync::CancellationToken;

/// Sweep several families with at most `family_concurrency` in flight.
///
/// Families touch disjoint key prefixes, so their order is irrelevant.
/// Results come back in table order.
pub async fn sweep_families(
    sweeper: &Sweeper,
    families: &[FamilyDescriptor],
    family_concurrency: usize,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Vec<FamilySweepResult> {
    let mut results: Vec<FamilySweepResult> = stream::iter(families)
        .map(|descriptor| sweeper.sweep(descriptor, now, cancel))
        .buffer_unordered(family_concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|r| r.family);
    results
}
