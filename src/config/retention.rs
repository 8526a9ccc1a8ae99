//! Record retention configuration.
//!
//! Configures how long each ephemeral record family lives in the store and
//! the safety limits applied while sweeping.
//!
//! # Example
//!
//! ```toml
//! [retention.periods]
//! transcripts_days = 30
//! processed_notes_days = 90
//! transcript_index_ttl_secs = 86400
//! room_ttl_secs = 3600
//! user_rooms_ttl_secs = 3600
//! audio_chunk_ttl_secs = 3600
//!
//! [retention.safety]
//! dry_run = false
//! max_deletes_per_run = 100000
//! family_concurrency = 4
//! key_concurrency = 16
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Record retention configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Retention periods and TTL caps per record family.
    #[serde(default)]
    pub periods: RetentionPeriods,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,
}

impl RetentionConfig {
    /// Check if any family is enabled (non-zero period or cap).
    pub fn has_any_retention(&self) -> bool {
        let p = &self.periods;
        p.transcripts_days > 0
            || p.processed_notes_days > 0
            || p.transcript_index_ttl_secs > 0
            || p.room_ttl_secs > 0
            || p.user_rooms_ttl_secs > 0
            || p.audio_chunk_ttl_secs > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.safety.family_concurrency == 0 {
            return Err(ConfigError::Validation(
                "retention.safety.family_concurrency must be greater than 0".into(),
            ));
        }
        if self.safety.key_concurrency == 0 {
            return Err(ConfigError::Validation(
                "retention.safety.key_concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Retention periods for the record families.
///
/// Timestamp families are configured in days: records whose embedded
/// timestamp is older are deleted. Native-TTL families are configured with a
/// TTL cap in seconds: keys without a TTL are given one.
/// Set any value to 0 to disable that family (keep forever, never scanned).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPeriods {
    /// Days to keep `transcript:*` records, by their `created_at` field.
    /// Default: 30 days
    #[serde(default = "default_transcripts_days")]
    pub transcripts_days: u32,

    /// Days to keep `processed_notes:*` records, by their `processed_at` field.
    /// Default: 90 days
    #[serde(default = "default_processed_notes_days")]
    pub processed_notes_days: u32,

    /// TTL cap for `transcripts:*` index lists.
    /// Default: 86400 (1 day)
    #[serde(default = "default_transcript_index_ttl_secs")]
    pub transcript_index_ttl_secs: u64,

    /// TTL cap for `room:*` session state.
    /// Default: 3600 (1 hour)
    #[serde(default = "default_hour_ttl_secs")]
    pub room_ttl_secs: u64,

    /// TTL cap for `user_rooms:*` user to room maps.
    /// Default: 3600 (1 hour)
    #[serde(default = "default_hour_ttl_secs")]
    pub user_rooms_ttl_secs: u64,

    /// TTL cap for `audio_chunk:*` buffers. Audio chunks are only tallied;
    /// the cap is what a chunk found without a TTL is rebound to.
    /// Default: 3600 (1 hour)
    #[serde(default = "default_hour_ttl_secs")]
    pub audio_chunk_ttl_secs: u64,
}

impl Default for RetentionPeriods {
    fn default() -> Self {
        Self {
            transcripts_days: default_transcripts_days(),
            processed_notes_days: default_processed_notes_days(),
            transcript_index_ttl_secs: default_transcript_index_ttl_secs(),
            room_ttl_secs: default_hour_ttl_secs(),
            user_rooms_ttl_secs: default_hour_ttl_secs(),
            audio_chunk_ttl_secs: default_hour_ttl_secs(),
        }
    }
}

fn default_transcripts_days() -> u32 {
    30
}

fn default_processed_notes_days() -> u32 {
    90
}

fn default_transcript_index_ttl_secs() -> u64 {
    86_400
}

fn default_hour_ttl_secs() -> u64 {
    3600
}

/// Safety settings for sweep operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, log what would be deleted or rebound without mutating
    /// anything. Counters are still reported.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of keys to delete per run per family.
    /// Expired keys beyond the limit are counted as deferred and left for
    /// the next run. Set to 0 for unlimited.
    /// Default: 100000
    #[serde(default = "default_max_deletes_per_run")]
    pub max_deletes_per_run: u64,

    /// Number of families swept at the same time.
    /// Default: 4
    #[serde(default = "default_family_concurrency")]
    pub family_concurrency: usize,

    /// Number of keys of one family processed at the same time.
    /// Default: 16
    #[serde(default = "default_key_concurrency")]
    pub key_concurrency: usize,
}

impl Default for RetentionSafety {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_deletes_per_run: default_max_deletes_per_run(),
            family_concurrency: default_family_concurrency(),
            key_concurrency: default_key_concurrency(),
        }
    }
}

fn default_max_deletes_per_run() -> u64 {
    100_000
}

fn default_family_concurrency() -> usize {
    4
}

fn default_key_concurrency() -> usize {
    16
}
