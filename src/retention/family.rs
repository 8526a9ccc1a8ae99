//! Record family descriptors.
//!
//! Every ephemeral record the application writes belongs to one family,
//! identified by its key prefix. A family either carries its own creation
//! timestamp inside a JSON value, or relies on the store's native TTL.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::config::RetentionPeriods;

const SECS_PER_DAY: u64 = 86_400;

/// Class of ephemeral records sharing a key prefix and retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFamily {
    /// `transcript:*` JSON documents.
    Transcript,
    /// `transcripts:*` per-room lists of transcript ids.
    TranscriptIndex,
    /// `processed_notes:*` JSON documents.
    ProcessedNote,
    /// `room:*` live session state.
    Room,
    /// `user_rooms:*` user to room maps.
    UserRoomMap,
    /// `audio_chunk:*` raw audio buffers.
    AudioChunk,
}

impl RecordFamily {
    pub const ALL: [RecordFamily; 6] = [
        RecordFamily::Transcript,
        RecordFamily::TranscriptIndex,
        RecordFamily::ProcessedNote,
        RecordFamily::Room,
        RecordFamily::UserRoomMap,
        RecordFamily::AudioChunk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFamily::Transcript => "transcript",
            RecordFamily::TranscriptIndex => "transcript_index",
            RecordFamily::ProcessedNote => "processed_note",
            RecordFamily::Room => "room",
            RecordFamily::UserRoomMap => "user_room_map",
            RecordFamily::AudioChunk => "audio_chunk",
        }
    }
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to a record once it is past its retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Remove the key.
    HardDelete,
    /// Bound the key's lifetime and let the store expire it.
    TtlRebound,
    /// Only tally; the store's native TTL does the removal.
    CountOnly,
}

/// Encoding of the timestamp embedded in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` taken as UTC.
    Iso8601,
    /// Seconds since the Unix epoch, as a number or numeric string.
    UnixSeconds,
    /// Milliseconds since the Unix epoch, as a number or numeric string.
    UnixMillis,
}

/// Top-level field of a JSON record holding its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampField {
    pub name: &'static str,
    pub format: TimestampFormat,
}

/// How a family's expiry is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expiry {
    /// Age is derived from a timestamp inside the value.
    Timestamp {
        field: TimestampField,
        max_age: Duration,
    },
    /// Expiry is the store's TTL. Keys without one are given `cap`; with
    /// `clamp_existing`, TTLs longer than `cap` are shortened to it.
    NativeTtl { cap: Duration, clamp_existing: bool },
}

/// Immutable description of one record family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyDescriptor {
    pub family: RecordFamily,
    /// Store glob pattern matching the family's keys.
    pub pattern: &'static str,
    pub expiry: Expiry,
    pub policy: DeletionPolicy,
}

impl FamilyDescriptor {
    /// A zero age or cap disables the family.
    pub fn is_enabled(&self) -> bool {
        match self.expiry {
            Expiry::Timestamp { max_age, .. } => !max_age.is_zero(),
            Expiry::NativeTtl { cap, .. } => !cap.is_zero(),
        }
    }
}

/// The full family table with retention periods applied, including
/// disabled families.
pub fn table(periods: &RetentionPeriods) -> Vec<FamilyDescriptor> {
    let days = |d: u32| Duration::from_secs(u64::from(d) * SECS_PER_DAY);

    vec![
        FamilyDescriptor {
            family: RecordFamily::Transcript,
            pattern: "transcript:*",
            expiry: Expiry::Timestamp {
                field: TimestampField {
                    name: "created_at",
                    format: TimestampFormat::Iso8601,
                },
                max_age: days(periods.transcripts_days),
            },
            policy: DeletionPolicy::HardDelete,
        },
        FamilyDescriptor {
            family: RecordFamily::TranscriptIndex,
            pattern: "transcripts:*",
            expiry: Expiry::NativeTtl {
                cap: Duration::from_secs(periods.transcript_index_ttl_secs),
                clamp_existing: true,
            },
            policy: DeletionPolicy::TtlRebound,
        },
        FamilyDescriptor {
            family: RecordFamily::ProcessedNote,
            pattern: "processed_notes:*",
            expiry: Expiry::Timestamp {
                field: TimestampField {
                    name: "processed_at",
                    format: TimestampFormat::Iso8601,
                },
                max_age: days(periods.processed_notes_days),
            },
            policy: DeletionPolicy::HardDelete,
        },
        FamilyDescriptor {
            family: RecordFamily::Room,
            pattern: "room:*",
            expiry: Expiry::NativeTtl {
                cap: Duration::from_secs(periods.room_ttl_secs),
                clamp_existing: false,
            },
            policy: DeletionPolicy::TtlRebound,
        },
        FamilyDescriptor {
            family: RecordFamily::UserRoomMap,
            pattern: "user_rooms:*",
            expiry: Expiry::NativeTtl {
                cap: Duration::from_secs(periods.user_rooms_ttl_secs),
                clamp_existing: true,
            },
            policy: DeletionPolicy::TtlRebound,
        },
        FamilyDescriptor {
            family: RecordFamily::AudioChunk,
            pattern: "audio_chunk:*",
            expiry: Expiry::NativeTtl {
                cap: Duration::from_secs(periods.audio_chunk_ttl_secs),
                clamp_existing: false,
            },
            policy: DeletionPolicy::CountOnly,
        },
    ]
}

/// Descriptors of the families that are swept.
pub fn descriptors(periods: &RetentionPeriods) -> Vec<FamilyDescriptor> {
    table(periods)
        .into_iter()
        .filter(FamilyDescriptor::is_enabled)
        .collect()
}
