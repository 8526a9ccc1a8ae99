//! Expiry evaluation.
//!
//! Pure decision logic: given what was read for one key, decide what the
//! sweep does with it. Nothing here touches the store.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use super::family::{DeletionPolicy, Expiry, FamilyDescriptor, RecordFamily, TimestampFormat};
use crate::store::KeyTtl;

/// TTL handed to an expired record of a timestamp family whose policy is
/// [`DeletionPolicy::TtlRebound`].
const EXPIRED_REBOUND_TTL: Duration = Duration::from_secs(60);

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// What was read for a key at sweep time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSnapshot {
    /// Raw value of a timestamp-family record.
    Value(Vec<u8>),
    /// TTL state of a native-TTL-family key.
    Ttl(KeyTtl),
}

/// Action to take for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Delete,
    /// Set the key's TTL. Always greater than zero.
    Rebound(Duration),
    /// Tally as expired by the store itself; no mutation.
    CountOnly,
}

/// Why a record could not be evaluated. The record is always kept.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("value is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("value is not a JSON object")]
    NotAnObject,

    #[error("timestamp field '{0}' is missing")]
    MissingTimestamp(&'static str),

    #[error("timestamp field '{field}' has unparseable value {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("{family} records are evaluated from a {expected} snapshot")]
    UnexpectedSnapshot {
        family: RecordFamily,
        expected: &'static str,
    },
}

/// Decide what to do with one record.
///
/// Missing or corrupt timestamps are never treated as expired: they yield an
/// error and the caller keeps the record. A key without a TTL in a native-TTL
/// family is never left unbounded.
pub fn evaluate(
    snapshot: &RecordSnapshot,
    descriptor: &FamilyDescriptor,
    now: DateTime<Utc>,
) -> Result<Decision, RecordError> {
    match (descriptor.expiry, snapshot) {
        (Expiry::Timestamp { field, max_age }, RecordSnapshot::Value(raw)) => {
            let value: serde_json::Value = serde_json::from_slice(raw)?;
            let object = value.as_object().ok_or(RecordError::NotAnObject)?;
            let ts_value = object
                .get(field.name)
                .filter(|v| !v.is_null())
                .ok_or(RecordError::MissingTimestamp(field.name))?;
            let ts = parse_timestamp(ts_value, field.format).ok_or_else(|| {
                RecordError::InvalidTimestamp {
                    field: field.name,
                    value: ts_value.to_string(),
                }
            })?;

            // Future timestamps give a negative age, which never expires.
            let expired = now
                .signed_duration_since(ts)
                .to_std()
                .is_ok_and(|age| age > max_age);

            Ok(if expired {
                apply_policy(descriptor.policy)
            } else {
                Decision::Keep
            })
        }
        (
            Expiry::NativeTtl {
                cap,
                clamp_existing,
            },
            RecordSnapshot::Ttl(ttl),
        ) => {
            let cap = cap.max(Duration::from_secs(1));
            Ok(match *ttl {
                KeyTtl::Absent => Decision::CountOnly,
                KeyTtl::Persistent => Decision::Rebound(cap),
                KeyTtl::Expires(remaining) if remaining.is_zero() => Decision::CountOnly,
                KeyTtl::Expires(remaining) if clamp_existing && remaining > cap => {
                    Decision::Rebound(cap)
                }
                KeyTtl::Expires(_) => Decision::Keep,
            })
        }
        (Expiry::Timestamp { .. }, RecordSnapshot::Ttl(_)) => Err(RecordError::UnexpectedSnapshot {
            family: descriptor.family,
            expected: "value",
        }),
        (Expiry::NativeTtl { .. }, RecordSnapshot::Value(_)) => {
            Err(RecordError::UnexpectedSnapshot {
                family: descriptor.family,
                expected: "TTL",
            })
        }
    }
}

fn apply_policy(policy: DeletionPolicy) -> Decision {
    match policy {
        DeletionPolicy::HardDelete => Decision::Delete,
        DeletionPolicy::TtlRebound => Decision::Rebound(EXPIRED_REBOUND_TTL),
        DeletionPolicy::CountOnly => Decision::CountOnly,
    }
}

/// Parse a JSON timestamp value in the given format.
pub fn parse_timestamp(value: &serde_json::Value, format: TimestampFormat) -> Option<DateTime<Utc>> {
    match format {
        TimestampFormat::Iso8601 => {
            let s = value.as_str()?.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        TimestampFormat::UnixSeconds => {
            let secs = epoch_number(value)?;
            DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
        }
        TimestampFormat::UnixMillis => DateTime::from_timestamp_millis(epoch_number(value)? as i64),
    }
}

fn epoch_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::RetentionPeriods,
        retention::family::{TimestampField, table},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn descriptor(family: RecordFamily) -> FamilyDescriptor {
        table(&RetentionPeriods::default())
            .into_iter()
            .find(|d| d.family == family)
            .unwrap()
    }

    fn transcript(created_at: &str) -> RecordSnapshot {
        RecordSnapshot::Value(
            format!(r#"{{"room_id":"r1","text":"hello","created_at":{created_at}}}"#).into_bytes(),
        )
    }

    #[rstest]
    #[case::thirty_one_days_old(r#""2025-05-30T12:00:00""#, Decision::Delete)]
    #[case::rfc3339_with_offset(r#""2025-05-01T00:00:00+02:00""#, Decision::Delete)]
    #[case::zulu(r#""2025-01-01T00:00:00Z""#, Decision::Delete)]
    #[case::space_separated(r#""2025-05-01 08:30:00.123456""#, Decision::Delete)]
    #[case::twenty_nine_days_old(r#""2025-06-01T12:00:00""#, Decision::Keep)]
    #[case::exactly_thirty_days(r#""2025-05-31T12:00:00""#, Decision::Keep)]
    #[case::fractional_seconds(r#""2025-06-29T23:59:59.999999""#, Decision::Keep)]
    #[case::in_the_future(r#""2026-01-01T00:00:00""#, Decision::Keep)]
    fn test_transcript_age(#[case] created_at: &str, #[case] expected: Decision) {
        let decision = evaluate(
            &transcript(created_at),
            &descriptor(RecordFamily::Transcript),
            now(),
        )
        .unwrap();
        assert_eq!(decision, expected);
    }

    #[rstest]
    #[case::not_json(b"not json at all".as_slice())]
    #[case::json_array(br#"["created_at"]"#.as_slice())]
    #[case::missing_field(br#"{"text":"hi"}"#.as_slice())]
    #[case::null_field(br#"{"created_at":null}"#.as_slice())]
    #[case::garbage_timestamp(br#"{"created_at":"yesterday"}"#.as_slice())]
    #[case::numeric_iso_field(br#"{"created_at":1700000000}"#.as_slice())]
    #[case::empty(b"".as_slice())]
    fn test_malformed_records_are_kept_with_error(#[case] raw: &[u8]) {
        let result = evaluate(
            &RecordSnapshot::Value(raw.to_vec()),
            &descriptor(RecordFamily::Transcript),
            now(),
        );
        assert!(result.is_err(), "expected error, got {result:?}");
    }

    #[test]
    fn test_processed_note_uses_processed_at() {
        let note = descriptor(RecordFamily::ProcessedNote);
        let old = RecordSnapshot::Value(
            br#"{"created_at":"2025-06-29T00:00:00","processed_at":"2025-03-01T00:00:00"}"#
                .to_vec(),
        );
        assert_eq!(evaluate(&old, &note, now()).unwrap(), Decision::Delete);

        let only_created = RecordSnapshot::Value(br#"{"created_at":"2020-01-01T00:00:00"}"#.to_vec());
        assert!(matches!(
            evaluate(&only_created, &note, now()),
            Err(RecordError::MissingTimestamp("processed_at"))
        ));
    }

    #[rstest]
    #[case::absent(RecordFamily::Room, KeyTtl::Absent, Decision::CountOnly)]
    #[case::no_ttl(RecordFamily::Room, KeyTtl::Persistent, Decision::Rebound(Duration::from_secs(3600)))]
    #[case::zero_ttl(RecordFamily::AudioChunk, KeyTtl::Expires(Duration::ZERO), Decision::CountOnly)]
    #[case::audio_no_ttl(RecordFamily::AudioChunk, KeyTtl::Persistent, Decision::Rebound(Duration::from_secs(3600)))]
    #[case::room_long_ttl_kept(RecordFamily::Room, KeyTtl::Expires(Duration::from_secs(7200)), Decision::Keep)]
    #[case::user_rooms_long_ttl_clamped(RecordFamily::UserRoomMap, KeyTtl::Expires(Duration::from_secs(7200)), Decision::Rebound(Duration::from_secs(3600)))]
    #[case::user_rooms_short_ttl_kept(RecordFamily::UserRoomMap, KeyTtl::Expires(Duration::from_secs(60)), Decision::Keep)]
    #[case::index_at_cap_kept(RecordFamily::TranscriptIndex, KeyTtl::Expires(Duration::from_secs(86_400)), Decision::Keep)]
    #[case::index_no_ttl(RecordFamily::TranscriptIndex, KeyTtl::Persistent, Decision::Rebound(Duration::from_secs(86_400)))]
    fn test_native_ttl_rules(
        #[case] family: RecordFamily,
        #[case] ttl: KeyTtl,
        #[case] expected: Decision,
    ) {
        let decision = evaluate(&RecordSnapshot::Ttl(ttl), &descriptor(family), now()).unwrap();
        assert_eq!(decision, expected);
    }

    #[test]
    fn test_rebound_is_bounded() {
        for cap_secs in [1, 59, 3600, 86_400] {
            let room = FamilyDescriptor {
                expiry: Expiry::NativeTtl {
                    cap: Duration::from_secs(cap_secs),
                    clamp_existing: true,
                },
                ..descriptor(RecordFamily::Room)
            };
            let Decision::Rebound(ttl) =
                evaluate(&RecordSnapshot::Ttl(KeyTtl::Persistent), &room, now()).unwrap()
            else {
                panic!("expected rebound");
            };
            assert!(ttl > Duration::ZERO && ttl <= Duration::from_secs(cap_secs));
        }
    }

    #[test]
    fn test_snapshot_kind_mismatch() {
        let result = evaluate(
            &RecordSnapshot::Ttl(KeyTtl::Persistent),
            &descriptor(RecordFamily::Transcript),
            now(),
        );
        assert!(matches!(result, Err(RecordError::UnexpectedSnapshot { .. })));
    }

    #[test]
    fn test_expired_record_under_other_policies() {
        let stale = RecordSnapshot::Value(br#"{"created_at":"2020-01-01T00:00:00Z"}"#.to_vec());
        let mut d = descriptor(RecordFamily::Transcript);

        d.policy = DeletionPolicy::TtlRebound;
        assert_eq!(
            evaluate(&stale, &d, now()).unwrap(),
            Decision::Rebound(EXPIRED_REBOUND_TTL)
        );

        d.policy = DeletionPolicy::CountOnly;
        assert_eq!(evaluate(&stale, &d, now()).unwrap(), Decision::CountOnly);
    }

    #[rstest]
    #[case::seconds_number(serde_json::json!(1_700_000_000), TimestampFormat::UnixSeconds)]
    #[case::seconds_float(serde_json::json!(1_700_000_000.5), TimestampFormat::UnixSeconds)]
    #[case::seconds_string(serde_json::json!("1700000000"), TimestampFormat::UnixSeconds)]
    #[case::millis_number(serde_json::json!(1_700_000_000_000_i64), TimestampFormat::UnixMillis)]
    fn test_epoch_formats(#[case] value: serde_json::Value, #[case] format: TimestampFormat) {
        let ts = parse_timestamp(&value, format).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_epoch_rejects_negative_and_text() {
        assert!(parse_timestamp(&serde_json::json!(-5), TimestampFormat::UnixSeconds).is_none());
        assert!(parse_timestamp(&serde_json::json!("soon"), TimestampFormat::UnixMillis).is_none());
    }

    #[test]
    fn test_custom_timestamp_field() {
        let d = FamilyDescriptor {
            expiry: Expiry::Timestamp {
                field: TimestampField {
                    name: "ts",
                    format: TimestampFormat::UnixMillis,
                },
                max_age: Duration::from_secs(60),
            },
            ..descriptor(RecordFamily::Transcript)
        };
        let ten_minutes_ago = (now() - chrono::Duration::minutes(10)).timestamp_millis();
        let snapshot = RecordSnapshot::Value(format!(r#"{{"ts":{ten_minutes_ago}}}"#).into_bytes());
        assert_eq!(evaluate(&snapshot, &d, now()).unwrap(), Decision::Delete);
    }
}
