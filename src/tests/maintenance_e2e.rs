//! End-to-end maintenance runs.
//!
//! Every test builds a [`MaintenanceHarness`] around a seeded
//! [`MemoryStore`], a fixed liveness probe and recording sinks, runs the
//! orchestrator once and inspects the returned report and the store.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use rstest::rstest;

use crate::{
    config::JanitorConfig,
    health::{LivenessProbe, PersistentStore, ServiceStatus, UnreachableDatabase},
    orchestrator::{Maintenance, MaintenanceDeps, RunOptions, report_setup_failure},
    report::{DeliveryStatus, RenderedReport, RunReport},
    retention::RecordFamily,
    sinks::{DisabledSink, ReportSink, SinkError, SinkResult},
    store::{KeyTtl, MemoryStore, Store, StoreError, StoreResult},
};

// =============================================================================
// Test doubles
// =============================================================================

struct AllRunning;

#[async_trait]
impl LivenessProbe for AllRunning {
    async fn status(&self, _service: &str) -> ServiceStatus {
        ServiceStatus::Running
    }
}

/// Keeps every report it is handed.
#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<(RunReport, RenderedReport)>>,
}

impl RecordingSink {
    fn reports(&self) -> Vec<(RunReport, RenderedReport)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, report: &RunReport, rendered: &RenderedReport) -> SinkResult<String> {
        self.delivered
            .lock()
            .unwrap()
            .push((report.clone(), rendered.clone()));
        Ok("recorded".into())
    }
}

struct FailingSink;

#[async_trait]
impl ReportSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _report: &RunReport, _rendered: &RenderedReport) -> SinkResult<String> {
        Err(SinkError::Status {
            status: 502,
            body: "bad gateway".into(),
        })
    }
}

struct HangingSink;

#[async_trait]
impl ReportSink for HangingSink {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn deliver(&self, _report: &RunReport, _rendered: &RenderedReport) -> SinkResult<String> {
        std::future::pending().await
    }
}

/// A store whose every operation fails as if the server were down.
struct DownStore;

#[async_trait]
impl Store for DownStore {
    fn backend_name(&self) -> &'static str {
        "down"
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn scan<'a>(&'a self, _pattern: &'a str) -> BoxStream<'a, StoreResult<String>> {
        Box::pin(futures::stream::once(async {
            Err(StoreError::Unavailable("connection refused".into()))
        }))
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ttl(&self, _key: &str) -> StoreResult<KeyTtl> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn info(&self) -> StoreResult<BTreeMap<String, String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Wraps a store and delays every read, so sweeps outlast a short deadline.
struct SlowStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    fn backend_name(&self) -> &'static str {
        "slow"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, StoreResult<String>> {
        self.inner.scan(pattern)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        tokio::time::sleep(self.delay).await;
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn info(&self) -> StoreResult<BTreeMap<String, String>> {
        self.inner.info().await
    }
}

/// Delegates to a memory store but fails the scan of one pattern, as a
/// Redis node dropping the connection mid-`SCAN` would.
struct BrokenScanStore {
    inner: Arc<MemoryStore>,
    broken_pattern: &'static str,
}

#[async_trait]
impl Store for BrokenScanStore {
    fn backend_name(&self) -> &'static str {
        "broken-scan"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, StoreResult<String>> {
        if pattern == self.broken_pattern {
            Box::pin(futures::stream::once(async {
                Err(StoreError::Unavailable("connection reset during SCAN".into()))
            }))
        } else {
            self.inner.scan(pattern)
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn info(&self) -> StoreResult<BTreeMap<String, String>> {
        self.inner.info().await
    }
}

// =============================================================================
// Harness
// =============================================================================

const BASE_CONFIG: &str = r#"
[store]
type = "memory"

[health]
probe_timeout_secs = 1
services = ["api", "notes"]
system_metrics = false

[rotation]
enabled = false

[reporting]
timeout_secs = 1
"#;

fn config(extra: &str) -> JanitorConfig {
    JanitorConfig::from_str(&format!("{BASE_CONFIG}\n{extra}")).expect("test config is valid")
}

struct MaintenanceHarness {
    recording: Arc<RecordingSink>,
    maintenance: Maintenance,
}

impl MaintenanceHarness {
    fn new(config: JanitorConfig, store: Arc<dyn Store>) -> Self {
        Self::with(config, store, None, Vec::new(), RunOptions::default())
    }

    fn with(
        config: JanitorConfig,
        store: Arc<dyn Store>,
        database: Option<Arc<dyn PersistentStore>>,
        extra_sinks: Vec<Arc<dyn ReportSink>>,
        options: RunOptions,
    ) -> Self {
        let recording = Arc::new(RecordingSink::default());
        let mut sinks: Vec<Arc<dyn ReportSink>> = vec![recording.clone()];
        sinks.extend(extra_sinks);

        let deps = MaintenanceDeps {
            store,
            database,
            liveness: Arc::new(AllRunning),
            sinks,
        };
        Self {
            recording,
            maintenance: Maintenance::new(config, options, deps),
        }
    }

    async fn run(&self) -> RunReport {
        self.maintenance.run_once().await
    }
}

fn transcript(age_days: i64) -> String {
    let created_at = Utc::now() - chrono::Duration::days(age_days);
    serde_json::json!({
        "room_id": "room-1",
        "created_at": created_at.to_rfc3339(),
        "segments": [],
    })
    .to_string()
}

/// 3 expired, 1 malformed and 6 fresh transcripts.
fn seed_transcripts(store: &MemoryStore) {
    for i in 0..3 {
        store.insert(format!("transcript:old-{i}"), transcript(31));
    }
    store.insert("transcript:broken", "{not json");
    for i in 0..6 {
        store.insert(format!("transcript:fresh-{i}"), transcript(1));
    }
}

fn family(report: &RunReport, family: RecordFamily) -> &crate::retention::FamilySweepResult {
    report
        .families
        .iter()
        .find(|r| r.family == family)
        .expect("family was swept")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_transcript_sweep_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    seed_transcripts(&store);

    let harness = MaintenanceHarness::new(config(""), store.clone());
    let report = harness.run().await;

    assert!(report.is_success(), "fatal: {:?}", report.fatal_error);
    let transcripts = family(&report, RecordFamily::Transcript);
    assert_eq!(transcripts.total, 10);
    assert_eq!(transcripts.deleted, 3);
    assert_eq!(transcripts.errors, 1);
    assert_eq!(transcripts.remaining, 7);
    assert!(!transcripts.truncated);

    for i in 0..3 {
        assert!(!store.contains(&format!("transcript:old-{i}")));
    }
    assert!(store.contains("transcript:broken"));
    assert_eq!(store.len(), 7);

    let health = report.health.as_ref().expect("health stage ran");
    assert!(health.store.is_ok());
    assert!(health.database.is_none());
    assert!(health.system.is_none());
    assert!(report.key_rotation.is_none());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    seed_transcripts(&store);

    let harness = MaintenanceHarness::new(config(""), store.clone());
    let first = harness.run().await;
    let second = harness.run().await;

    let first = family(&first, RecordFamily::Transcript);
    let second = family(&second, RecordFamily::Transcript);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.remaining, first.remaining);
    assert_eq!(second.errors, 1);
}

#[tokio::test]
async fn test_native_ttl_families_are_bounded() {
    let store = Arc::new(MemoryStore::new());
    store.insert("room:abc", r#"{"participants":[]}"#);
    store.insert_with_ttl("room:def", "{}", Duration::from_secs(30));
    store.insert("user_rooms:u1", "room:abc");
    store.insert_with_ttl("audio_chunk:1", vec![0u8; 16], Duration::from_secs(600));

    let harness = MaintenanceHarness::new(config(""), store.clone());
    let report = harness.run().await;

    let rooms = family(&report, RecordFamily::Room);
    assert_eq!(rooms.total, 2);
    assert_eq!(rooms.rebounded, 1);
    assert_eq!(rooms.deleted, 0);

    let maps = family(&report, RecordFamily::UserRoomMap);
    assert_eq!(maps.rebounded, 1);

    let audio = family(&report, RecordFamily::AudioChunk);
    assert_eq!(audio.total, 1);
    assert_eq!(audio.rebounded, 0);
    assert_eq!(audio.deleted, 0);

    match store.ttl("room:abc").await.unwrap() {
        KeyTtl::Expires(ttl) => assert!(ttl > Duration::ZERO && ttl <= Duration::from_secs(3600)),
        other => panic!("expected a TTL, got {other:?}"),
    }
    assert!(matches!(
        store.ttl("audio_chunk:1").await.unwrap(),
        KeyTtl::Expires(ttl) if ttl <= Duration::from_secs(600)
    ));
}

#[tokio::test]
async fn test_dry_run_option_never_mutates() {
    let store = Arc::new(MemoryStore::new());
    seed_transcripts(&store);
    store.insert("room:abc", "{}");

    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let harness = MaintenanceHarness::with(config(""), store.clone(), None, Vec::new(), options);
    let report = harness.run().await;

    assert!(report.dry_run);
    assert_eq!(family(&report, RecordFamily::Transcript).deleted, 3);
    assert_eq!(family(&report, RecordFamily::Room).rebounded, 1);
    assert_eq!(store.len(), 11);
    assert_eq!(store.ttl("room:abc").await.unwrap(), KeyTtl::Persistent);
}

#[tokio::test]
async fn test_unreachable_store_still_delivers_minimal_report() {
    let harness = MaintenanceHarness::new(config(""), Arc::new(DownStore));
    let report = harness.run().await;

    assert!(!report.is_success());
    let fatal = report.fatal_error.as_deref().unwrap();
    assert!(fatal.contains("Store unreachable"), "got {fatal}");
    assert!(report.families.is_empty());
    assert!(report.health.is_none());
    assert!(report.key_rotation.is_none());

    let delivered = harness.recording.reports();
    assert_eq!(delivered.len(), 1);
    let (sent, rendered) = &delivered[0];
    assert_eq!(sent.fatal_error, report.fatal_error);
    assert!(rendered.body.contains("Fatal Error"));
    assert!(matches!(
        report.deliveries.get("recording"),
        Some(DeliveryStatus::Delivered { .. })
    ));
}

#[tokio::test]
async fn test_deadline_truncates_sweep() {
    let inner = Arc::new(MemoryStore::new());
    for i in 0..20 {
        inner.insert(format!("transcript:t{i}"), transcript(1));
    }
    let store = Arc::new(SlowStore {
        inner: inner.clone(),
        delay: Duration::from_millis(200),
    });

    let config = config(
        r#"
[run]
deadline_secs = 1

[retention.safety]
key_concurrency = 1
"#,
    );
    let harness = MaintenanceHarness::new(config, store);
    let report = harness.run().await;

    assert!(report.is_success());
    assert!(report.truncated);
    let transcripts = family(&report, RecordFamily::Transcript);
    assert!(transcripts.truncated);
    assert!(transcripts.total < 20, "scanned {}", transcripts.total);
    assert!(report.health.is_some());
    assert_eq!(inner.len(), 20);
}

#[rstest]
#[case::status_error(Arc::new(FailingSink) as Arc<dyn ReportSink>, "failing")]
#[case::timeout(Arc::new(HangingSink) as Arc<dyn ReportSink>, "hanging")]
#[tokio::test]
async fn test_sink_failure_is_isolated(#[case] sink: Arc<dyn ReportSink>, #[case] name: &str) {
    let store = Arc::new(MemoryStore::new());
    seed_transcripts(&store);

    let harness = MaintenanceHarness::with(
        config(""),
        store,
        None,
        vec![sink, Arc::new(DisabledSink::new("email"))],
        RunOptions::default(),
    );
    let report = harness.run().await;

    assert!(report.is_success());
    assert_eq!(harness.recording.reports().len(), 1);
    assert!(matches!(
        report.deliveries.get(name),
        Some(DeliveryStatus::Failed { .. })
    ));
    assert!(matches!(
        report.deliveries.get("email"),
        Some(DeliveryStatus::Skipped { .. })
    ));
    assert!(matches!(
        report.deliveries.get("recording"),
        Some(DeliveryStatus::Delivered { .. })
    ));
}

#[tokio::test]
async fn test_database_failure_only_affects_its_section() {
    let store = Arc::new(MemoryStore::new());
    store.insert("room:abc", "{}");

    let database: Arc<dyn PersistentStore> = Arc::new(UnreachableDatabase::new("refused"));
    let harness = MaintenanceHarness::with(
        config(""),
        store,
        Some(database),
        Vec::new(),
        RunOptions::default(),
    );
    let report = harness.run().await;

    assert!(report.is_success());
    let health = report.health.as_ref().unwrap();
    assert!(health.store.is_ok());
    assert!(health.services.is_ok());
    let database = health.database.as_ref().unwrap();
    assert!(database.data.is_none());
    assert!(database.error.as_deref().unwrap().contains("refused"));
}

#[tokio::test]
async fn test_forced_rotation_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let options = RunOptions {
        force_rotation: true,
        ..Default::default()
    };
    let harness = MaintenanceHarness::with(config(""), store, None, Vec::new(), options);
    let report = harness.run().await;

    let rotation = report.key_rotation.as_ref().expect("rotation forced");
    assert_eq!(rotation.rotated_keys, vec!["JWT_SECRET", "OPENAI_API_KEY"]);
    assert!(report.render().body.contains("Key Rotation"));
}

#[tokio::test]
async fn test_family_scan_failure_is_fatal() {
    let inner = Arc::new(MemoryStore::new());
    seed_transcripts(&inner);
    inner.insert("room:abc", "{}");
    let store = Arc::new(BrokenScanStore {
        inner: inner.clone(),
        broken_pattern: "processed_notes:*",
    });

    let harness = MaintenanceHarness::new(config(""), store);
    let report = harness.run().await;

    let fatal = report.fatal_error.as_deref().expect("scan failure is fatal");
    assert!(fatal.starts_with("Key scan failed"), "got {fatal}");
    assert!(fatal.contains("processed_note"), "got {fatal}");
    assert!(report.health.is_none());
    assert!(report.key_rotation.is_none());

    let notes = family(&report, RecordFamily::ProcessedNote);
    assert!(notes.scan_error.is_some());
    assert!(!notes.truncated);

    // Sibling families still finish their sweeps.
    let transcripts = family(&report, RecordFamily::Transcript);
    assert_eq!(transcripts.total, 10);
    assert_eq!(transcripts.deleted, 3);
    assert_eq!(family(&report, RecordFamily::Room).rebounded, 1);
    assert_eq!(inner.len(), 8);

    let delivered = harness.recording.reports();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.fatal_error, report.fatal_error);
}

#[tokio::test]
async fn test_setup_failure_still_delivers_report() {
    let recording = Arc::new(RecordingSink::default());
    let sinks: Vec<Arc<dyn ReportSink>> = vec![
        recording.clone(),
        Arc::new(DisabledSink::new("email")),
    ];

    let report = report_setup_failure(
        &config(""),
        RunOptions::default(),
        &sinks,
        "Store client could not be created: Missing hostname",
    )
    .await;

    assert!(!report.is_success());
    assert!(report.families.is_empty());
    assert!(report.health.is_none());

    let delivered = recording.reports();
    assert_eq!(delivered.len(), 1);
    let (sent, rendered) = &delivered[0];
    assert_eq!(sent.fatal_error, report.fatal_error);
    assert!(rendered.body.contains("Missing hostname"));
    assert!(matches!(
        report.deliveries.get("recording"),
        Some(DeliveryStatus::Delivered { .. })
    ));
    assert!(matches!(
        report.deliveries.get("email"),
        Some(DeliveryStatus::Skipped { .. })
    ));
}
