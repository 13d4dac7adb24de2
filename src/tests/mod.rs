//! End-to-end tests running both jobs against real store backends.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use crate::{
    config::RollcallConfig,
    models::{AttendanceStatus, RecordKey, Roster},
    reconcile::{Outcome, Reconciler},
    retention::RetentionPurger,
    store::{self, AttendanceStore, FileStore, MemoryStore, test_utils::stored},
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn file_config(dir: &std::path::Path, page_size: usize, extra: &str) -> RollcallConfig {
    let toml = format!(
        r#"
[store]
type = "file"
path = "{}"
page_size = {}

[reconcile]
roster = ["U1", "U2"]

{}
"#,
        dir.display(),
        page_size,
        extra
    );
    RollcallConfig::from_str(&toml).unwrap()
}

#[tokio::test]
async fn test_reconcile_example_day_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let seed = FileStore::new(dir.path(), 10).await.unwrap();
    seed.insert(&stored("U1", "WorkFromHome", "2024-01-01T10:00:00Z"))
        .await
        .unwrap();

    let config = file_config(dir.path(), 1, "");
    let store = store::create_store(&config.store).await.unwrap();
    let reconciler = Reconciler::from_config(store, &config).unwrap();
    let roster = config.require_roster().unwrap();

    let report = reconciler
        .run(day(2024, 1, 1), roster, CancellationToken::new())
        .await
        .unwrap();

    let lines: Vec<String> = report.outcomes.iter().map(ToString::to_string).collect();
    assert_eq!(lines[0], "U1 already responded: WorkFromHome");
    assert_eq!(lines[1], "U2 (unknown) marked as OnLeave");
    assert!(!report.has_failures());

    // A fresh handle sees the synthetic record on disk.
    let reopened = FileStore::new(dir.path(), 10).await.unwrap();
    let page = reopened.scan_page(None).await.unwrap();
    let synthetic = page
        .records
        .iter()
        .find(|r| r.user_id == "U2")
        .expect("synthetic record for U2");
    assert_eq!(synthetic.status, "OnLeave");
    assert_eq!(synthetic.timestamp, "2024-01-01T16:00:00Z");
    assert_eq!(page.records.len(), 2);
}

#[tokio::test]
async fn test_second_reconcile_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(dir.path(), 2, "");
    let store = store::create_store(&config.store).await.unwrap();
    let roster = config.require_roster().unwrap();
    let reconciler = Reconciler::from_config(store, &config).unwrap();

    let first = reconciler
        .run(day(2024, 1, 2), roster, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.marked(), 2);

    let second = reconciler
        .run(day(2024, 1, 2), roster, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.marked(), 0);
    assert_eq!(second.responded(), 2);
    assert!(second.outcomes.iter().all(|o| matches!(
        o.outcome,
        Outcome::AlreadyResponded {
            status: AttendanceStatus::OnLeave
        }
    )));
}

#[tokio::test]
async fn test_reconcile_then_purge() {
    let dir = tempfile::tempdir().unwrap();
    let seed = FileStore::new(dir.path(), 10).await.unwrap();
    seed.insert(&stored("U1", "WorkFromOffice", "2024-01-01T09:00:00Z"))
        .await
        .unwrap();
    // Exactly at the cutoff: kept.
    seed.insert(&stored("U1", "WorkFromHome", "2024-01-31T16:00:00Z"))
        .await
        .unwrap();
    seed.insert(&stored("U2", "WorkFromHome", "2024-02-29T08:30:00Z"))
        .await
        .unwrap();

    let config = file_config(dir.path(), 2, "[retention]\ndays = 30\n");
    let store = store::create_store(&config.store).await.unwrap();
    let roster = config.require_roster().unwrap();

    let reconcile = Reconciler::from_config(store.clone(), &config)
        .unwrap()
        .run(day(2024, 1, 1), roster, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reconcile.responded(), 1);
    assert_eq!(reconcile.marked(), 1);

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
    let report = RetentionPurger::from_config(store, &config)
        .unwrap()
        .run(now, CancellationToken::new())
        .await;

    assert!(report.is_success());
    assert_eq!(report.scanned, 4);
    assert_eq!(report.deleted, 2);

    let summary = report.summary();
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["deleted_records"], 2);

    let reopened = FileStore::new(dir.path(), 10).await.unwrap();
    let mut remaining: Vec<RecordKey> = reopened
        .scan_page(None)
        .await
        .unwrap()
        .records
        .iter()
        .map(|r| r.key())
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            RecordKey::new("U1", "2024-01-31T16:00:00Z"),
            RecordKey::new("U2", "2024-02-29T08:30:00Z"),
        ]
    );
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(7)]
#[case(100)]
#[tokio::test]
async fn test_both_jobs_cover_every_page(#[case] page_size: usize) {
    let users: Vec<String> = (0..10).map(|i| format!("U{i:02}")).collect();
    let mut records = Vec::new();
    for user in &users {
        records.push(stored(user, "WorkFromHome", "2024-01-01T09:00:00Z"));
        records.push(stored(user, "WorkFromOffice", "2024-06-01T09:00:00Z"));
    }
    let memory = Arc::new(MemoryStore::with_records(page_size, records));
    let store: Arc<dyn AttendanceStore> = memory.clone();

    let mut roster_ids = users.clone();
    roster_ids.push("U99".to_string());
    let roster = Roster::new(roster_ids);

    let policy = crate::reconcile::AbsencePolicy::default();
    let report = Reconciler::new(store.clone(), policy)
        .run(day(2024, 1, 1), &roster, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 20);
    assert_eq!(report.responded(), 10);
    assert_eq!(report.marked(), 1);

    let window = crate::retention::RetentionWindow::days(90).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
    let purge = RetentionPurger::new(store, window)
        .run(now, CancellationToken::new())
        .await;

    assert!(purge.is_success());
    assert_eq!(purge.scanned, 21);
    assert_eq!(purge.deleted, 11);
    assert_eq!(memory.len().await, 10);
}
