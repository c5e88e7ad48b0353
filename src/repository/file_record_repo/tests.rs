use super::{FileRecordRepository, LeaseAttempt, ReleaseAttempt};
use crate::domain::file_record::{FileQuery, FileRecord};
use crate::domain::processing_event::ProcessingEvent;
use crate::domain::types::{EventAction, FileKind, FileStatus};
use crate::repository::error::RepositoryError;
use crate::repository::processing_event_repo::ProcessingEventRepository;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();
    conn.execute(
        r#"
        INSERT INTO supplier (supplier_id, supplier_code, name, source_json, created_at, updated_at)
        VALUES ('s1', 'ACME', 'Acme', '{"kind":"manual"}', '2025-03-01 00:00:00', '2025-03-01 00:00:00')
        "#,
        [],
    )
    .unwrap();
    Arc::new(Mutex::new(conn))
}

fn ts(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn make_record(file_id: &str, filename: &str, day: u32) -> FileRecord {
    FileRecord {
        file_id: file_id.to_string(),
        filename: filename.to_string(),
        supplier_id: "s1".to_string(),
        supplier_code: "ACME".to_string(),
        received_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        file_kind: FileKind::Csv,
        status: FileStatus::Pending,
        locked_by: None,
        locked_at: None,
        processed_by: None,
        processed_at: None,
        original_path: format!("original/ACME/{}", filename),
        transformed_path: None,
        row_count: Some(2),
        file_size: 64,
        content_hash: None,
        error_message: None,
        created_at: ts(8, 0),
        updated_at: ts(8, 0),
    }
}

fn insert(repo: &FileRecordRepository, record: &FileRecord) {
    let event = ProcessingEvent::new(&record.file_id, "collector", EventAction::Uploaded, json!({}), ts(8, 0));
    repo.insert_with_event(record, &event).unwrap();
}

#[test]
fn test_insert_and_find() {
    let conn = setup_test_db();
    let repo = FileRecordRepository::new(conn.clone());
    insert(&repo, &make_record("f1", "commande_01.csv", 10));

    let found = repo.find_by_id("f1").unwrap().unwrap();
    assert_eq!(found.status, FileStatus::Pending);
    assert_eq!(found.content_hash, None);
    assert!(repo.find_by_identity("ACME", "commande_01.csv", None).unwrap().is_some());
    assert!(repo.find_by_identity("ACME", "other.csv", None).unwrap().is_none());

    let events = ProcessingEventRepository::new(conn).list_by_file("f1").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, EventAction::Uploaded);
}

#[test]
fn test_duplicate_identity_rejected() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "a.csv", 10));
    let dup = make_record("f2", "a.csv", 11);
    let event = ProcessingEvent::new("f2", "collector", EventAction::Uploaded, json!({}), ts(8, 0));
    assert!(matches!(
        repo.insert_with_event(&dup, &event),
        Err(RepositoryError::UniqueConstraintViolation(_))
    ));
}

#[test]
fn test_lease_acquire_conflict_and_refresh() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "a.csv", 10));
    let timeout = Duration::minutes(30);

    assert_eq!(
        repo.try_acquire_lease("f1", "alice", ts(10, 0), timeout).unwrap(),
        LeaseAttempt::Acquired { reclaimed_from: None }
    );
    assert_eq!(
        repo.try_acquire_lease("f1", "bob", ts(10, 10), timeout).unwrap(),
        LeaseAttempt::Held {
            holder: "alice".to_string(),
            locked_at: ts(10, 0)
        }
    );
    assert_eq!(
        repo.try_acquire_lease("f1", "alice", ts(10, 20), timeout).unwrap(),
        LeaseAttempt::Refreshed
    );
    let r = repo.find_by_id("f1").unwrap().unwrap();
    assert_eq!(r.locked_at, Some(ts(10, 20)));
    r.check_invariants().unwrap();
}

#[test]
fn test_stale_lease_reclaimed_on_acquire() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "a.csv", 10));
    let timeout = Duration::minutes(30);

    repo.try_acquire_lease("f1", "alice", ts(10, 0), timeout).unwrap();
    assert_eq!(
        repo.try_acquire_lease("f1", "bob", ts(10, 31), timeout).unwrap(),
        LeaseAttempt::Acquired {
            reclaimed_from: Some("alice".to_string())
        }
    );
    assert_eq!(repo.find_by_id("f1").unwrap().unwrap().locked_by.as_deref(), Some("bob"));
}

#[test]
fn test_release_is_holder_only_and_idempotent() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "a.csv", 10));
    let timeout = Duration::minutes(30);
    repo.try_acquire_lease("f1", "alice", ts(10, 0), timeout).unwrap();

    assert_eq!(
        repo.release_lease("f1", "bob", ts(10, 1)).unwrap(),
        ReleaseAttempt::HeldByOther {
            holder: "alice".to_string()
        }
    );
    assert_eq!(repo.release_lease("f1", "alice", ts(10, 2)).unwrap(), ReleaseAttempt::Released);
    assert_eq!(
        repo.release_lease("f1", "alice", ts(10, 3)).unwrap(),
        ReleaseAttempt::AlreadyUnlocked(FileStatus::Pending)
    );
    assert_eq!(repo.release_lease("nope", "alice", ts(10, 3)).unwrap(), ReleaseAttempt::NotFound);
}

#[test]
fn test_complete_and_fail_require_holder() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "a.csv", 10));
    insert(&repo, &make_record("f2", "b.csv", 10));
    let timeout = Duration::minutes(30);
    repo.try_acquire_lease("f1", "alice", ts(10, 0), timeout).unwrap();
    repo.try_acquire_lease("f2", "alice", ts(10, 0), timeout).unwrap();

    assert!(!repo
        .complete_with_event("f1", "bob", "transformed/x.csv", 2, ts(10, 5), json!({}))
        .unwrap());
    assert!(repo
        .complete_with_event("f1", "alice", "transformed/x.csv", 2, ts(10, 5), json!({}))
        .unwrap());
    let done = repo.find_by_id("f1").unwrap().unwrap();
    assert_eq!(done.status, FileStatus::Completed);
    assert_eq!(done.processed_by.as_deref(), Some("alice"));
    done.check_invariants().unwrap();

    assert!(repo.fail_with_event("f2", "alice", "缺少必需列: Ref", ts(10, 6)).unwrap());
    let failed = repo.find_by_id("f2").unwrap().unwrap();
    assert_eq!(failed.status, FileStatus::Error);
    assert_eq!(failed.locked_by, None);

    // completed 不可再加锁, error 可以
    assert_eq!(
        repo.try_acquire_lease("f1", "bob", ts(11, 0), timeout).unwrap(),
        LeaseAttempt::NotLockable(FileStatus::Completed)
    );
    assert_eq!(
        repo.try_acquire_lease("f2", "bob", ts(11, 0), timeout).unwrap(),
        LeaseAttempt::Acquired { reclaimed_from: None }
    );
}

#[test]
fn test_reset_stale_leases() {
    let conn = setup_test_db();
    let repo = FileRecordRepository::new(conn.clone());
    insert(&repo, &make_record("f1", "a.csv", 10));
    insert(&repo, &make_record("f2", "b.csv", 10));
    let timeout = Duration::minutes(30);
    repo.try_acquire_lease("f1", "alice", ts(9, 0), timeout).unwrap();
    repo.try_acquire_lease("f2", "bob", ts(9, 50), timeout).unwrap();

    let reclaimed = repo.reset_stale_leases(ts(10, 0), timeout).unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].file_id, "f1");
    assert_eq!(reclaimed[0].holder, "alice");

    assert_eq!(repo.find_by_id("f1").unwrap().unwrap().status, FileStatus::Pending);
    assert_eq!(repo.find_by_id("f2").unwrap().unwrap().status, FileStatus::Processing);

    let events = ProcessingEventRepository::new(conn);
    assert_eq!(events.count_by_action("f1", EventAction::Unlocked).unwrap(), 1);
}

#[test]
fn test_list_with_filters_and_summary() {
    let repo = FileRecordRepository::new(setup_test_db());
    insert(&repo, &make_record("f1", "commande_01.csv", 8));
    insert(&repo, &make_record("f2", "commande_02.csv", 9));
    insert(&repo, &make_record("f3", "avoir_100%.csv", 10));
    repo.try_acquire_lease("f3", "alice", ts(10, 0), Duration::minutes(30)).unwrap();

    let all = repo.list(&FileQuery::default()).unwrap();
    assert_eq!(all.iter().map(|r| r.file_id.as_str()).collect::<Vec<_>>(), vec!["f3", "f2", "f1"]);

    let q = FileQuery {
        status: Some(FileStatus::Pending),
        received_from: Some(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()),
        ..Default::default()
    };
    assert_eq!(repo.list(&q).unwrap().len(), 1);

    let q = FileQuery {
        filename_contains: Some("100%".to_string()),
        ..Default::default()
    };
    assert_eq!(repo.list(&q).unwrap()[0].file_id, "f3");

    let summary = repo.status_summary(None).unwrap();
    let count = |s: FileStatus| summary.iter().find(|c| c.status == s).unwrap().count;
    assert_eq!(count(FileStatus::Pending), 2);
    assert_eq!(count(FileStatus::Processing), 1);
    assert_eq!(count(FileStatus::Merged), 0);
    assert_eq!(repo.status_summary(Some("other")).unwrap().iter().map(|c| c.count).sum::<i64>(), 0);
}

#[test]
fn test_processing_event_is_append_only() {
    let conn = setup_test_db();
    let repo = FileRecordRepository::new(conn.clone());
    insert(&repo, &make_record("f1", "a.csv", 10));

    let guard = conn.lock().unwrap();
    assert!(guard
        .execute("UPDATE processing_event SET actor = 'x' WHERE file_id = ?1", params!["f1"])
        .is_err());
    assert!(guard
        .execute("DELETE FROM processing_event WHERE file_id = ?1", params!["f1"])
        .is_err());
}
