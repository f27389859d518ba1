//! End-to-end ingestion runs against in-memory remote and object storage

mod common;

use chrono::NaiveDate;
use common::{init_tracing, mastercard_record, MemoryConnector, MemoryRemote, MemoryStore};
use courier_common::CourierError;
use courier_ingest::config::{ArchivePolicy, DestinationSpec, IngestConfig, Provider};
use courier_ingest::orchestrator::{IngestOrchestrator, RunState};
use courier_ingest::sink::ObjectStoreSink;
use std::sync::Arc;

const INBOX: &str = "/download/inbox";

fn orchestrator(config: IngestConfig, store: &MemoryStore) -> IngestOrchestrator {
    let sink = Arc::new(ObjectStoreSink::new(Arc::new(store.clone())));
    IngestOrchestrator::new(config, sink).expect("valid config")
}

fn config(directory: &str, provider: Provider) -> IngestConfig {
    IngestConfig::new(INBOX, DestinationSpec::new("imports", directory), provider)
        .with_archive_date(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
}

fn report() -> (String, String, String) {
    let positive = mastercard_record("000000001500");
    let negative = mastercard_record("-00000000500");
    let content = format!("H1\n{}{}T1\n", positive, negative);
    (content, positive, negative)
}

#[tokio::test]
async fn test_mastercard_split_end_to_end() {
    init_tracing();
    let (content, positive, negative) = report();
    let remote = MemoryRemote::new().with_file(&format!("{}/report.txt", INBOX), &content);
    let store = MemoryStore::new();

    let summary = orchestrator(config("mastercard", Provider::Mastercard), &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();

    assert_eq!(summary.final_state, RunState::Done);
    assert_eq!(summary.listed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.objects_written, 2);
    assert!(summary.failed.is_empty());

    assert_eq!(
        store.get("imports", "mastercard-settlement/report.txt").unwrap(),
        format!("H1\n{}T1\n", positive)
    );
    assert_eq!(
        store.get("imports", "mastercard-refund/report.txt").unwrap(),
        format!("H1\n{}T1\n", negative)
    );

    // Plain mastercard leaves the source in place
    assert!(remote.exists(&format!("{}/report.txt", INBOX)));
}

#[tokio::test]
async fn test_mastercard_explicit_paths() {
    let (content, _, _) = report();
    let remote = MemoryRemote::new().with_file(&format!("{}/report.txt", INBOX), &content);
    let store = MemoryStore::new();

    let mut config = config("mastercard", Provider::Mastercard);
    config.settlement_path = Some("payments/settlement".to_string());
    config.refund_path = Some("payments/refund".to_string());

    orchestrator(config, &store)
        .run(&MemoryConnector::new(remote))
        .await
        .unwrap();

    assert_eq!(
        store.keys(),
        vec![
            "imports:payments/refund/report.txt",
            "imports:payments/settlement/report.txt"
        ]
    );
}

#[tokio::test]
async fn test_mastercard_deletion_flag_both_states() {
    let (content, _, _) = report();
    let path = format!("{}/report.txt", INBOX);

    // Leave
    let remote = MemoryRemote::new().with_file(&path, &content);
    let store = MemoryStore::new();
    let config_leave =
        config("mastercard", Provider::Mastercard).with_archive(ArchivePolicy::Leave);
    orchestrator(config_leave, &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();
    assert!(remote.exists(&path));

    // Delete, the mastercard_testing default
    let remote = MemoryRemote::new().with_file(&path, &content);
    let store = MemoryStore::new();
    let summary = orchestrator(config("mastercard", Provider::MastercardTesting), &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert!(!remote.exists(&path));
    assert_eq!(store.keys().len(), 2);

    // Delete, overridden onto plain mastercard
    let remote = MemoryRemote::new().with_file(&path, &content);
    let config_delete =
        config("mastercard", Provider::Mastercard).with_archive(ArchivePolicy::Delete);
    orchestrator(config_delete, &MemoryStore::new())
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();
    assert!(!remote.exists(&path));
}

#[tokio::test]
async fn test_wasabi_chunks_and_archives_source() {
    init_tracing();
    let csv = "id,amount\n1,10\n2,20\n3,30\n4,40\n5,50\n";
    let remote = MemoryRemote::new().with_file(&format!("{}/export.csv", INBOX), csv);
    let store = MemoryStore::new();

    let summary = orchestrator(config("wasabi", Provider::Wasabi).with_chunk_size(2), &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();

    assert_eq!(summary.objects_written, 3);
    assert_eq!(
        store.get("imports", "wasabi/export_chunk_0.csv").unwrap(),
        "id,amount\n1,10\n2,20\n"
    );
    assert_eq!(
        store.get("imports", "wasabi/export_chunk_1.csv").unwrap(),
        "id,amount\n3,30\n4,40\n"
    );
    assert_eq!(
        store.get("imports", "wasabi/export_chunk_2.csv").unwrap(),
        "id,amount\n5,50\n"
    );

    assert!(!remote.exists(&format!("{}/export.csv", INBOX)));
    assert_eq!(remote.content("archive/2024/03/07/export.csv").unwrap(), csv.as_bytes());
    assert!(remote.is_directory("archive/2024/03"));
    assert!(!remote.exists(&format!("{}/archive/2024/03/07/export.csv", INBOX)));
}

#[tokio::test]
async fn test_archive_to_absolute_root() {
    let remote = MemoryRemote::new().with_file(&format!("{}/a.csv", INBOX), "h\n1\n");
    let config = config("wasabi", Provider::Wasabi).with_archive(ArchivePolicy::Archive {
        root: "/processed".to_string(),
    });

    orchestrator(config, &MemoryStore::new())
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();

    assert!(remote.exists("/processed/2024/03/07/a.csv"));
}

#[tokio::test]
async fn test_format_error_does_not_abort_run() {
    let bad = format!("H1\n{}", mastercard_record("00000000ABCD"));
    let (good, _, _) = report();
    let remote = MemoryRemote::new()
        .with_file(&format!("{}/bad.txt", INBOX), &bad)
        .with_file(&format!("{}/good.txt", INBOX), &good);
    let store = MemoryStore::new();

    let summary = orchestrator(config("mastercard", Provider::MastercardTesting), &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();

    assert_eq!(summary.final_state, RunState::Done);
    assert_eq!(summary.listed, 2);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].filename, "bad.txt");
    assert_eq!(summary.failed[0].kind, "format");
    assert!(summary.failed[0].message.contains("line 2"));

    // The failed file is untouched and produced no output
    assert!(remote.exists(&format!("{}/bad.txt", INBOX)));
    assert!(store.get("imports", "mastercard-settlement/bad.txt").is_none());

    // The next file went through
    assert!(!remote.exists(&format!("{}/good.txt", INBOX)));
    assert!(store.get("imports", "mastercard-settlement/good.txt").is_some());
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() {
    let remote = MemoryRemote::new()
        .with_file(&format!("{}/locked.csv", INBOX), "x")
        .with_file(&format!("{}/open.csv", INBOX), "y")
        .with_unreadable(&format!("{}/locked.csv", INBOX));
    let store = MemoryStore::new();

    let summary = orchestrator(config("raw", Provider::None), &store)
        .run(&MemoryConnector::new(remote))
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed[0].kind, "remote");
    assert_eq!(store.keys(), vec!["imports:raw/open.csv"]);
}

#[tokio::test]
async fn test_write_failure_leaves_source_and_no_single_sided_output() {
    let (content, _, _) = report();
    let path = format!("{}/report.txt", INBOX);
    let remote = MemoryRemote::new().with_file(&path, &content);
    let store = MemoryStore::new();
    store.fail_puts_matching("mastercard-refund/");

    let summary = orchestrator(config("mastercard", Provider::MastercardTesting), &store)
        .run(&MemoryConnector::new(remote.clone()))
        .await
        .unwrap();

    assert_eq!(summary.final_state, RunState::Done);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed[0].kind, "write");

    // Settlement was written first and then compensated
    assert_eq!(store.put_count(), 1);
    assert!(store.keys().is_empty());

    // Source kept for the next run
    assert!(remote.exists(&path));
}

#[tokio::test]
async fn test_default_variant_is_idempotent() {
    let remote = MemoryRemote::new()
        .with_file(&format!("{}/a.bin", INBOX), [0u8, 1, 2, 255])
        .with_file(&format!("{}/b.txt", INBOX), "hello\n");
    let store = MemoryStore::new();
    let orchestrator = orchestrator(config("raw", Provider::None), &store);
    let connector = MemoryConnector::new(remote);

    let first = orchestrator.run(&connector).await.unwrap();
    let after_first = store.snapshot();
    let second = orchestrator.run(&connector).await.unwrap();

    assert_eq!(first.processed, 2);
    assert_eq!(second.processed, 2);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(store.snapshot(), after_first);
    assert_eq!(store.keys(), vec!["imports:raw/a.bin", "imports:raw/b.txt"]);
}

#[tokio::test]
async fn test_listing_order_is_preserved_and_subdirectories_skipped() {
    let remote = MemoryRemote::new()
        .with_file(&format!("{}/z.txt", INBOX), "z")
        .with_file(&format!("{}/a.txt", INBOX), "a")
        .with_file(&format!("{}/archive/2024/01/01/old.txt", INBOX), "old");
    let store = MemoryStore::new();

    let summary = orchestrator(config("raw", Provider::None), &store)
        .run(&MemoryConnector::new(remote))
        .await
        .unwrap();

    assert_eq!(summary.listed, 2);
    assert_eq!(store.put_order(), vec!["raw/z.txt", "raw/a.txt"]);
}

#[tokio::test]
async fn test_empty_inbox_completes() {
    let remote = MemoryRemote::new().with_directory(INBOX);
    let summary = orchestrator(config("raw", Provider::None), &MemoryStore::new())
        .run(&MemoryConnector::new(remote))
        .await
        .unwrap();

    assert_eq!(summary.listed, 0);
    assert_eq!(summary.final_state, RunState::Done);
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let err = orchestrator(config("raw", Provider::None), &MemoryStore::new())
        .run(&MemoryConnector::refusing())
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::Connection(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_missing_directory_is_fatal() {
    let remote = MemoryRemote::new().with_directory("/elsewhere");
    let err = orchestrator(config("raw", Provider::None), &MemoryStore::new())
        .run(&MemoryConnector::new(remote))
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::NotFound(_)));
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let remote = MemoryRemote::new().with_directory(INBOX).failing_listing();
    let result = orchestrator(config("raw", Provider::None), &MemoryStore::new())
        .run_session(&remote)
        .await;

    assert!(result.is_err());
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let store = MemoryStore::new();
    let sink = Arc::new(ObjectStoreSink::new(Arc::new(store)));
    let config = config("wasabi", Provider::Wasabi).with_chunk_size(0);

    assert!(matches!(
        IngestOrchestrator::new(config, sink),
        Err(CourierError::Config(_))
    ));
}
