mod common;

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use receipt_watch::{
    ChangeEvent, DirectoryWatcher, Dispatcher, PublicId, ReceiptFilter, TagOutcome, WatchBatch, WatchKey,
    WatchPoll,
};
use common::{collect_batches, saw_created, Call, CallLog, Fakes};

#[test]
fn test_spool_job_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut watcher = DirectoryWatcher::new(temp_dir.path(), false).expect("Failed to create watcher");

    fs::write(temp_dir.path().join("d_job17.ps"), "%!PS-Adobe-3.0").expect("Failed to write job");

    let batches = collect_batches(&mut watcher, Duration::from_secs(5), |b| saw_created(b, "d_job17.ps"));
    assert!(saw_created(&batches, "d_job17.ps"), "no creation event for the job");

    let log = CallLog::default();
    let mut dispatcher = Dispatcher::new(ReceiptFilter::new(), Fakes::default().pipeline(&log));

    let mut outcomes = Vec::new();
    for batch in batches {
        outcomes.extend(dispatcher.dispatch(batch).expect("dispatch should succeed"));
    }

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    let public_id = outcome.public_id.to_string();
    assert!(public_id.starts_with("receipt_42_"));
    assert!(public_id.parse::<PublicId>().is_ok());
    assert_eq!(outcome.receipt.id, 1001);
    assert!(matches!(outcome.tag, TagOutcome::Written(_)));

    let job = watcher.root().join("d_job17.ps");
    assert_eq!(
        log.calls(),
        vec![
            Call::Counter,
            Call::Upload {
                file: job,
                public_id: public_id.clone(),
            },
            Call::Insert(public_id),
            Call::Tag([0x00, 0x00, 0x03, 0xE9]),
        ]
    );
}

#[test]
fn test_non_receipt_files_are_ignored() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut watcher = DirectoryWatcher::new(temp_dir.path(), false).expect("Failed to create watcher");

    fs::write(temp_dir.path().join("Report.pdf"), "pdf").expect("Failed to write file");
    fs::write(temp_dir.path().join("c00017"), "control").expect("Failed to write file");

    let batches = collect_batches(&mut watcher, Duration::from_secs(5), |b| {
        saw_created(b, "Report.pdf") && saw_created(b, "c00017")
    });

    let log = CallLog::default();
    let mut dispatcher = Dispatcher::new(ReceiptFilter::new(), Fakes::default().pipeline(&log));
    for batch in batches {
        dispatcher.dispatch(batch).expect("dispatch should succeed");
    }

    assert!(log.calls().is_empty());
}

#[test]
fn test_recursive_watch_picks_up_new_subdirectory() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut watcher = DirectoryWatcher::new(temp_dir.path(), true).expect("Failed to create watcher");
    assert_eq!(watcher.registry().len(), 1);

    let nested = watcher.root().join("printer2");
    fs::create_dir(&nested).expect("Failed to create subdirectory");

    collect_batches(&mut watcher, Duration::from_secs(5), |b| saw_created(b, "printer2"));
    assert!(watcher.registry().key_for(&nested).is_some(), "new subdirectory was not registered");

    fs::write(nested.join("D_late.ps"), "job").expect("Failed to write job");
    let batches = collect_batches(&mut watcher, Duration::from_secs(5), |b| saw_created(b, "D_late.ps"));

    let batch = batches
        .iter()
        .find(|batch| batch.events.iter().any(|e| e.file_name() == Some("D_late.ps")))
        .expect("no batch for the nested job");
    assert_eq!(batch.dir, nested);
}

#[test]
fn test_removed_directory_closes_watch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let spool = temp_dir.path().join("spool");
    fs::create_dir(&spool).expect("Failed to create spool");

    let mut watcher = DirectoryWatcher::new(&spool, false).expect("Failed to create watcher");
    fs::remove_dir(&spool).expect("Failed to remove spool");

    let mut closed = false;
    for _ in 0..100 {
        if let WatchPoll::Closed = watcher.poll(Duration::from_millis(50)) {
            closed = true;
            break;
        }
    }

    assert!(closed, "watch should end once its only directory is gone");
    assert!(watcher.registry().is_empty());
}

#[test]
fn test_recreated_directory_still_closes_watch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let spool = temp_dir.path().join("spool");
    fs::create_dir(&spool).expect("Failed to create spool");

    let mut watcher = DirectoryWatcher::new(&spool, false).expect("Failed to create watcher");
    fs::remove_dir(&spool).expect("Failed to remove spool");
    fs::create_dir(&spool).expect("Failed to recreate spool");

    let mut closed = false;
    for _ in 0..100 {
        if let WatchPoll::Closed = watcher.poll(Duration::from_millis(50)) {
            closed = true;
            break;
        }
    }

    // The old watch handle is gone; the new directory is a different inode
    assert!(closed, "watch on a removed directory should end even if the path returns");
    assert!(watcher.registry().is_empty());
}

#[test]
fn test_batch_inserts_once_per_file_in_order() {
    let log = CallLog::default();
    let mut dispatcher = Dispatcher::new(ReceiptFilter::new(), Fakes::default().pipeline(&log));

    let batch = WatchBatch::new(WatchKey::new(1), "/spool").with_events(vec![
        ChangeEvent::created("/spool/d1.ps"),
        ChangeEvent::overflow("/spool"),
        ChangeEvent::created("/spool/Da.ps"),
        ChangeEvent::modified("/spool/d1.ps"),
        ChangeEvent::created("/spool/dz.ps"),
    ]);

    let outcomes = dispatcher.dispatch(batch).expect("dispatch should succeed");

    let paths: Vec<_> = outcomes.iter().map(|o| o.path.display().to_string()).collect();
    assert_eq!(paths, vec!["/spool/d1.ps", "/spool/Da.ps", "/spool/dz.ps"]);

    let inserts = log.inserts();
    assert_eq!(inserts.len(), 3);
    let expected: Vec<String> = outcomes.iter().map(|o| o.public_id.to_string()).collect();
    assert_eq!(inserts, expected);

    // No stage of one file interleaves with another
    let kinds: Vec<&str> = log
        .calls()
        .iter()
        .map(|call| match call {
            Call::Counter => "counter",
            Call::Upload { .. } => "upload",
            Call::Insert(_) => "insert",
            Call::Tag(_) => "tag",
        })
        .collect();
    assert_eq!(kinds, ["counter", "upload", "insert", "tag"].repeat(3));
}

#[test]
fn test_upload_failure_keeps_public_id_for_insert() {
    let log = CallLog::default();
    let fakes = Fakes {
        fail_upload: true,
        ..Default::default()
    };
    let mut dispatcher = Dispatcher::new(ReceiptFilter::new(), fakes.pipeline(&log));

    let batch = WatchBatch::new(WatchKey::new(1), "/spool").with_events(vec![ChangeEvent::created("/spool/d_job17.ps")]);
    let outcomes = dispatcher.dispatch(batch).expect("upload failure is tolerated");

    assert!(!outcomes[0].uploaded);
    let uploaded_as = log.calls().into_iter().find_map(|call| match call {
        Call::Upload { public_id, .. } => Some(public_id),
        _ => None,
    });
    assert_eq!(uploaded_as, log.inserts().first().cloned());
}

#[test]
fn test_insert_failure_prevents_tag_write() {
    let log = CallLog::default();
    let fakes = Fakes {
        fail_insert: true,
        ..Default::default()
    };
    let mut dispatcher = Dispatcher::new(ReceiptFilter::new(), fakes.pipeline(&log));

    let batch = WatchBatch::new(WatchKey::new(1), "/spool").with_events(vec![ChangeEvent::created("/spool/d_job17.ps")]);
    let result = dispatcher.dispatch(batch);

    assert!(result.is_err());
    assert!(!log.calls().iter().any(|call| matches!(call, Call::Tag(_))));
}
