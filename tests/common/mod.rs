#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};
use receipt_watch::api::{BackendError, Receipt, ReceiptBackend};
use receipt_watch::cloud::{UploadError, Uploader};
use receipt_watch::tag::{ReceiptTag, TagError, TagWriter};
use receipt_watch::{DirectoryWatcher, PublicId, ReceiptPipeline, WatchBatch, WatchPoll};

/// Every collaborator call, in the order the pipeline made them.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Counter,
    Upload { file: PathBuf, public_id: String },
    Insert(String),
    Tag([u8; 4]),
}

#[derive(Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn inserts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Insert(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

pub struct FakeBackend {
    pub log: CallLog,
    pub counter: u64,
    pub first_receipt_id: i64,
    pub fail_insert: bool,
}

impl ReceiptBackend for FakeBackend {
    fn next_auto_increment(&mut self) -> Result<u64, BackendError> {
        self.log.push(Call::Counter);
        Ok(self.counter)
    }

    fn insert_receipt(&mut self, public_id: &PublicId) -> Result<Receipt, BackendError> {
        self.log.push(Call::Insert(public_id.to_string()));
        if self.fail_insert {
            return Err(BackendError::Status {
                endpoint: "/api/receipt-app/receipt".to_string(),
                status: 500,
            });
        }
        let id = self.first_receipt_id;
        self.first_receipt_id += 1;
        self.counter += 1;
        Ok(Receipt::new(id, public_id.to_string()))
    }
}

pub struct FakeUploader {
    pub log: CallLog,
    pub fail: bool,
}

impl Uploader for FakeUploader {
    fn upload(&mut self, file: &Path, public_id: &PublicId) -> Result<(), UploadError> {
        self.log.push(Call::Upload {
            file: file.to_path_buf(),
            public_id: public_id.to_string(),
        });
        if self.fail {
            return Err(UploadError::Io {
                path: file.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated upload failure"),
            });
        }
        Ok(())
    }
}

pub struct FakeTagWriter {
    pub log: CallLog,
}

impl TagWriter for FakeTagWriter {
    fn write(&mut self, tag: &ReceiptTag) -> Result<(), TagError> {
        self.log.push(Call::Tag(tag.to_bytes()));
        Ok(())
    }
}

pub struct Fakes {
    pub counter: u64,
    pub first_receipt_id: i64,
    pub fail_upload: bool,
    pub fail_insert: bool,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            counter: 42,
            first_receipt_id: 1001,
            fail_upload: false,
            fail_insert: false,
        }
    }
}

impl Fakes {
    pub fn pipeline(&self, log: &CallLog) -> ReceiptPipeline {
        ReceiptPipeline::new(
            Box::new(FakeBackend {
                log: log.clone(),
                counter: self.counter,
                first_receipt_id: self.first_receipt_id,
                fail_insert: self.fail_insert,
            }),
            Box::new(FakeUploader {
                log: log.clone(),
                fail: self.fail_upload,
            }),
        )
        .with_tag_writer(Box::new(FakeTagWriter { log: log.clone() }))
    }
}

/// Polls until `done` holds for everything collected so far, or the timeout passes.
pub fn collect_batches<F>(watcher: &mut DirectoryWatcher, timeout: Duration, done: F) -> Vec<WatchBatch>
where
    F: Fn(&[WatchBatch]) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut batches = Vec::new();

    while Instant::now() < deadline && !done(&batches) {
        match watcher.poll(Duration::from_millis(50)) {
            WatchPoll::Batches(mut polled) => batches.append(&mut polled),
            WatchPoll::Idle => continue,
            WatchPoll::Closed => break,
        }
    }
    batches
}

pub fn saw_created(batches: &[WatchBatch], name: &str) -> bool {
    batches
        .iter()
        .flat_map(|batch| batch.events.iter())
        .any(|event| event.kind == receipt_watch::ChangeKind::Created && event.file_name() == Some(name))
}
