//! Shared helpers for publisher integration tests
//!
//! `FakeStore` is an in-memory [`ObjectStore`] that drains upload bodies the
//! way a real transport would. It can hold an upload after its first chunk so
//! tests can cancel while the transfer is in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use mizuchi_publisher::progress::{ProgressReporter, TransferProgress};
use mizuchi_publisher::s3::{
    object_url, AbortSignal, BackendError, ObjectStore, PutObjectOutcome, PutObjectRequest,
    DEFAULT_REGION,
};
use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const ETAG: &str = "\"9b2cf535f27731c974343645a3985328\"";

/// How `FakeStore::put_object` treats the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutBehavior {
    /// Read the whole body and succeed
    Complete,
    /// Read the whole body, then reject the request with `AccessDenied`
    Reject,
    /// Read one chunk, then wait for the abort signal and return `Aborted`
    HoldUntilAborted,
    /// Read one chunk, wait for the abort signal, then keep pulling the body
    /// as a transport that ignores aborts would
    HoldThenDrain,
}

/// A PutObject the store has seen
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub bucket: String,
    pub region: Option<String>,
    pub key: String,
    pub content_length: u64,
    pub content_type: String,
    pub acl: String,
    pub storage_class: Option<String>,
    pub body: Vec<u8>,
}

pub struct FakeStore {
    region: Result<String, String>,
    behavior: PutBehavior,
    region_lookups: AtomicUsize,
    puts: Mutex<Vec<RecordedPut>>,
    held: Semaphore,
}

impl FakeStore {
    pub fn new(region: &str) -> Self {
        Self {
            region: Ok(region.to_string()),
            behavior: PutBehavior::Complete,
            region_lookups: AtomicUsize::new(0),
            puts: Mutex::new(Vec::new()),
            held: Semaphore::new(0),
        }
    }

    /// A store whose region lookups fail with `code`
    pub fn failing_lookup(code: &str) -> Self {
        Self {
            region: Err(code.to_string()),
            ..Self::new(DEFAULT_REGION)
        }
    }

    pub fn with_behavior(mut self, behavior: PutBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn region_lookups(&self) -> usize {
        self.region_lookups.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().clone()
    }

    /// Wait until `count` uploads are held after their first chunk
    pub async fn wait_for_held(&self, count: u32) {
        self.held
            .acquire_many(count)
            .await
            .expect("semaphore closed")
            .forget();
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn bucket_region(&self, _bucket: &str) -> Result<String, BackendError> {
        self.region_lookups.fetch_add(1, Ordering::SeqCst);
        self.region.clone().map_err(|code| BackendError::Service {
            operation: "GetBucketLocation",
            code: Some(code.clone()),
            message: code,
        })
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        mut abort: AbortSignal,
    ) -> Result<PutObjectOutcome, BackendError> {
        let PutObjectRequest {
            bucket,
            region,
            key,
            mut body,
            content_length,
            content_type,
            acl,
            storage_class,
        } = request;
        let mut received = Vec::new();

        match self.behavior {
            PutBehavior::Complete | PutBehavior::Reject => {}
            PutBehavior::HoldUntilAborted | PutBehavior::HoldThenDrain => {
                if let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(|e| BackendError::Transport(e.to_string()))?;
                    received.extend_from_slice(&chunk);
                }
                self.held.add_permits(1);
                abort.aborted().await;

                if self.behavior == PutBehavior::HoldUntilAborted {
                    return Err(BackendError::Aborted);
                }
            }
        }

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| BackendError::Transport(e.to_string()))?;
            received.extend_from_slice(&chunk);
            tokio::task::yield_now().await;
        }

        if self.behavior == PutBehavior::Reject {
            return Err(BackendError::Service {
                operation: "PutObject",
                code: Some("AccessDenied".into()),
                message: "Access Denied".into(),
            });
        }

        let location = object_url(
            None,
            &bucket,
            region.as_deref().unwrap_or(DEFAULT_REGION),
            &key,
        );
        self.puts.lock().push(RecordedPut {
            bucket,
            region,
            key,
            content_length,
            content_type,
            acl,
            storage_class,
            body: received,
        });

        Ok(PutObjectOutcome {
            location,
            etag: Some(ETAG.to_string()),
        })
    }
}

/// Reporter that keeps every event
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(String, TransferProgress)>>,
}

impl RecordingReporter {
    pub fn events_for(&self, file_name: &str) -> Vec<TransferProgress> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == file_name)
            .map(|(_, progress)| *progress)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_progress(&self, file_name: &str, progress: TransferProgress) {
        self.events.lock().push((file_name.to_string(), progress));
    }
}

/// Deterministic file content
pub fn artifact_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `content` to `name` inside `dir`
pub fn write_artifact(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create artifact");
    file.write_all(content).expect("write artifact");
    path
}

pub fn assert_non_decreasing(events: &[TransferProgress]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].bytes_sent <= pair[1].bytes_sent,
            "progress went backwards: {:?}",
            pair
        );
    }
}

pub fn missing_path(dir: &TempDir) -> PathBuf {
    dir.path().join("does-not-exist.zip")
}
