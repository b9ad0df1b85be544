//! Single-request artifact upload
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_publisher::cancel::CancellationToken;
//! use mizuchi_publisher::config::{BackendConfig, Destination};
//! use mizuchi_publisher::progress::NoopProgressReporter;
//! use mizuchi_publisher::s3::S3Store;
//! use mizuchi_publisher::upload::{UploadOperation, UploadRequest};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = S3Store::new(&BackendConfig::default()).await;
//! let destination = Destination::new("releases").with_region("us-east-1");
//! let token = CancellationToken::new();
//!
//! let result = UploadOperation::new(&store)
//!     .run(
//!         &destination,
//!         &UploadRequest::new("dist/app-1.2.3.zip"),
//!         &token,
//!         Arc::new(NoopProgressReporter),
//!     )
//!     .await?;
//! println!("Uploaded to {}", result.location_url);
//! # Ok(())
//! # }
//! ```

use super::{ProgressBody, UploadError, UploadRequest, UploadResult, DEFAULT_CHUNK_SIZE};
use crate::cancel::CancellationToken;
use crate::config::Destination;
use crate::metrics::{self, UploadStatus};
use crate::progress::ProgressReporter;
use crate::s3::{abort_pair, BackendError, ObjectStore, PutObjectRequest};
use std::sync::Arc;
use std::time::Instant;

/// Uploads one file per call
///
/// There is no retry: each call issues at most one PutObject.
pub struct UploadOperation<'a> {
    store: &'a dyn ObjectStore,
    chunk_size: usize,
}

impl<'a> UploadOperation<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Bytes read per body chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upload `request` to `destination`
    ///
    /// The file is stat'ed and opened before anything touches the network.
    /// An abort callback is registered on `token` for the duration of the
    /// transfer; a cancelled token yields
    /// [`UploadError::TransferFailed`] with `cancelled: true`.
    #[tracing::instrument(
        name = "upload.put_object",
        skip_all,
        fields(
            file = %request.local_path.display(),
            s3.bucket = ?destination.bucket,
            s3.key = tracing::field::Empty,
            upload.bytes = tracing::field::Empty,
            http.content_type = tracing::field::Empty,
            upload.location = tracing::field::Empty
        )
    )]
    pub async fn run(
        &self,
        destination: &Destination,
        request: &UploadRequest,
        token: &CancellationToken,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<UploadResult, UploadError> {
        let prepared = request.open().await?;
        let bucket = destination.ensure_resolved()?;

        let key = destination.object_key(&prepared.file_name);
        let (acl, acl_defaulted) = destination.effective_acl();
        let size = prepared.size_bytes;

        let span = tracing::Span::current();
        span.record("s3.key", key.as_str());
        span.record("upload.bytes", size);
        span.record("http.content_type", prepared.content_type.as_str());

        if prepared.content_type_defaulted {
            tracing::debug!(
                file = %prepared.file_name,
                content_type = %prepared.content_type,
                "Unknown file extension, using default content type"
            );
        }
        if acl_defaulted {
            tracing::debug!(acl = %acl, "No ACL configured, using default");
        }

        let (handle, abort) = abort_pair();
        let registration = token.on_cancel(move || handle.abort());
        let start_time = Instant::now();

        let outcome = if abort.is_aborted() {
            Err(BackendError::Aborted)
        } else {
            let body = ProgressBody::new(
                prepared.file,
                self.chunk_size,
                prepared.file_name.clone(),
                size,
                reporter,
                abort.clone(),
            );

            self.store
                .put_object(
                    PutObjectRequest {
                        bucket: bucket.to_string(),
                        region: destination.region.clone(),
                        key: key.clone(),
                        body: Box::pin(body),
                        content_length: size,
                        content_type: prepared.content_type,
                        acl: acl.to_string(),
                        storage_class: destination.storage_class.clone(),
                    },
                    abort.clone(),
                )
                .await
        };

        drop(registration);
        let duration = start_time.elapsed();

        match outcome {
            Ok(outcome) => {
                metrics::record_upload(bucket, UploadStatus::Success, size, duration.as_secs_f64());
                span.record("upload.location", outcome.location.as_str());

                tracing::info!(
                    file = %prepared.file_name,
                    location = %outcome.location,
                    bytes = size,
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );

                Ok(UploadResult {
                    location_url: outcome.location,
                    key,
                    etag: outcome.etag,
                    bytes_sent: size,
                })
            }
            Err(source) => {
                let cancelled = abort.is_aborted() || matches!(source, BackendError::Aborted);
                let duration_secs = duration.as_secs_f64();

                if cancelled {
                    metrics::record_upload(bucket, UploadStatus::Cancelled, 0, duration_secs);
                    tracing::warn!(
                        file = %prepared.file_name,
                        duration_ms = duration.as_millis(),
                        "Upload cancelled"
                    );
                } else {
                    metrics::record_upload(bucket, UploadStatus::Failure, 0, duration_secs);
                    tracing::error!(
                        file = %prepared.file_name,
                        error = %source,
                        duration_ms = duration.as_millis(),
                        "Upload failed"
                    );
                }

                Err(UploadError::TransferFailed { cancelled, source })
            }
        }
    }
}
