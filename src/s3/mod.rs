//! S3 backend module
//!
//! The publisher talks to object storage through the [`ObjectStore`] trait,
//! which exposes exactly what publishing needs: a bucket region lookup and a
//! single streaming PutObject that can be aborted while in flight.
//! [`S3Store`] implements it on the AWS SDK.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | GetBucketLocation | `s3.get_bucket_location` | bucket, region |
//! | PutObject | `s3.put_object` | bucket, key, upload.bytes, content_type, storage_class, s3.etag |

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::io;
use std::pin::Pin;
use thiserror::Error;

mod abort;
mod client;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use client::{object_url, S3Store, DEFAULT_REGION};

/// Whether a bucket must be addressed path-style
///
/// Dotted names break virtual-hosted-style TLS, and path-style endpoints need
/// the bucket's region.
pub fn requires_path_style(bucket: &str) -> bool {
    bucket.contains('.')
}

/// Streaming request body
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync + 'static>>;

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request aborted")]
    Aborted,

    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Error code reported by the service, if any (e.g. `NoSuchBucket`)
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// A single PutObject call
pub struct PutObjectRequest {
    pub bucket: String,
    /// Region the bucket lives in; `None` uses the store's default region
    pub region: Option<String>,
    pub key: String,
    pub body: BodyStream,
    pub content_length: u64,
    pub content_type: String,
    pub acl: String,
    pub storage_class: Option<String>,
}

impl fmt::Debug for PutObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutObjectRequest")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("key", &self.key)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("acl", &self.acl)
            .field("storage_class", &self.storage_class)
            .finish_non_exhaustive()
    }
}

/// Result of a successful PutObject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutcome {
    /// Canonical URL of the stored object
    pub location: String,
    pub etag: Option<String>,
}

/// Object storage operations used by the publisher
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Look up the region a bucket lives in
    async fn bucket_region(&self, bucket: &str) -> Result<String, BackendError>;

    /// Upload one object from a stream
    ///
    /// Implementations must stop the request and return
    /// [`BackendError::Aborted`] once `abort` fires.
    async fn put_object(
        &self,
        request: PutObjectRequest,
        abort: AbortSignal,
    ) -> Result<PutObjectOutcome, BackendError>;
}
