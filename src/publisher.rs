//! S3 artifact publisher
//!
//! Entry point for publishing release artifacts. The destination is resolved
//! once when the publisher is created; a configuration failure prevents any
//! upload. Every upload shares the session's cancellation token.
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_publisher::cancel::CancellationToken;
//! use mizuchi_publisher::config::{BackendConfig, Destination};
//! use mizuchi_publisher::progress::NoopProgressReporter;
//! use mizuchi_publisher::publisher::{PublishContext, S3Publisher};
//! use mizuchi_publisher::s3::S3Store;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(S3Store::new(&BackendConfig::default()).await);
//! let context = PublishContext::new(CancellationToken::new(), Arc::new(NoopProgressReporter));
//!
//! let publisher = S3Publisher::new(Destination::new("my.release.bucket"), store, context).await?;
//! let result = publisher.upload("dist/app-1.2.3.zip", None).await?;
//! println!("{} -> {}", publisher, result.location_url);
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationToken;
use crate::config::{ConfigError, ConfigResolver, Destination};
use crate::progress::ProgressReporter;
use crate::s3::ObjectStore;
use crate::upload::{
    UploadError, UploadOperation, UploadRequest, UploadResult, DEFAULT_CHUNK_SIZE,
};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// State shared by every upload of one publish session
#[derive(Clone)]
pub struct PublishContext {
    pub cancellation_token: CancellationToken,
    pub progress: Arc<dyn ProgressReporter>,
}

impl PublishContext {
    pub fn new(cancellation_token: CancellationToken, progress: Arc<dyn ProgressReporter>) -> Self {
        Self {
            cancellation_token,
            progress,
        }
    }
}

impl fmt::Debug for PublishContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishContext")
            .field("cancellation_token", &self.cancellation_token)
            .finish_non_exhaustive()
    }
}

/// Publishes artifacts to one S3 destination
pub struct S3Publisher {
    destination: Destination,
    store: Arc<dyn ObjectStore>,
    context: PublishContext,
    chunk_size: usize,
}

impl S3Publisher {
    pub const PROVIDER_NAME: &'static str = "S3";

    /// Resolve `destination` in place
    ///
    /// Fails with [`ConfigError::MissingBucket`] before any network call when
    /// the bucket is not set; looks up the region of dotted buckets.
    pub async fn check_and_resolve_options(
        destination: &mut Destination,
        store: &dyn ObjectStore,
    ) -> Result<(), ConfigError> {
        let resolved = ConfigResolver::new(store)
            .resolve(destination.clone())
            .await?;
        *destination = resolved;
        Ok(())
    }

    /// Resolve the destination and create the publisher
    pub async fn new(
        mut destination: Destination,
        store: Arc<dyn ObjectStore>,
        context: PublishContext,
    ) -> Result<Self, ConfigError> {
        Self::check_and_resolve_options(&mut destination, store.as_ref()).await?;

        let (acl, acl_defaulted) = destination.effective_acl();
        if acl_defaulted {
            tracing::info!(acl = %acl, "No ACL configured for destination, defaulting");
        }
        tracing::debug!(
            bucket = ?destination.bucket,
            region = ?destination.region,
            path_prefix = ?destination.path_prefix,
            "Creating S3 publisher"
        );

        Ok(Self {
            destination,
            store,
            context,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Bytes read per body chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn provider_name(&self) -> &'static str {
        Self::PROVIDER_NAME
    }

    /// The resolved destination
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.context.cancellation_token
    }

    /// Upload a file, optionally under another name
    pub async fn upload(
        &self,
        file: impl AsRef<Path>,
        remote_name: Option<&str>,
    ) -> Result<UploadResult, UploadError> {
        let mut request = UploadRequest::new(file.as_ref());
        if let Some(name) = remote_name {
            request = request.with_remote_name(name);
        }

        UploadOperation::new(self.store.as_ref())
            .with_chunk_size(self.chunk_size)
            .run(
                &self.destination,
                &request,
                &self.context.cancellation_token,
                self.context.progress.clone(),
            )
            .await
    }

    /// Human-readable name of the destination
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for S3Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (bucket: {})",
            Self::PROVIDER_NAME,
            self.destination.bucket.as_deref().unwrap_or_default()
        )
    }
}

impl fmt::Debug for S3Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Publisher")
            .field("destination", &self.destination)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
