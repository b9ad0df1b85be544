//! Mizuchi Publisher Library
//!
//! Cancellable, progress-observable publishing of release artifacts to S3.
//!
//! # Features
//!
//! - **Single Request**: One PutObject per artifact, with content type, ACL
//!   and storage class metadata
//! - **Cancellable**: Uploads of a publish session share a cancellation token;
//!   cancelling it aborts every in-flight transfer
//! - **Progress**: Per-chunk progress events, rendered off the transfer path
//! - **Dotted Buckets**: The region of path-style buckets is resolved before
//!   the first upload
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_publisher::{Config, PublishContext, S3Publisher, S3Store};
//! use mizuchi_publisher::cancel::CancellationToken;
//! use mizuchi_publisher::progress::NoopProgressReporter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("publish.yaml")?;
//!     let store = Arc::new(S3Store::new(&config.backend).await);
//!     let context = PublishContext::new(CancellationToken::new(), Arc::new(NoopProgressReporter));
//!
//!     let publisher = S3Publisher::new(config.destination, store, context).await?;
//!     publisher.upload("dist/app-1.2.3.zip", None).await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod metrics;
pub mod progress;
pub mod publisher;
pub mod s3;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, Destination};
pub use publisher::{PublishContext, S3Publisher};
pub use s3::S3Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
