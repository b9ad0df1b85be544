//! Upload module
//!
//! Streams one local file to the object store as a single PutObject,
//! reporting progress per chunk and aborting when the session's
//! cancellation token fires.

use crate::config::ConfigError;
use crate::s3::BackendError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;

mod body;
mod put_object;

pub use body::ProgressBody;
pub use put_object::UploadOperation;

/// Content type sent when the file extension is not recognized
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default number of bytes read per body chunk
pub const DEFAULT_CHUNK_SIZE: usize = 65536; // 64KB

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Cannot read {}: {source}", .path.display())]
    LocalFileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid destination: {0}")]
    InvalidDestination(#[from] ConfigError),

    #[error("Upload {}: {source}", transfer_outcome(.cancelled))]
    TransferFailed {
        /// `true` when the session was cancelled while this upload ran
        cancelled: bool,
        #[source]
        source: BackendError,
    },
}

fn transfer_outcome(cancelled: &bool) -> &'static str {
    if *cancelled {
        "cancelled"
    } else {
        "failed"
    }
}

impl UploadError {
    /// Whether the upload stopped because the session was cancelled
    ///
    /// Cancellation is expected and should not be reported as an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::TransferFailed { cancelled: true, .. })
    }

    fn unreadable(path: &Path, source: io::Error) -> Self {
        UploadError::LocalFileUnreadable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Upload result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Canonical location of the object as reported by the backend
    pub location_url: String,
    pub key: String,
    pub etag: Option<String>,
    pub bytes_sent: u64,
}

/// A file to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    /// Name to store the file under instead of its basename
    pub remote_name_override: Option<String>,
}

impl UploadRequest {
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_name_override: None,
        }
    }

    pub fn with_remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name_override = Some(name.into());
        self
    }

    /// Name the object is stored under
    pub fn file_name(&self) -> Option<String> {
        match &self.remote_name_override {
            Some(name) => Some(name.clone()),
            None => self
                .local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    /// Stat and open the file
    pub async fn open(&self) -> Result<PreparedUpload, UploadError> {
        let path = self.local_path.as_path();

        let file_name = self.file_name().ok_or_else(|| {
            UploadError::unreadable(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::unreadable(path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::unreadable(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let file = File::open(path)
            .await
            .map_err(|e| UploadError::unreadable(path, e))?;

        let (content_type, content_type_defaulted) = content_type_for(&file_name);

        Ok(PreparedUpload {
            file_name,
            size_bytes: metadata.len(),
            content_type,
            content_type_defaulted,
            file,
        })
    }
}

/// An opened file with the attributes derived for its upload
#[derive(Debug)]
pub struct PreparedUpload {
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    /// `true` when the extension was unknown and [`DEFAULT_CONTENT_TYPE`] is used
    pub content_type_defaulted: bool,
    pub file: File,
}

/// Content type for a file name and whether the default was used
pub fn content_type_for(file_name: &str) -> (String, bool) {
    match mime_guess::from_path(file_name).first() {
        Some(mime) => (mime.essence_str().to_string(), false),
        None => (DEFAULT_CONTENT_TYPE.to_string(), true),
    }
}
