//! Configuration module for Mizuchi Publisher
//!
//! Handles loading and parsing of YAML publish configuration with support for
//! environment variable expansion and validation, and resolution of the
//! destination before the first upload.

use crate::s3::{requires_path_style, BackendError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;
mod resolver;

pub use loader::ConfigLoader;
pub use resolver::ConfigResolver;

/// Access control applied when the destination does not set one
pub const DEFAULT_ACL: &str = "public-read";

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn ensure_not_blank(field: &str, value: &Option<String>) -> Result<(), ConfigError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(ConfigError::ValidationError(format!(
            "'{}' is set but empty",
            field
        ))),
        _ => Ok(()),
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Please specify \"bucket\" for the S3 destination")]
    MissingBucket,

    #[error("Failed to look up region of bucket '{bucket}': {source}")]
    RegionLookupFailed {
        bucket: String,
        #[source]
        source: BackendError,
    },

    #[error("Region of bucket '{bucket}' is not resolved")]
    UnresolvedRegion { bucket: String },

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub destination: Destination,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    ///
    /// A missing bucket is not a validation error here; it is reported as
    /// [`ConfigError::MissingBucket`] when the destination is resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_not_blank("destination.region", &self.destination.region)?;
        ensure_not_blank("destination.acl", &self.destination.acl)?;
        ensure_not_blank("destination.storage_class", &self.destination.storage_class)?;
        ensure_not_blank("backend.region", &self.backend.region)?;

        if let Some(ref endpoint) = self.backend.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        match (&self.backend.access_key, &self.backend.secret_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "Both access_key and secret_key must be provided, or neither".into(),
                ))
            }
            _ => {}
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.chunk_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Where artifacts are published
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Key prefix; objects are stored under `<path_prefix>/<file name>`
    #[serde(default, alias = "path")]
    pub path_prefix: Option<String>,
    /// Canned ACL. Default: `public-read`
    #[serde(default)]
    pub acl: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

impl Destination {
    /// Destination for a bucket with every other field unset
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(path_prefix.into());
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn with_storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.storage_class = Some(storage_class.into());
        self
    }

    /// The configured bucket, or [`ConfigError::MissingBucket`]
    pub fn bucket(&self) -> Result<&str, ConfigError> {
        match self.bucket.as_deref() {
            Some(bucket) if !bucket.is_empty() => Ok(bucket),
            _ => Err(ConfigError::MissingBucket),
        }
    }

    /// Whether the bucket needs path-style addressing
    pub fn requires_path_style(&self) -> bool {
        self.bucket.as_deref().is_some_and(requires_path_style)
    }

    /// Whether resolution still has to look up the region
    pub fn needs_region_lookup(&self) -> bool {
        self.region.is_none() && self.requires_path_style()
    }

    /// Check the invariants an upload relies on
    pub fn ensure_resolved(&self) -> Result<&str, ConfigError> {
        let bucket = self.bucket()?;
        if self.needs_region_lookup() {
            return Err(ConfigError::UnresolvedRegion {
                bucket: bucket.to_string(),
            });
        }
        Ok(bucket)
    }

    /// Object key for a file name
    pub fn object_key(&self, file_name: &str) -> String {
        match self.path_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, file_name),
            _ => file_name.to_string(),
        }
    }

    /// The ACL to send and whether it is the default
    pub fn effective_acl(&self) -> (&str, bool) {
        match self.acl.as_deref() {
            Some(acl) => (acl, false),
            None => (DEFAULT_ACL, true),
        }
    }
}

/// Connection settings for the object store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// S3-compatible endpoint (e.g. MinIO); implies path-style addressing
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Region for requests that do not target a resolved bucket region.
    /// Default: taken from the AWS environment, else `us-east-1`
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Bytes read from disk per body chunk, and so per progress update
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    crate::upload::DEFAULT_CHUNK_SIZE
}

/// Progress display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_progress_enabled")]
    pub enabled: bool,
    #[serde(default = "default_progress_interval")]
    pub interval_millis: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_progress_enabled(),
            interval_millis: default_progress_interval(),
        }
    }
}

fn default_progress_enabled() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    500
}
