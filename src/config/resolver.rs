//! Destination resolution
//!
//! Runs once before any upload. Buckets with dotted names are addressed
//! path-style, and path-style endpoints need the bucket's region, so an
//! unset region is looked up from the backend.

use super::{ConfigError, Destination};
use crate::metrics;
use crate::s3::ObjectStore;

/// Fills in the fields a destination needs before uploading
pub struct ConfigResolver<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Resolve a destination
    ///
    /// Fails with [`ConfigError::MissingBucket`] before any network call when
    /// no bucket is set. Issues at most one region lookup, and none for a
    /// destination that is already resolved. Lookup failures are not retried.
    #[tracing::instrument(
        name = "config.resolve",
        skip(self, destination),
        fields(
            s3.bucket = ?destination.bucket,
            s3.region = tracing::field::Empty
        ),
        err
    )]
    pub async fn resolve(&self, mut destination: Destination) -> Result<Destination, ConfigError> {
        let bucket = destination.bucket()?.to_string();

        if destination.needs_region_lookup() {
            tracing::debug!("Dotted bucket name without region, looking up bucket location");

            match self.store.bucket_region(&bucket).await {
                Ok(region) => {
                    metrics::record_region_lookup(true);
                    tracing::info!(bucket = %bucket, region = %region, "Resolved bucket region");
                    destination.region = Some(region);
                }
                Err(source) => {
                    metrics::record_region_lookup(false);
                    return Err(ConfigError::RegionLookupFailed { bucket, source });
                }
            }
        }

        if let Some(region) = destination.region.as_deref() {
            tracing::Span::current().record("s3.region", region);
        }

        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::{AbortSignal, BackendError, PutObjectOutcome, PutObjectRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that answers region lookups and counts them
    struct RegionOnlyStore {
        region: Option<&'static str>,
        lookups: AtomicUsize,
    }

    impl RegionOnlyStore {
        fn answering(region: &'static str) -> Self {
            Self {
                region: Some(region),
                lookups: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                region: None,
                lookups: AtomicUsize::new(0),
            }
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for RegionOnlyStore {
        async fn bucket_region(&self, _bucket: &str) -> Result<String, BackendError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            match self.region {
                Some(region) => Ok(region.to_string()),
                None => Err(BackendError::Service {
                    operation: "GetBucketLocation",
                    code: Some("NoSuchBucket".into()),
                    message: "The specified bucket does not exist".into(),
                }),
            }
        }

        async fn put_object(
            &self,
            _request: PutObjectRequest,
            _abort: AbortSignal,
        ) -> Result<PutObjectOutcome, BackendError> {
            unreachable!("resolution never uploads")
        }
    }

    #[tokio::test]
    async fn test_dotted_bucket_resolves_region() {
        let store = RegionOnlyStore::answering("us-west-2");
        let resolved = ConfigResolver::new(&store)
            .resolve(Destination::new("my.release.bucket"))
            .await
            .unwrap();

        assert_eq!(resolved.region.as_deref(), Some("us-west-2"));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_plain_bucket_skips_lookup() {
        let store = RegionOnlyStore::answering("us-west-2");
        let resolved = ConfigResolver::new(&store)
            .resolve(Destination::new("releases"))
            .await
            .unwrap();

        assert_eq!(resolved.region, None);
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolving_twice_looks_up_once() {
        let store = RegionOnlyStore::answering("eu-west-1");
        let resolver = ConfigResolver::new(&store);

        let once = resolver
            .resolve(Destination::new("my.release.bucket"))
            .await
            .unwrap();
        let twice = resolver.resolve(once.clone()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_missing_bucket_fails_without_lookup() {
        let store = RegionOnlyStore::answering("us-west-2");
        let result = ConfigResolver::new(&store)
            .resolve(Destination::default())
            .await;

        assert!(matches!(result, Err(ConfigError::MissingBucket)));
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_wrapped() {
        let store = RegionOnlyStore::failing();
        let result = ConfigResolver::new(&store)
            .resolve(Destination::new("my.release.bucket"))
            .await;

        match result {
            Err(ConfigError::RegionLookupFailed { bucket, source }) => {
                assert_eq!(bucket, "my.release.bucket");
                assert_eq!(source.code(), Some("NoSuchBucket"));
            }
            other => panic!("expected RegionLookupFailed, got {:?}", other),
        }
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_other_fields_are_untouched() {
        let store = RegionOnlyStore::answering("us-west-2");
        let destination = Destination::new("my.release.bucket")
            .with_path_prefix("desktop")
            .with_acl("private")
            .with_storage_class("STANDARD_IA");

        let resolved = ConfigResolver::new(&store)
            .resolve(destination.clone())
            .await
            .unwrap();

        assert_eq!(
            resolved,
            Destination {
                region: Some("us-west-2".into()),
                ..destination
            }
        );
    }
}
