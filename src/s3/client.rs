//! AWS SDK backed object store

use super::{
    requires_path_style, AbortSignal, BackendError, ObjectStore, PutObjectOutcome,
    PutObjectRequest,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, StorageClass};
use aws_sdk_s3::Client;
use futures::TryStreamExt;
use http_body_util::StreamBody;
use hyper::body::Frame;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

/// Region used when neither the request nor the environment names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Characters left as-is in a key segment of an object URL
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Object store on top of `aws-sdk-s3`
///
/// One SDK configuration is loaded up front; a client is derived from it per
/// call so each request can target the bucket's own region and addressing
/// style. Retries are disabled: a failed upload is reported to the caller.
#[derive(Debug)]
pub struct S3Store {
    sdk_config: aws_config::SdkConfig,
    endpoint: Option<String>,
    force_path_style: bool,
}

impl S3Store {
    /// Load the SDK configuration
    ///
    /// Uses the static keys from `config` when present, otherwise the default
    /// AWS credential chain. The default region is the configured one, else
    /// the one from the AWS environment, else `us-east-1`.
    pub async fn new(config: &BackendConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        loader = match &config.region {
            Some(region) => loader.region(Region::new(region.clone())),
            None => loader.region(
                RegionProviderChain::default_provider().or_else(Region::new(DEFAULT_REGION)),
            ),
        };

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                config.session_token.clone(),
                None,
                "mizuchi-publisher",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::debug!(
            endpoint = ?config.endpoint,
            region = ?sdk_config.region(),
            "Loaded S3 configuration"
        );

        Self {
            sdk_config,
            endpoint: config.endpoint.clone(),
            force_path_style: config.force_path_style,
        }
    }

    /// Region used for requests that do not name one
    pub fn default_region(&self) -> &str {
        self.sdk_config
            .region()
            .map(|region| region.as_ref())
            .unwrap_or(DEFAULT_REGION)
    }

    fn client(&self, region: Option<&str>, path_style: bool) -> Client {
        let mut builder = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .retry_config(RetryConfig::disabled())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .force_path_style(path_style || self.force_path_style || self.endpoint.is_some());

        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Client::from_conf(builder.build())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(
        name = "s3.get_bucket_location",
        skip(self),
        fields(s3.bucket = %bucket, s3.region = tracing::field::Empty),
        err
    )]
    async fn bucket_region(&self, bucket: &str) -> Result<String, BackendError> {
        let output = self
            .client(None, requires_path_style(bucket))
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketLocation", e))?;

        let region =
            normalize_location_constraint(output.location_constraint().map(|c| c.as_str()));
        tracing::Span::current().record("s3.region", region.as_str());

        Ok(region)
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, request, abort),
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            upload.bytes = request.content_length,
            http.content_type = %request.content_type,
            s3.storage_class = ?request.storage_class,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put_object(
        &self,
        request: PutObjectRequest,
        mut abort: AbortSignal,
    ) -> Result<PutObjectOutcome, BackendError> {
        let PutObjectRequest {
            bucket,
            region,
            key,
            body,
            content_length,
            content_type,
            acl,
            storage_class,
        } = request;

        let content_length = i64::try_from(content_length).map_err(|_| {
            BackendError::Transport(format!("Content length {} out of range", content_length))
        })?;

        let client = self.client(region.as_deref(), requires_path_style(&bucket));
        let body = ByteStream::from_body_1_x(StreamBody::new(body.map_ok(Frame::data)));

        let mut put = client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(body)
            .content_length(content_length)
            .content_type(content_type)
            .acl(ObjectCannedAcl::from(acl.as_str()));
        if let Some(storage_class) = storage_class.as_deref() {
            put = put.storage_class(StorageClass::from(storage_class));
        }

        // Dropping the send future tears down the connection.
        let output = tokio::select! {
            biased;
            _ = abort.aborted() => {
                tracing::info!("PutObject aborted");
                return Err(BackendError::Aborted);
            }
            result = put.send() => result.map_err(|e| sdk_error("PutObject", e))?,
        };

        let etag = output.e_tag().map(str::to_owned);
        if let Some(etag) = &etag {
            tracing::Span::current().record("s3.etag", etag.as_str());
        }

        let region = region.as_deref().unwrap_or_else(|| self.default_region());
        let location = object_url(self.endpoint.as_deref(), &bucket, region, &key);
        tracing::debug!(location = %location, "PutObject completed");

        Ok(PutObjectOutcome { location, etag })
    }
}

/// Canonical URL of an object
///
/// Custom endpoints and dotted bucket names use path-style URLs; everything
/// else uses virtual-hosted-style. Key segments are percent-encoded.
pub fn object_url(endpoint: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None if requires_path_style(bucket) => {
            format!("https://s3.{}.amazonaws.com/{}/{}", region, bucket, key)
        }
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

/// Map a bucket location constraint to a region name
///
/// S3 reports buckets in `us-east-1` with an empty constraint and some old
/// `eu-west-1` buckets as `EU`.
fn normalize_location_constraint(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

fn sdk_error<E, R>(operation: &'static str, error: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let code = error.code().map(str::to_owned);
    let message = DisplayErrorContext(&error).to_string();

    match error {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            BackendError::Transport(message)
        }
        _ => BackendError::Service {
            operation,
            code,
            message,
        },
    }
}
