use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusoto_core::Region;
use rusoto_s3::{GetObjectRequest, ListObjectsV2Request, Object, S3Client, S3};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::report_file::ReportFile;
use crate::retry::RetryPolicy;

pub struct S3ReportClient {
    client: S3Client,
    bucket: String,
    retry: RetryPolicy,
    timeout: Duration,
}

#[async_trait]
pub trait ReportStore {
    fn bucket(&self) -> &str;
    async fn list_reports(&self) -> Result<Vec<ReportFile>, StoreError>;
    async fn fetch_report(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

#[async_trait]
impl ReportStore for S3ReportClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_reports(&self) -> Result<Vec<ReportFile>, StoreError> {
        let mut reports = Vec::new();
        let mut continuation_token = None;
        loop {
            let request = ListObjectsV2Request {
                bucket: self.bucket.clone(),
                continuation_token: continuation_token.take(),
                ..Default::default()
            };
            let output = self
                .retry
                .run("list_objects_v2", StoreError::is_retryable, || {
                    self.list_page(request.clone())
                })
                .await?;

            reports.extend(
                output
                    .contents
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(to_report_file),
            );

            match (output.is_truncated, output.next_continuation_token) {
                (Some(true), Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }
        debug!(bucket = %self.bucket, objects = reports.len(), "listed bucket");
        Ok(reports)
    }

    async fn fetch_report(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.retry
            .run("get_object", StoreError::is_retryable, || self.download(key))
            .await
    }
}

impl S3ReportClient {
    pub fn new(region: Region, bucket: String, retry: RetryPolicy, timeout: Duration) -> Self {
        Self::new_with_client(S3Client::new(region), bucket, retry, timeout)
    }

    fn new_with_client(
        client: S3Client,
        bucket: String,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        S3ReportClient {
            client,
            bucket,
            retry,
            timeout,
        }
    }

    async fn list_page(
        &self,
        request: ListObjectsV2Request,
    ) -> Result<rusoto_s3::ListObjectsV2Output, StoreError> {
        tokio::time::timeout(self.timeout, self.client.list_objects_v2(request))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(StoreError::from)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            ..Default::default()
        };
        let read = async {
            let output = self.client.get_object(request).await?;
            let body = output.body.ok_or(StoreError::EmptyBody)?;
            let mut reader = Box::pin(body.into_async_read());
            let mut contents = Vec::new();
            reader.read_to_end(&mut contents).await?;
            Ok::<_, StoreError>(contents)
        };
        tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

fn to_report_file(object: Object) -> Option<ReportFile> {
    let key = object.key?;
    let last_modified = object
        .last_modified
        .as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc));
    match last_modified {
        Some(last_modified) => Some(ReportFile { key, last_modified }),
        None => {
            warn!(key = %key, "skipping object without a readable LastModified");
            None
        }
    }
}
