use std::time::Duration;

use rusoto_core::RusotoError;
use rusoto_s3::{GetObjectError, ListObjectsV2Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("required environment variable {0} is missing or empty")]
    MissingEnv(&'static str),
    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("failed to list objects in bucket {bucket}: {source}")]
    ListFailed {
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("no CSV report found in bucket {0}")]
    NoReportFound(String),
    #[error("failed to download report {key}: {source}")]
    DownloadFailed {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to parse report: {0}")]
    ParseFailure(String),
    #[error("failed to deliver notification: {0}")]
    NotificationFailed(#[from] WebhookError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    ListObjects(#[from] RusotoError<ListObjectsV2Error>),
    #[error(transparent)]
    GetObject(#[from] RusotoError<GetObjectError>),
    #[error("object has no body")]
    EmptyBody,
    #[error("failed to read object body: {0}")]
    Body(#[from] std::io::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::ListObjects(error) => is_retryable_rusoto(error),
            StoreError::GetObject(error) => is_retryable_rusoto(error),
            StoreError::Body(_) | StoreError::Timeout(_) => true,
            StoreError::EmptyBody => false,
        }
    }
}

// S3 reports access denied as an unmodelled 403, so only 5xx and throttling retry.
fn is_retryable_rusoto<E>(error: &RusotoError<E>) -> bool {
    match error {
        RusotoError::HttpDispatch(_) => true,
        RusotoError::Unknown(response) => {
            response.status.is_server_error() || response.status.as_u16() == 429
        }
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl WebhookError {
    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Request(error) => error.is_timeout() || error.is_connect(),
            WebhookError::Status { status, .. } => *status >= 500 || *status == 429,
        }
    }
}
