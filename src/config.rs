use std::time::Duration;

use reqwest::Url;

use crate::error::NotifierError;
use crate::retry::RetryPolicy;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierConfig {
    pub bucket: String,
    pub webhook_url: Option<Url>,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self, NotifierError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotifierError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bucket = read("S3_BUCKET").ok_or(NotifierError::MissingEnv("S3_BUCKET"))?;

        let webhook_url = read("SLACK_WEBHOOK_URL")
            .map(|value| {
                Url::parse(&value).map_err(|_| NotifierError::InvalidEnv {
                    name: "SLACK_WEBHOOK_URL",
                    value,
                })
            })
            .transpose()?;

        let max_retries = match read("MAX_RETRIES") {
            Some(value) => parse_positive("MAX_RETRIES", value)?,
            None => DEFAULT_MAX_RETRIES,
        };

        let timeout_secs = match read("REQUEST_TIMEOUT_SECS") {
            Some(value) => parse_positive("REQUEST_TIMEOUT_SECS", value)?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(NotifierConfig {
            bucket,
            webhook_url,
            max_retries,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_retries)
    }
}

fn parse_positive<T>(name: &'static str, value: String) -> Result<T, NotifierError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(NotifierError::InvalidEnv { name, value }),
    }
}
