mod alert_message;
mod compliance_record;
mod config;
mod error;
mod findings;
mod notifier;
mod report_file;
mod retry;
mod s3_report_client;
mod slack_webhook_client;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use rusoto_core::Region;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::NotifierConfig;
use crate::notifier::{ComplianceNotifier, InvocationResult, Trigger};
use crate::s3_report_client::S3ReportClient;
use crate::slack_webhook_client::SlackWebhookClient;

type Notifier = ComplianceNotifier<S3ReportClient, SlackWebhookClient>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        // CloudWatch stamps each line on ingestion.
        .without_time()
        .with_target(false)
        .init();

    let config = NotifierConfig::from_env()?;
    let retry = config.retry_policy();
    let store = S3ReportClient::new(
        Region::default(),
        config.bucket.clone(),
        retry.clone(),
        config.request_timeout,
    );
    let webhook = config
        .webhook_url
        .clone()
        .map(|url| SlackWebhookClient::new(url, retry.clone(), config.request_timeout))
        .transpose()?;
    info!(
        bucket = %config.bucket,
        webhook_configured = webhook.is_some(),
        max_attempts = retry.max_attempts(),
        "compliance notifier initialised"
    );

    let notifier = ComplianceNotifier::new(store, webhook);
    let notifier = &notifier;
    run(service_fn(move |event: LambdaEvent<Value>| async move {
        compliance_handler(event, notifier).await
    }))
    .await
}

async fn compliance_handler(
    event: LambdaEvent<Value>,
    notifier: &Notifier,
) -> Result<InvocationResult, Error> {
    let trigger = Trigger::from(&event.payload);
    info!(
        request_id = %event.context.request_id,
        deadline_ms = event.context.deadline,
        "starting S3 CSV to Slack invocation"
    );

    match notifier.run(&trigger).await {
        Ok(result) => {
            info!(
                csv_file = %result.csv_file,
                non_compliant_count = result.non_compliant_count,
                "invocation finished"
            );
            Ok(result)
        }
        Err(err) => {
            error!(error = %err, "invocation failed");
            Err(err.into())
        }
    }
}
