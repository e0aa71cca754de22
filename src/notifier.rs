use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::alert_message::AlertMessage;
use crate::compliance_record::parse_report;
use crate::error::NotifierError;
use crate::findings::{FindingsBatch, NonCompliantItem};
use crate::report_file::{select_latest, ReportFile};
use crate::s3_report_client::ReportStore;
use crate::slack_webhook_client::Notify;

/// Scheduled-event or manual payload. Only logged.
#[derive(Debug, Default, Deserialize)]
pub struct Trigger {
    pub source: Option<String>,
    #[serde(rename = "detail-type")]
    pub detail_type: Option<String>,
}

impl From<&Value> for Trigger {
    fn from(event: &Value) -> Self {
        serde_json::from_value(event.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    SkippedNoFindings,
    SkippedNotConfigured,
    Failed,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct InvocationResult {
    pub status: &'static str,
    pub csv_file: String,
    pub non_compliant_count: usize,
    pub non_compliant_items: Vec<NonCompliantItem>,
    pub skipped_rows: usize,
    pub notification: NotificationOutcome,
}

pub struct ComplianceNotifier<S, N> {
    store: S,
    webhook: Option<N>,
}

impl<S, N> ComplianceNotifier<S, N>
where
    S: ReportStore + Sync,
    N: Notify + Sync,
{
    pub fn new(store: S, webhook: Option<N>) -> Self {
        ComplianceNotifier { store, webhook }
    }

    pub async fn run(&self, trigger: &Trigger) -> Result<InvocationResult, NotifierError> {
        info!(
            source = trigger.source.as_deref().unwrap_or("manual"),
            detail_type = trigger.detail_type.as_deref().unwrap_or("-"),
            "starting compliance report check"
        );

        let report = self.latest_report().await?;
        info!(
            key = %report.key,
            last_modified = %report.last_modified,
            "selected latest CSV report"
        );

        let contents = self
            .store
            .fetch_report(&report.key)
            .await
            .map_err(|source| NotifierError::DownloadFailed {
                key: report.key.clone(),
                source,
            })?;

        let parsed = parse_report(&contents)?;
        let batch = FindingsBatch::from_records(parsed.records);
        info!(
            non_compliant = batch.len(),
            skipped_rows = parsed.skipped_rows,
            "filtered actionable findings"
        );

        let notification = if batch.is_empty() {
            info!("no NON_COMPLIANT items found, skipping notification");
            NotificationOutcome::SkippedNoFindings
        } else {
            let message = AlertMessage::build(&batch, &report.key, Utc::now());
            self.deliver(&message).await
        };

        Ok(InvocationResult {
            status: "success",
            non_compliant_count: batch.len(),
            non_compliant_items: batch.response_items(),
            csv_file: report.key,
            skipped_rows: parsed.skipped_rows,
            notification,
        })
    }

    async fn latest_report(&self) -> Result<ReportFile, NotifierError> {
        let bucket = self.store.bucket().to_string();
        let reports: Vec<ReportFile> = self
            .store
            .list_reports()
            .await
            .map_err(|source| NotifierError::ListFailed {
                bucket: bucket.clone(),
                source,
            })?
            .into_iter()
            .filter(ReportFile::is_csv)
            .collect();

        select_latest(&reports)
            .cloned()
            .ok_or(NotifierError::NoReportFound(bucket))
    }

    // Delivery problems never fail the invocation; the report was still processed.
    async fn deliver(&self, message: &AlertMessage) -> NotificationOutcome {
        let webhook = match &self.webhook {
            Some(webhook) => webhook,
            None => {
                warn!("SLACK_WEBHOOK_URL not configured, unable to send notifications");
                return NotificationOutcome::SkippedNotConfigured;
            }
        };
        match webhook.notify(message).await {
            Ok(()) => NotificationOutcome::Sent,
            Err(err) => {
                let err = NotifierError::from(err);
                error!(event = "notification_failed", error = %err, "failed to send Slack notification");
                NotificationOutcome::Failed
            }
        }
    }
}
