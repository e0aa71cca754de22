use chrono::{DateTime, Utc};

use crate::findings::{FindingsBatch, NonCompliantItem};

pub const MAX_DETAILED_ITEMS: usize = 8;
pub const MAX_LISTED_GUARDRAILS: usize = 5;
const ARN_DISPLAY_WIDTH: usize = 60;
const ARN_RESOURCE_TAIL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailSummary {
    pub guardrail: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub total: usize,
    pub report_date: String,
    pub source_file: String,
    pub alert_time: DateTime<Utc>,
    /// Every affected guardrail, in order of first appearance.
    pub guardrails: Vec<GuardrailSummary>,
    /// Leading findings with display-truncated ARNs.
    pub details: Vec<NonCompliantItem>,
    pub remaining: usize,
}

impl AlertMessage {
    pub fn build(batch: &FindingsBatch, source_file: &str, alert_time: DateTime<Utc>) -> Self {
        let details: Vec<NonCompliantItem> = batch
            .items()
            .iter()
            .take(MAX_DETAILED_ITEMS)
            .map(|item| NonCompliantItem {
                resource_arn: truncate_arn(&item.resource_arn),
                ..item.clone()
            })
            .collect();

        AlertMessage {
            total: batch.len(),
            report_date: report_date_from_key(source_file),
            source_file: source_file.to_string(),
            alert_time,
            guardrails: group_by_guardrail(batch.items()),
            remaining: batch.len() - details.len(),
            details,
        }
    }
}

fn group_by_guardrail(items: &[NonCompliantItem]) -> Vec<GuardrailSummary> {
    let mut groups: Vec<GuardrailSummary> = Vec::new();
    for item in items {
        let guardrail = if item.guardrail.is_empty() {
            "Unknown"
        } else {
            item.guardrail.as_str()
        };
        match groups.iter_mut().find(|group| group.guardrail == guardrail) {
            Some(group) => group.count += 1,
            None => groups.push(GuardrailSummary {
                guardrail: guardrail.to_string(),
                count: 1,
            }),
        }
    }
    groups
}

/// Shortens long ARNs for display, keeping the partition/service/region/account
/// prefix and the tail of the resource id.
pub fn truncate_arn(arn: &str) -> String {
    if arn.chars().count() <= ARN_DISPLAY_WIDTH {
        return arn.to_string();
    }
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() >= 6 {
        let resource = parts[parts.len() - 1];
        let skip = resource.chars().count().saturating_sub(ARN_RESOURCE_TAIL);
        let tail: String = resource.chars().skip(skip).collect();
        format!("{}:...{}", parts[..5].join(":"), tail)
    } else {
        let head: String = arn.chars().take(ARN_DISPLAY_WIDTH - 3).collect();
        format!("{}...", head)
    }
}

/// Report files are named `<prefix>_<date>.csv`.
pub fn report_date_from_key(key: &str) -> String {
    match key.rsplit_once('_') {
        Some((_, date)) => date.trim_end_matches(".csv").to_string(),
        None => "Unknown".to_string(),
    }
}
