use serde::Serialize;

use crate::compliance_record::{Compliance, ComplianceRecord};

pub const ACCOUNT_RESOURCE_TYPE: &str = "AWS::::Account";
pub const MAX_RESPONSE_ITEMS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonCompliantItem {
    pub account_id: String,
    pub guardrail: String,
    pub control_name: String,
    pub resource_type: String,
    pub resource_arn: String,
}

impl From<ComplianceRecord> for NonCompliantItem {
    fn from(record: ComplianceRecord) -> Self {
        NonCompliantItem {
            account_id: record.account_id,
            guardrail: record.guardrail,
            control_name: record.control_name,
            resource_type: record.resource_type,
            resource_arn: record.resource_arn,
        }
    }
}

/// Actionable findings in report order: non-compliant and not account-level.
#[derive(Debug, Default, PartialEq)]
pub struct FindingsBatch {
    items: Vec<NonCompliantItem>,
}

impl FindingsBatch {
    pub fn from_records(records: Vec<ComplianceRecord>) -> Self {
        let items = records
            .into_iter()
            .filter(|record| record.compliance == Compliance::NonCompliant)
            .filter(|record| record.resource_type != ACCOUNT_RESOURCE_TYPE)
            .map(NonCompliantItem::from)
            .collect();
        FindingsBatch { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[NonCompliantItem] {
        &self.items
    }

    pub fn response_items(&self) -> Vec<NonCompliantItem> {
        self.items.iter().take(MAX_RESPONSE_ITEMS).cloned().collect()
    }
}
