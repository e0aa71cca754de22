use std::fmt;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::error::NotifierError;

const ACCOUNT_ID: &str = "accountId";
const GUARDRAIL: &str = "guardrail";
const CONTROL_NAME: &str = "controlName";
const RESOURCE_TYPE: &str = "resourceType";
const RESOURCE_ARN: &str = "resourceArn";
const COMPLIANCE: &str = "compliance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compliance {
    Compliant,
    NonCompliant,
    Other(String),
}

impl From<&str> for Compliance {
    fn from(value: &str) -> Self {
        match value {
            "COMPLIANT" => Compliance::Compliant,
            "NON_COMPLIANT" => Compliance::NonCompliant,
            other => Compliance::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceRecord {
    pub account_id: String,
    pub guardrail: String,
    pub control_name: String,
    pub resource_type: String,
    pub resource_arn: String,
    pub compliance: Compliance,
}

#[derive(Debug, PartialEq)]
pub struct ParsedReport {
    pub records: Vec<ComplianceRecord>,
    pub skipped_rows: usize,
}

#[derive(Debug)]
enum RowSkip {
    MissingColumn(&'static str),
    MissingIdentity,
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RowSkip::MissingColumn(name) => write!(f, "row has no {} column", name),
            RowSkip::MissingIdentity => write!(f, "finding without accountId or controlName"),
        }
    }
}

/// Positions of the required columns, resolved once from the header row.
#[derive(Debug)]
struct ColumnIndex {
    account_id: usize,
    guardrail: usize,
    control_name: usize,
    resource_type: usize,
    resource_arn: usize,
    compliance: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, NotifierError> {
        let position = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| {
                    NotifierError::ParseFailure(format!("header row is missing column {}", name))
                })
        };
        Ok(ColumnIndex {
            account_id: position(ACCOUNT_ID)?,
            guardrail: position(GUARDRAIL)?,
            control_name: position(CONTROL_NAME)?,
            resource_type: position(RESOURCE_TYPE)?,
            resource_arn: position(RESOURCE_ARN)?,
            compliance: position(COMPLIANCE)?,
        })
    }

    fn decode(&self, row: &StringRecord) -> Result<ComplianceRecord, RowSkip> {
        let field = |index: usize, name: &'static str| {
            row.get(index)
                .map(str::to_string)
                .ok_or(RowSkip::MissingColumn(name))
        };
        let record = ComplianceRecord {
            account_id: field(self.account_id, ACCOUNT_ID)?,
            guardrail: field(self.guardrail, GUARDRAIL)?,
            control_name: field(self.control_name, CONTROL_NAME)?,
            resource_type: field(self.resource_type, RESOURCE_TYPE)?,
            resource_arn: field(self.resource_arn, RESOURCE_ARN)?,
            compliance: Compliance::from(field(self.compliance, COMPLIANCE)?.as_str()),
        };
        // A finding nobody can act on is noise.
        if record.compliance == Compliance::NonCompliant
            && (record.account_id.is_empty() || record.control_name.is_empty())
        {
            return Err(RowSkip::MissingIdentity);
        }
        Ok(record)
    }
}

pub fn parse_report(contents: &[u8]) -> Result<ParsedReport, NotifierError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(contents);

    let headers = reader
        .headers()
        .map_err(|error| NotifierError::ParseFailure(format!("unreadable header row: {}", error)))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(NotifierError::ParseFailure("missing header row".to_string()));
    }
    let columns = ColumnIndex::from_headers(&headers)?;

    let mut records = Vec::new();
    let mut skipped_rows = 0;
    for (index, row) in reader.records().enumerate() {
        // header is line 1
        let line = index + 2;
        let decoded = row
            .map_err(|error| error.to_string())
            .and_then(|row| columns.decode(&row).map_err(|skip| skip.to_string()));
        match decoded {
            Ok(record) => records.push(record),
            Err(reason) => {
                skipped_rows += 1;
                warn!(line, reason = %reason, "skipping malformed row");
            }
        }
    }

    info!(records = records.len(), skipped_rows, "parsed report");
    Ok(ParsedReport {
        records,
        skipped_rows,
    })
}
