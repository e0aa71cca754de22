use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct ReportFile {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ReportFile {
    pub fn is_csv(&self) -> bool {
        self.key.ends_with(".csv")
    }
}

/// Newest report by `last_modified`; equal timestamps resolve to the lexically greatest key.
pub fn select_latest(files: &[ReportFile]) -> Option<&ReportFile> {
    files
        .iter()
        .max_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        })
}
