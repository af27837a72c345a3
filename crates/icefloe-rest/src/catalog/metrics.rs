use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metrics report posted by engines after scans and commits. Scan and
/// commit reports share one wire shape; a report is a scan report when it
/// carries both `filter` and `schema_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportMetricsRequest {
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_field_ids: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_field_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl ReportMetricsRequest {
    /// Scan reports carry a filter and a schema id; everything else is
    /// treated as a commit report.
    #[must_use]
    pub fn is_scan_report(&self) -> bool {
        self.filter.is_some() && self.schema_id.is_some()
    }
}
