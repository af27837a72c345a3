use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spec::{
    PartitionSpec, PartitionStatisticsFile, Schema, Snapshot, SnapshotReference, SortOrder,
    StatisticsFile,
};

/// A single mutation inside a commit. Updates are applied in declaration
/// order; unknown `action` tags fail deserialization, which surfaces as a
/// bad request before any state is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TableUpdate {
    #[serde(rename_all = "kebab-case")]
    AssignUuid { uuid: Uuid },
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion { format_version: i32 },
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        schema: Schema,
        /// Sent by some clients; the stored value is always derived from
        /// the schema's own field ids.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    #[serde(rename_all = "kebab-case")]
    SetCurrentSchema {
        /// `-1` resolves to the highest stored schema id.
        schema_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AddSpec { spec: PartitionSpec },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSpec {
        /// `-1` resolves to the highest stored spec id.
        spec_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AddSortOrder { sort_order: SortOrder },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSortOrder {
        /// `-1` resolves to the highest stored order id.
        sort_order_id: i64,
    },
    #[serde(rename_all = "kebab-case")]
    AddSnapshot { snapshot: Snapshot },
    #[serde(rename_all = "kebab-case")]
    SetSnapshotRef {
        ref_name: String,
        #[serde(flatten)]
        reference: SnapshotReference,
    },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshots { snapshot_ids: Vec<i64> },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshotRef { ref_name: String },
    #[serde(rename_all = "kebab-case")]
    RemovePartitionSpecs { spec_ids: Vec<i32> },
    #[serde(rename_all = "kebab-case")]
    RemoveSchemas { schema_ids: Vec<i32> },
    #[serde(rename_all = "kebab-case")]
    SetLocation { location: String },
    #[serde(rename_all = "kebab-case")]
    SetProperties { updates: HashMap<String, String> },
    #[serde(rename_all = "kebab-case")]
    RemoveProperties { removals: Vec<String> },
    #[serde(rename_all = "kebab-case")]
    SetStatistics { statistics: StatisticsFile },
    #[serde(rename_all = "kebab-case")]
    SetPartitionStatistics {
        partition_statistics: PartitionStatisticsFile,
    },
    #[serde(rename_all = "kebab-case")]
    RemoveStatistics { snapshot_id: i64 },
    #[serde(rename_all = "kebab-case")]
    RemovePartitionStatistics { snapshot_id: i64 },
    EnableRowLineage,
}

impl TableUpdate {
    /// The wire name of the update action, used in log lines.
    #[must_use]
    pub fn action_name(&self) -> &'static str {
        match self {
            TableUpdate::AssignUuid { .. } => "assign-uuid",
            TableUpdate::UpgradeFormatVersion { .. } => "upgrade-format-version",
            TableUpdate::AddSchema { .. } => "add-schema",
            TableUpdate::SetCurrentSchema { .. } => "set-current-schema",
            TableUpdate::AddSpec { .. } => "add-spec",
            TableUpdate::SetDefaultSpec { .. } => "set-default-spec",
            TableUpdate::AddSortOrder { .. } => "add-sort-order",
            TableUpdate::SetDefaultSortOrder { .. } => "set-default-sort-order",
            TableUpdate::AddSnapshot { .. } => "add-snapshot",
            TableUpdate::SetSnapshotRef { .. } => "set-snapshot-ref",
            TableUpdate::RemoveSnapshots { .. } => "remove-snapshots",
            TableUpdate::RemoveSnapshotRef { .. } => "remove-snapshot-ref",
            TableUpdate::RemovePartitionSpecs { .. } => "remove-partition-specs",
            TableUpdate::RemoveSchemas { .. } => "remove-schemas",
            TableUpdate::SetLocation { .. } => "set-location",
            TableUpdate::SetProperties { .. } => "set-properties",
            TableUpdate::RemoveProperties { .. } => "remove-properties",
            TableUpdate::SetStatistics { .. } => "set-statistics",
            TableUpdate::SetPartitionStatistics { .. } => "set-partition-statistics",
            TableUpdate::RemoveStatistics { .. } => "remove-statistics",
            TableUpdate::RemovePartitionStatistics { .. } => "remove-partition-statistics",
            TableUpdate::EnableRowLineage => "enable-row-lineage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RefType;

    #[test]
    fn test_add_schema_parses() {
        let update: TableUpdate = serde_json::from_value(serde_json::json!({
            "action": "add-schema",
            "schema": {
                "type": "struct",
                "fields": [{"id": 1, "name": "x", "type": "long", "required": true}]
            }
        }))
        .unwrap();
        let TableUpdate::AddSchema { schema, .. } = update else {
            panic!("expected add-schema");
        };
        assert_eq!(schema.schema_id, None);
    }

    #[test]
    fn test_set_snapshot_ref_flattens_reference() {
        let update: TableUpdate = serde_json::from_value(serde_json::json!({
            "action": "set-snapshot-ref",
            "ref-name": "main",
            "type": "branch",
            "snapshot-id": 42,
            "max-ref-age-ms": 1000
        }))
        .unwrap();
        let TableUpdate::SetSnapshotRef { ref_name, reference } = update else {
            panic!("expected set-snapshot-ref");
        };
        assert_eq!(ref_name, "main");
        assert_eq!(reference.ref_type, RefType::Branch);
        assert_eq!(reference.snapshot_id, 42);
        assert_eq!(reference.max_ref_age_ms, Some(1000));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<TableUpdate, _> = serde_json::from_value(serde_json::json!({
            "action": "set-fnord",
            "fnord": true
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_enable_row_lineage_roundtrip() {
        let update = TableUpdate::EnableRowLineage;
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({"action": "enable-row-lineage"}));
        assert_eq!(serde_json::from_value::<TableUpdate>(value).unwrap(), update);
    }

    #[test]
    fn test_set_properties_roundtrip() {
        let update: TableUpdate = serde_json::from_value(serde_json::json!({
            "action": "set-properties",
            "updates": {"k": "v"}
        }))
        .unwrap();
        assert_eq!(update.action_name(), "set-properties");
    }
}
