use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    PartitionSpec, PartitionStatisticsFile, Schema, Snapshot, SnapshotReference, SortOrder,
    StatisticsFile,
};

/// New tables are written with format version 2.
pub const DEFAULT_FORMAT_VERSION: i32 = 2;

/// The canonical table-metadata document returned by load and commit
/// responses. Field order follows the serialized layout of the
/// `*.metadata.json` files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: i32,
    pub table_uuid: Uuid,
    pub location: String,
    pub last_updated_ms: i64,
    pub last_sequence_number: i64,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub schemas: Vec<Schema>,
    pub current_schema_id: i32,
    pub last_column_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    pub sort_orders: Vec<SortOrder>,
    pub default_sort_order_id: i64,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub refs: BTreeMap<String, SnapshotReference>,
    pub current_snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Vec<StatisticsFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_statistics: Option<Vec<PartitionStatisticsFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_lineage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_row_id: Option<i64>,
}

impl TableMetadata {
    #[must_use]
    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == Some(self.current_schema_id))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::{SortOrder, StructField};

    fn minimal_metadata() -> TableMetadata {
        TableMetadata {
            format_version: 2,
            table_uuid: Uuid::nil(),
            location: "s3://bucket/acct.tax/t1".to_string(),
            last_updated_ms: 1_700_000_000_000,
            last_sequence_number: 0,
            properties: HashMap::new(),
            schemas: vec![Schema {
                schema_type: "struct".to_string(),
                schema_id: Some(0),
                fields: vec![StructField {
                    id: 1,
                    name: "amt".to_string(),
                    field_type: serde_json::json!("long"),
                    required: true,
                    doc: None,
                    initial_default: None,
                    write_default: None,
                }],
                identifier_field_ids: None,
            }],
            current_schema_id: 0,
            last_column_id: 1,
            partition_specs: vec![PartitionSpec::unpartitioned()],
            default_spec_id: 0,
            last_partition_id: 0,
            sort_orders: vec![SortOrder::unsorted()],
            default_sort_order_id: 0,
            snapshots: Vec::new(),
            refs: BTreeMap::new(),
            current_snapshot_id: None,
            statistics: None,
            partition_statistics: None,
            row_lineage: None,
            next_row_id: None,
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = minimal_metadata();
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["format-version"], serde_json::json!(2));
        assert_eq!(value["current-snapshot-id"], serde_json::Value::Null);
        assert!(value.get("row-lineage").is_none());

        let parsed: TableMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_current_schema_lookup() {
        let metadata = minimal_metadata();
        assert_eq!(
            metadata.current_schema().and_then(|s| s.schema_id),
            Some(0)
        );
    }
}
