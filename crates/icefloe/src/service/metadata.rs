//! Materialization of the canonical table-metadata document from
//! normalized rows.
//!
//! The indexed columns of the child tables are authoritative: blobs that
//! predate id assignment are repaired against them here, on every read
//! path, so both load and commit responses carry complete documents.

use std::collections::{BTreeMap, HashMap};

use icefloe_rest::spec::{
    PartitionSpec, PartitionStatisticsFile, Schema, Snapshot, SnapshotReference, SortOrder,
    StatisticsFile, TableMetadata,
};
use itertools::Itertools;
use uuid::Uuid;

/// The header row of a table, as stored in the `tables` relation.
#[derive(Debug, Clone, PartialEq)]
pub struct TableHead {
    pub table_uuid: Uuid,
    pub location: String,
    pub format_version: i32,
    pub last_updated_ms: i64,
    pub last_sequence_number: i64,
    pub last_column_id: i32,
    pub current_schema_id: i32,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    pub default_sort_order_id: i64,
    pub current_snapshot_id: Option<i64>,
    pub properties: HashMap<String, String>,
    pub row_lineage: Option<bool>,
    pub next_row_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SchemaRow {
    pub schema_id: i32,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct PartitionSpecRow {
    pub spec_id: i32,
    pub spec: PartitionSpec,
}

#[derive(Debug, Clone)]
pub struct SortOrderRow {
    pub order_id: i64,
    pub order: SortOrder,
}

/// All child rows of a table needed to materialize its document.
#[derive(Debug, Clone, Default)]
pub struct TableChildRows {
    pub schemas: Vec<SchemaRow>,
    pub partition_specs: Vec<PartitionSpecRow>,
    pub sort_orders: Vec<SortOrderRow>,
    pub snapshots: Vec<Snapshot>,
    pub refs: BTreeMap<String, SnapshotReference>,
    pub statistics: Vec<StatisticsFile>,
    pub partition_statistics: Vec<PartitionStatisticsFile>,
}

/// A stored schema blob without a `schema-id` inherits it from the row's
/// index column.
#[must_use]
pub fn repair_schema(row: SchemaRow) -> Schema {
    let SchemaRow { schema_id, mut schema } = row;
    if schema.schema_id.is_none() {
        tracing::debug!("Repairing missing schema-id {schema_id} on stored schema");
        schema.schema_id = Some(schema_id);
    }
    schema
}

/// A stored spec blob without a `spec-id` inherits it from the row's
/// index column; partition fields without a `field-id` are assigned by
/// walking upward from the table's `last_partition_id`.
#[must_use]
pub fn repair_partition_spec(row: PartitionSpecRow, last_partition_id: i32) -> PartitionSpec {
    let PartitionSpecRow { spec_id, mut spec } = row;
    if spec.spec_id.is_none() {
        tracing::debug!("Repairing missing spec-id {spec_id} on stored partition spec");
        spec.spec_id = Some(spec_id);
    }
    let mut next_field_id = last_partition_id;
    for field in &mut spec.fields {
        if field.field_id.is_none() {
            next_field_id += 1;
            tracing::debug!("Repairing missing field-id {next_field_id} on partition field");
            field.field_id = Some(next_field_id);
        }
    }
    spec
}

/// Materialize the canonical metadata document. Child collections are
/// emitted in id order so repeated assembly of the same rows yields an
/// identical document.
#[must_use]
pub fn assemble_table_metadata(head: TableHead, children: TableChildRows) -> TableMetadata {
    let TableChildRows {
        schemas,
        partition_specs,
        sort_orders,
        snapshots,
        refs,
        statistics,
        partition_statistics,
    } = children;

    let schemas = schemas
        .into_iter()
        .sorted_by_key(|row| row.schema_id)
        .map(repair_schema)
        .collect();
    let partition_specs = partition_specs
        .into_iter()
        .sorted_by_key(|row| row.spec_id)
        .map(|row| repair_partition_spec(row, head.last_partition_id))
        .collect();
    let sort_orders = sort_orders
        .into_iter()
        .sorted_by_key(|row| row.order_id)
        .map(|row| row.order)
        .collect();
    let snapshots = snapshots
        .into_iter()
        .sorted_by_key(|snapshot| snapshot.snapshot_id)
        .collect();

    TableMetadata {
        format_version: head.format_version,
        table_uuid: head.table_uuid,
        location: head.location,
        last_updated_ms: head.last_updated_ms,
        last_sequence_number: head.last_sequence_number,
        properties: head.properties,
        schemas,
        current_schema_id: head.current_schema_id,
        last_column_id: head.last_column_id,
        partition_specs,
        default_spec_id: head.default_spec_id,
        last_partition_id: head.last_partition_id,
        sort_orders,
        default_sort_order_id: head.default_sort_order_id,
        snapshots,
        refs,
        current_snapshot_id: head.current_snapshot_id,
        statistics: if statistics.is_empty() {
            None
        } else {
            Some(statistics)
        },
        partition_statistics: if partition_statistics.is_empty() {
            None
        } else {
            Some(partition_statistics)
        },
        row_lineage: head.row_lineage,
        next_row_id: head.next_row_id,
    }
}
