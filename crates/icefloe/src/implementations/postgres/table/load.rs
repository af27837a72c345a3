use std::collections::BTreeMap;
use std::str::FromStr as _;

use icefloe_rest::{
    catalog::table::LoadTableResult,
    spec::{
        BlobMetadata, PartitionSpec, PartitionStatisticsFile, RefType, Schema, Snapshot,
        SnapshotReference, SortOrder, StatisticsFile, Summary,
    },
    ErrorModel,
};
use sqlx::{types::Json, PgConnection};

use super::TableRow;
use crate::{
    api::types::SnapshotsQuery,
    implementations::postgres::{credentials, dbutils::DBErrorHandler},
    service::metadata::{
        assemble_table_metadata, PartitionSpecRow, SchemaRow, SortOrderRow, TableChildRows,
    },
};

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    snapshot_id: i64,
    parent_snapshot_id: Option<i64>,
    sequence_number: i64,
    timestamp_ms: i64,
    manifest_list: String,
    summary: Json<Summary>,
    schema_id: Option<i32>,
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRefRow {
    name: String,
    snapshot_id: i64,
    #[sqlx(rename = "type")]
    ref_type: String,
    min_snapshots_to_keep: Option<i32>,
    max_snapshot_age_ms: Option<i64>,
    max_ref_age_ms: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticsRow {
    snapshot_id: i64,
    statistics_path: String,
    file_size_in_bytes: i64,
    file_footer_size_in_bytes: i64,
    blob_metadata: Json<Vec<BlobMetadata>>,
}

#[derive(Debug, sqlx::FromRow)]
struct PartitionStatisticsRow {
    snapshot_id: i64,
    statistics_path: String,
    file_size_in_bytes: i64,
}

/// Fetch every child row of a table. With [`SnapshotsQuery::Refs`] only
/// snapshots reachable from a ref are included.
pub(crate) async fn fetch_table_children(
    connection: &mut PgConnection,
    table_id: i64,
    snapshots: SnapshotsQuery,
) -> Result<TableChildRows, ErrorModel> {
    let schema_rows: Vec<(i32, Json<Schema>)> =
        sqlx::query_as("SELECT schema_id, schema_json FROM schemas WHERE table_id = $1")
            .bind(table_id)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error fetching schemas"))?;

    let spec_rows: Vec<(i32, Json<PartitionSpec>)> =
        sqlx::query_as("SELECT spec_id, spec_json FROM partition_specs WHERE table_id = $1")
            .bind(table_id)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error fetching partition specs"))?;

    let order_rows: Vec<(i64, Json<SortOrder>)> =
        sqlx::query_as("SELECT order_id, order_json FROM sort_orders WHERE table_id = $1")
            .bind(table_id)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error fetching sort orders"))?;

    let mut snapshots_query = String::from(
        r"
        SELECT snapshot_id, parent_snapshot_id, sequence_number, timestamp_ms,
               manifest_list, summary, schema_id
        FROM snapshots
        WHERE table_id = $1",
    );
    if snapshots == SnapshotsQuery::Refs {
        snapshots_query.push_str(
            " AND snapshot_id IN (SELECT snapshot_id FROM snapshot_refs WHERE table_id = $1)",
        );
    }
    let snapshot_rows: Vec<SnapshotRow> = sqlx::query_as(&snapshots_query)
        .bind(table_id)
        .fetch_all(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching snapshots"))?;

    let ref_rows: Vec<SnapshotRefRow> = sqlx::query_as(
        r"
        SELECT name, snapshot_id, type, min_snapshots_to_keep,
               max_snapshot_age_ms, max_ref_age_ms
        FROM snapshot_refs
        WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_all(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error fetching snapshot refs"))?;

    let statistics_rows: Vec<StatisticsRow> = sqlx::query_as(
        r"
        SELECT snapshot_id, statistics_path, file_size_in_bytes,
               file_footer_size_in_bytes, blob_metadata
        FROM table_statistics
        WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_all(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error fetching table statistics"))?;

    let partition_statistics_rows: Vec<PartitionStatisticsRow> = sqlx::query_as(
        r"
        SELECT snapshot_id, statistics_path, file_size_in_bytes
        FROM partition_statistics
        WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_all(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error fetching partition statistics"))?;

    let mut refs = BTreeMap::new();
    for row in ref_rows {
        let ref_type = RefType::from_str(&row.ref_type).map_err(|e| {
            ErrorModel::internal(
                format!("Stored ref {} has invalid type {}", row.name, row.ref_type),
                "InternalServerError",
                Some(Box::new(e)),
            )
        })?;
        refs.insert(
            row.name,
            SnapshotReference {
                ref_type,
                snapshot_id: row.snapshot_id,
                min_snapshots_to_keep: row.min_snapshots_to_keep,
                max_snapshot_age_ms: row.max_snapshot_age_ms,
                max_ref_age_ms: row.max_ref_age_ms,
            },
        );
    }

    Ok(TableChildRows {
        schemas: schema_rows
            .into_iter()
            .map(|(schema_id, Json(schema))| SchemaRow { schema_id, schema })
            .collect(),
        partition_specs: spec_rows
            .into_iter()
            .map(|(spec_id, Json(spec))| PartitionSpecRow { spec_id, spec })
            .collect(),
        sort_orders: order_rows
            .into_iter()
            .map(|(order_id, Json(order))| SortOrderRow { order_id, order })
            .collect(),
        snapshots: snapshot_rows
            .into_iter()
            .map(|row| Snapshot {
                snapshot_id: row.snapshot_id,
                parent_snapshot_id: row.parent_snapshot_id,
                sequence_number: row.sequence_number,
                timestamp_ms: row.timestamp_ms,
                manifest_list: row.manifest_list,
                summary: row.summary.0,
                schema_id: row.schema_id,
            })
            .collect(),
        refs,
        statistics: statistics_rows
            .into_iter()
            .map(|row| StatisticsFile {
                snapshot_id: row.snapshot_id,
                statistics_path: row.statistics_path,
                file_size_in_bytes: row.file_size_in_bytes,
                file_footer_size_in_bytes: row.file_footer_size_in_bytes,
                blob_metadata: row.blob_metadata.0,
            })
            .collect(),
        partition_statistics: partition_statistics_rows
            .into_iter()
            .map(|row| PartitionStatisticsFile {
                snapshot_id: row.snapshot_id,
                statistics_path: row.statistics_path,
                file_size_in_bytes: row.file_size_in_bytes,
            })
            .collect(),
    })
}

/// Materialize the full load result for a table row, including the
/// config envelope and storage credentials.
pub(crate) async fn build_load_table_result(
    connection: &mut PgConnection,
    row: &TableRow,
    namespace_root: &str,
    snapshots: SnapshotsQuery,
) -> Result<LoadTableResult, ErrorModel> {
    let children = fetch_table_children(&mut *connection, row.id, snapshots).await?;
    let metadata = assemble_table_metadata(row.head(), children);

    let config = credentials::get_table_config(&mut *connection, &row.location).await?;
    let storage_credentials = credentials::get_storage_credentials_lenient(
        &mut *connection,
        row.id,
        &row.location,
        namespace_root,
    )
    .await;

    Ok(LoadTableResult {
        metadata_location: format!("{}/metadata/current.metadata.json", row.location),
        metadata,
        config: Some(config),
        storage_credentials: Some(storage_credentials),
    })
}
