use icefloe_rest::{
    catalog::{
        requirement::TableRequirement,
        table::{CommitTableRequest, CommitTableResponse, CommitTransactionRequest},
        update::TableUpdate,
        NamespaceIdent,
    },
    spec::Schema,
    ErrorModel,
};
use sqlx::{types::Json, PgConnection};
use uuid::Uuid;

use super::{
    create::assign_partition_field_ids, fetch_table_row, fetch_table_row_by_id,
    load::fetch_table_children, table_not_found, TableRow,
};
use crate::{
    api::types::SnapshotsQuery,
    implementations::postgres::{dbutils::DBErrorHandler, CatalogState, PostgresTransaction},
    service::metadata::assemble_table_metadata,
};

fn commit_failed(requirement_type: &str) -> ErrorModel {
    ErrorModel::conflict(
        format!("Table requirement not met: {requirement_type}"),
        "CommitFailedException",
        None,
    )
}

/// Evaluate one requirement against the current table header.
/// `named_ref` is the snapshot the named ref currently points to, when
/// the requirement is about a ref and the ref row exists.
pub(crate) fn requirement_holds(
    requirement: &TableRequirement,
    row: &TableRow,
    named_ref: Option<i64>,
) -> bool {
    match requirement {
        // The table was just loaded, so it exists.
        TableRequirement::AssertCreate => false,
        TableRequirement::AssertTableUuid { uuid } => row.table_uuid == *uuid,
        TableRequirement::AssertRefSnapshotId { snapshot_id, .. } => match snapshot_id {
            None => named_ref.is_none(),
            Some(snapshot_id) => named_ref == Some(*snapshot_id),
        },
        TableRequirement::AssertLastAssignedFieldId {
            last_assigned_field_id,
        } => row.last_column_id == *last_assigned_field_id,
        TableRequirement::AssertCurrentSchemaId { current_schema_id } => {
            row.current_schema_id == *current_schema_id
        }
        TableRequirement::AssertLastAssignedPartitionId {
            last_assigned_partition_id,
        } => row.last_partition_id == *last_assigned_partition_id,
        TableRequirement::AssertDefaultSpecId { default_spec_id } => {
            row.default_spec_id == *default_spec_id
        }
        TableRequirement::AssertDefaultSortOrderId {
            default_sort_order_id,
        } => row.default_sort_order_id == *default_sort_order_id,
        TableRequirement::Unknown(_) => false,
    }
}

async fn check_requirements(
    connection: &mut PgConnection,
    row: &TableRow,
    requirements: &[TableRequirement],
) -> Result<(), ErrorModel> {
    for requirement in requirements {
        let named_ref: Option<i64> =
            if let TableRequirement::AssertRefSnapshotId { r#ref, .. } = requirement {
                sqlx::query_scalar(
                    "SELECT snapshot_id FROM snapshot_refs WHERE table_id = $1 AND name = $2",
                )
                .bind(row.id)
                .bind(r#ref)
                .fetch_optional(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error checking snapshot ref requirement"))?
            } else {
                None
            };

        if !requirement_holds(requirement, row, named_ref) {
            tracing::debug!(
                "Commit requirement {} failed for table {}",
                requirement.type_name(),
                row.id
            );
            return Err(commit_failed(requirement.type_name()));
        }
    }
    Ok(())
}

async fn max_schema_id(connection: &mut PgConnection, table_id: i64) -> Result<i32, ErrorModel> {
    sqlx::query_scalar("SELECT COALESCE(MAX(schema_id), -1) FROM schemas WHERE table_id = $1")
        .bind(table_id)
        .fetch_one(connection)
        .await
        .map_err(|e| e.into_error_model("Error resolving max schema id"))
}

async fn max_spec_id(connection: &mut PgConnection, table_id: i64) -> Result<i32, ErrorModel> {
    sqlx::query_scalar(
        "SELECT COALESCE(MAX(spec_id), -1) FROM partition_specs WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_one(connection)
    .await
    .map_err(|e| e.into_error_model("Error resolving max spec id"))
}

async fn max_sort_order_id(
    connection: &mut PgConnection,
    table_id: i64,
) -> Result<i64, ErrorModel> {
    sqlx::query_scalar(
        "SELECT COALESCE(MAX(order_id), 0) FROM sort_orders WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_one(connection)
    .await
    .map_err(|e| e.into_error_model("Error resolving max sort order id"))
}

#[allow(clippy::too_many_lines)]
async fn apply_update(
    connection: &mut PgConnection,
    row: &TableRow,
    update: &TableUpdate,
) -> Result<(), ErrorModel> {
    let table_id = row.id;
    tracing::debug!("Applying update {} to table {table_id}", update.action_name());

    match update {
        TableUpdate::AssignUuid { uuid } => {
            sqlx::query("UPDATE tables SET table_uuid = $1, updated_at = now() WHERE id = $2")
                .bind(uuid)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error assigning table uuid"))?;
        }
        TableUpdate::UpgradeFormatVersion { format_version } => {
            sqlx::query("UPDATE tables SET format_version = $1, updated_at = now() WHERE id = $2")
                .bind(format_version)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error upgrading format version"))?;
        }
        TableUpdate::AddSchema { schema, .. } => {
            let mut schema: Schema = schema.clone();
            let schema_id = match schema.schema_id {
                Some(schema_id) => schema_id,
                None => {
                    let next = max_schema_id(&mut *connection, table_id).await? + 1;
                    schema.schema_id = Some(next);
                    next
                }
            };

            let last_column_id = row.last_column_id.max(schema.highest_field_id());

            sqlx::query("INSERT INTO schemas (table_id, schema_id, schema_json) VALUES ($1, $2, $3)")
                .bind(table_id)
                .bind(schema_id)
                .bind(Json(&schema))
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error inserting schema"))?;

            sqlx::query("UPDATE tables SET last_column_id = $1, updated_at = now() WHERE id = $2")
                .bind(last_column_id)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error advancing last column id"))?;
        }
        TableUpdate::SetCurrentSchema { schema_id } => {
            let schema_id = if *schema_id == -1 {
                max_schema_id(&mut *connection, table_id).await?.max(0)
            } else {
                *schema_id
            };
            sqlx::query("UPDATE tables SET current_schema_id = $1, updated_at = now() WHERE id = $2")
                .bind(schema_id)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error setting current schema"))?;
        }
        TableUpdate::AddSpec { spec } => {
            let mut spec = spec.clone();
            let spec_id = match spec.spec_id {
                Some(spec_id) => spec_id,
                None => {
                    let next = max_spec_id(&mut *connection, table_id).await? + 1;
                    spec.spec_id = Some(next);
                    next
                }
            };

            let mut last_partition_id = row.last_partition_id;
            assign_partition_field_ids(&mut spec, &mut last_partition_id);

            sqlx::query(
                "INSERT INTO partition_specs (table_id, spec_id, spec_json) VALUES ($1, $2, $3)",
            )
            .bind(table_id)
            .bind(spec_id)
            .bind(Json(&spec))
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error inserting partition spec"))?;

            sqlx::query(
                "UPDATE tables SET last_partition_id = $1, updated_at = now() WHERE id = $2",
            )
            .bind(last_partition_id)
            .bind(table_id)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error advancing last partition id"))?;
        }
        TableUpdate::SetDefaultSpec { spec_id } => {
            let spec_id = if *spec_id == -1 {
                max_spec_id(&mut *connection, table_id).await?.max(0)
            } else {
                *spec_id
            };
            sqlx::query("UPDATE tables SET default_spec_id = $1, updated_at = now() WHERE id = $2")
                .bind(spec_id)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error setting default spec"))?;
        }
        TableUpdate::AddSortOrder { sort_order } => {
            sqlx::query(
                "INSERT INTO sort_orders (table_id, order_id, order_json) VALUES ($1, $2, $3)",
            )
            .bind(table_id)
            .bind(sort_order.order_id)
            .bind(Json(sort_order))
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error inserting sort order"))?;
        }
        TableUpdate::SetDefaultSortOrder { sort_order_id } => {
            let sort_order_id = if *sort_order_id == -1 {
                max_sort_order_id(&mut *connection, table_id).await?
            } else {
                *sort_order_id
            };
            sqlx::query(
                "UPDATE tables SET default_sort_order_id = $1, updated_at = now() WHERE id = $2",
            )
            .bind(sort_order_id)
            .bind(table_id)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error setting default sort order"))?;
        }
        TableUpdate::AddSnapshot { snapshot } => {
            sqlx::query(
                r"
                INSERT INTO snapshots (
                    table_id, snapshot_id, parent_snapshot_id, sequence_number,
                    timestamp_ms, manifest_list, summary, schema_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(table_id)
            .bind(snapshot.snapshot_id)
            .bind(snapshot.parent_snapshot_id)
            .bind(snapshot.sequence_number)
            .bind(snapshot.timestamp_ms)
            .bind(&snapshot.manifest_list)
            .bind(Json(&snapshot.summary))
            .bind(snapshot.schema_id)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error inserting snapshot"))?;

            sqlx::query(
                r"
                UPDATE tables SET
                    current_snapshot_id = $1,
                    last_sequence_number = GREATEST(last_sequence_number, $2),
                    updated_at = now()
                WHERE id = $3
                ",
            )
            .bind(snapshot.snapshot_id)
            .bind(snapshot.sequence_number)
            .bind(table_id)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error advancing snapshot pointers"))?;
        }
        TableUpdate::SetSnapshotRef { ref_name, reference } => {
            let snapshot_exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM snapshots WHERE table_id = $1 AND snapshot_id = $2)",
            )
            .bind(table_id)
            .bind(reference.snapshot_id)
            .fetch_one(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error validating snapshot ref target"))?;
            if !snapshot_exists {
                return Err(ErrorModel::bad_request(
                    format!(
                        "Cannot set ref {ref_name}: snapshot {} does not exist",
                        reference.snapshot_id
                    ),
                    "BadRequestException",
                    None,
                ));
            }

            sqlx::query(
                r"
                INSERT INTO snapshot_refs (
                    table_id, name, snapshot_id, type,
                    min_snapshots_to_keep, max_snapshot_age_ms, max_ref_age_ms
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (table_id, name) DO UPDATE SET
                    snapshot_id = EXCLUDED.snapshot_id,
                    type = EXCLUDED.type,
                    min_snapshots_to_keep = EXCLUDED.min_snapshots_to_keep,
                    max_snapshot_age_ms = EXCLUDED.max_snapshot_age_ms,
                    max_ref_age_ms = EXCLUDED.max_ref_age_ms,
                    updated_at = now()
                ",
            )
            .bind(table_id)
            .bind(ref_name)
            .bind(reference.snapshot_id)
            .bind(reference.ref_type.to_string())
            .bind(reference.min_snapshots_to_keep)
            .bind(reference.max_snapshot_age_ms)
            .bind(reference.max_ref_age_ms)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error upserting snapshot ref"))?;
        }
        TableUpdate::RemoveSnapshots { snapshot_ids } => {
            sqlx::query("DELETE FROM snapshots WHERE table_id = $1 AND snapshot_id = ANY($2)")
                .bind(table_id)
                .bind(snapshot_ids)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing snapshots"))?;
        }
        TableUpdate::RemoveSnapshotRef { ref_name } => {
            sqlx::query("DELETE FROM snapshot_refs WHERE table_id = $1 AND name = $2")
                .bind(table_id)
                .bind(ref_name)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing snapshot ref"))?;
        }
        TableUpdate::RemovePartitionSpecs { spec_ids } => {
            sqlx::query("DELETE FROM partition_specs WHERE table_id = $1 AND spec_id = ANY($2)")
                .bind(table_id)
                .bind(spec_ids)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing partition specs"))?;
        }
        TableUpdate::RemoveSchemas { schema_ids } => {
            sqlx::query("DELETE FROM schemas WHERE table_id = $1 AND schema_id = ANY($2)")
                .bind(table_id)
                .bind(schema_ids)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing schemas"))?;
        }
        TableUpdate::SetLocation { location } => {
            sqlx::query("UPDATE tables SET location = $1, updated_at = now() WHERE id = $2")
                .bind(location)
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error setting table location"))?;
        }
        TableUpdate::SetProperties { updates } => {
            let mut properties = row.properties.0.clone();
            for (key, value) in updates {
                properties.insert(key.clone(), value.clone());
            }
            sqlx::query("UPDATE tables SET properties = $1, updated_at = now() WHERE id = $2")
                .bind(Json(&properties))
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error setting table properties"))?;
        }
        TableUpdate::RemoveProperties { removals } => {
            let mut properties = row.properties.0.clone();
            for key in removals {
                // Removing an absent key is silent.
                properties.remove(key);
            }
            sqlx::query("UPDATE tables SET properties = $1, updated_at = now() WHERE id = $2")
                .bind(Json(&properties))
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing table properties"))?;
        }
        TableUpdate::SetStatistics { statistics } => {
            sqlx::query(
                r"
                INSERT INTO table_statistics (
                    table_id, snapshot_id, statistics_path,
                    file_size_in_bytes, file_footer_size_in_bytes, blob_metadata
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (table_id, snapshot_id) DO UPDATE SET
                    statistics_path = EXCLUDED.statistics_path,
                    file_size_in_bytes = EXCLUDED.file_size_in_bytes,
                    file_footer_size_in_bytes = EXCLUDED.file_footer_size_in_bytes,
                    blob_metadata = EXCLUDED.blob_metadata
                ",
            )
            .bind(table_id)
            .bind(statistics.snapshot_id)
            .bind(&statistics.statistics_path)
            .bind(statistics.file_size_in_bytes)
            .bind(statistics.file_footer_size_in_bytes)
            .bind(Json(&statistics.blob_metadata))
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error setting table statistics"))?;
        }
        TableUpdate::SetPartitionStatistics {
            partition_statistics,
        } => {
            sqlx::query(
                r"
                INSERT INTO partition_statistics (
                    table_id, snapshot_id, statistics_path, file_size_in_bytes
                ) VALUES ($1, $2, $3, $4)
                ON CONFLICT (table_id, snapshot_id) DO UPDATE SET
                    statistics_path = EXCLUDED.statistics_path,
                    file_size_in_bytes = EXCLUDED.file_size_in_bytes
                ",
            )
            .bind(table_id)
            .bind(partition_statistics.snapshot_id)
            .bind(&partition_statistics.statistics_path)
            .bind(partition_statistics.file_size_in_bytes)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error setting partition statistics"))?;
        }
        TableUpdate::RemoveStatistics { snapshot_id } => {
            sqlx::query("DELETE FROM table_statistics WHERE table_id = $1 AND snapshot_id = $2")
                .bind(table_id)
                .bind(snapshot_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error removing table statistics"))?;
        }
        TableUpdate::RemovePartitionStatistics { snapshot_id } => {
            sqlx::query(
                "DELETE FROM partition_statistics WHERE table_id = $1 AND snapshot_id = $2",
            )
            .bind(table_id)
            .bind(snapshot_id)
            .execute(&mut *connection)
            .await
            .map_err(|e| e.into_error_model("Error removing partition statistics"))?;
        }
        TableUpdate::EnableRowLineage => {
            sqlx::query("UPDATE tables SET row_lineage = TRUE, updated_at = now() WHERE id = $1")
                .bind(table_id)
                .execute(&mut *connection)
                .await
                .map_err(|e| e.into_error_model("Error enabling row lineage"))?;
        }
    }

    Ok(())
}

/// Validate a commit's requirements and apply its updates against one
/// table, then finalize: bump `last_updated_ms`, append a metadata-log
/// entry with a freshly minted metadata file name, and rematerialize the
/// document. Must run inside a surrounding transaction.
pub(crate) async fn apply_table_commit(
    connection: &mut PgConnection,
    namespace: &NamespaceIdent,
    table: &str,
    request: &CommitTableRequest,
) -> Result<CommitTableResponse, ErrorModel> {
    let Some(mut row) = fetch_table_row(&mut *connection, namespace, table).await? else {
        return Err(table_not_found(namespace, table));
    };
    let table_id = row.id;

    check_requirements(&mut *connection, &row, &request.requirements).await?;

    for update in &request.updates {
        apply_update(&mut *connection, &row, update).await?;
        // Later updates observe the effects of earlier ones.
        row = fetch_table_row_by_id(&mut *connection, table_id)
            .await?
            .ok_or_else(|| {
                ErrorModel::internal(
                    "Table disappeared mid-commit",
                    "InternalServerError",
                    None,
                )
            })?;
    }

    // Strictly advance the version stamp so successive commits never
    // share an ETag, even within one millisecond.
    let now_ms = chrono::Utc::now()
        .timestamp_millis()
        .max(row.last_updated_ms + 1);
    sqlx::query("UPDATE tables SET last_updated_ms = $1, updated_at = now() WHERE id = $2")
        .bind(now_ms)
        .bind(table_id)
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error stamping table update time"))?;
    row.last_updated_ms = now_ms;

    let metadata_location = format!(
        "{}/metadata/{:05}-{}.metadata.json",
        row.location,
        row.format_version,
        Uuid::new_v4()
    );
    sqlx::query(
        "INSERT INTO metadata_log (table_id, metadata_file, timestamp_ms) VALUES ($1, $2, $3)",
    )
    .bind(table_id)
    .bind(&metadata_location)
    .bind(now_ms)
    .execute(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error appending metadata log entry"))?;

    let children = fetch_table_children(&mut *connection, table_id, SnapshotsQuery::All).await?;
    let metadata = assemble_table_metadata(row.head(), children);

    tracing::info!("Committed {} updates to table {namespace}.{table}", request.updates.len());

    Ok(CommitTableResponse {
        metadata_location,
        metadata,
    })
}

/// Single-table commit endpoint flow: one backend transaction around
/// requirement validation, update application and finalization.
pub(crate) async fn update_table(
    state: CatalogState,
    namespace: &NamespaceIdent,
    table: &str,
    request: &CommitTableRequest,
) -> Result<CommitTableResponse, ErrorModel> {
    let mut transaction = PostgresTransaction::begin_write(state).await?;
    let response = apply_table_commit(transaction.transaction(), namespace, table, request).await?;
    transaction.commit().await?;
    Ok(response)
}

/// Multi-table transaction: all inner commits run inside one outer
/// transaction; any failure aborts the whole thing.
pub(crate) async fn commit_transaction(
    state: CatalogState,
    request: &CommitTransactionRequest,
) -> Result<(), ErrorModel> {
    let mut transaction = PostgresTransaction::begin_write(state).await?;
    let connection = &mut **transaction.transaction();

    let transaction_id = Uuid::new_v4();
    sqlx::query("INSERT INTO transactions (transaction_id, status) VALUES ($1, $2)")
        .bind(transaction_id)
        .bind("committing")
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error recording transaction"))?;

    for table_change in &request.table_changes {
        let Some(identifier) = &table_change.identifier else {
            return Err(ErrorModel::bad_request(
                "Table identifier is required for transaction changes",
                "BadRequestException",
                None,
            ));
        };

        apply_table_commit(
            &mut *connection,
            &identifier.namespace,
            &identifier.name,
            table_change,
        )
        .await?;
    }

    sqlx::query(
        "UPDATE transactions SET status = $1, updated_at = now() WHERE transaction_id = $2",
    )
    .bind("completed")
    .bind(transaction_id)
    .execute(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error completing transaction"))?;

    transaction.commit().await?;
    tracing::info!(
        "Committed transaction {transaction_id} with {} table changes",
        request.table_changes.len()
    );
    Ok(())
}
