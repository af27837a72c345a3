pub(crate) mod commit;
pub(crate) mod create;
pub(crate) mod load;

use std::collections::HashMap;

use icefloe_rest::{
    catalog::{
        metrics::ReportMetricsRequest,
        table::{ListTablesResponse, RenameTableRequest},
        NamespaceIdent, TableIdent,
    },
    ErrorModel,
};
use sqlx::{types::Json, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    dbutils::DBErrorHandler,
    namespace::{get_namespace_id, namespace_exists, namespace_not_found},
    pagination::{decode_page_token, encode_page_token},
};
use crate::{api::types::ListTablesQuery, service::metadata::TableHead, CONFIG};

/// Header row of the `tables` relation. The duplicated id columns are
/// authoritative over the JSON blobs in the child tables.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TableRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) table_uuid: Uuid,
    pub(crate) location: String,
    pub(crate) format_version: i32,
    pub(crate) last_updated_ms: i64,
    pub(crate) last_sequence_number: i64,
    pub(crate) last_column_id: i32,
    pub(crate) current_schema_id: i32,
    pub(crate) default_spec_id: i32,
    pub(crate) last_partition_id: i32,
    pub(crate) default_sort_order_id: i64,
    pub(crate) properties: Json<HashMap<String, String>>,
    pub(crate) current_snapshot_id: Option<i64>,
    pub(crate) row_lineage: Option<bool>,
    pub(crate) next_row_id: Option<i64>,
}

pub(crate) const TABLE_COLUMNS: &str = r"
    t.id, t.name, t.table_uuid, t.location, t.format_version,
    t.last_updated_ms, t.last_sequence_number, t.last_column_id,
    t.current_schema_id, t.default_spec_id, t.last_partition_id,
    t.default_sort_order_id, t.properties, t.current_snapshot_id,
    t.row_lineage, t.next_row_id";

impl TableRow {
    pub(crate) fn head(&self) -> TableHead {
        TableHead {
            table_uuid: self.table_uuid,
            location: self.location.clone(),
            format_version: self.format_version,
            last_updated_ms: self.last_updated_ms,
            last_sequence_number: self.last_sequence_number,
            last_column_id: self.last_column_id,
            current_schema_id: self.current_schema_id,
            default_spec_id: self.default_spec_id,
            last_partition_id: self.last_partition_id,
            default_sort_order_id: self.default_sort_order_id,
            current_snapshot_id: self.current_snapshot_id,
            properties: self.properties.0.clone(),
            row_lineage: self.row_lineage,
            next_row_id: self.next_row_id,
        }
    }
}

pub(crate) fn table_not_found(namespace: &NamespaceIdent, table: &str) -> ErrorModel {
    ErrorModel::not_found(
        format!("Table not found: {namespace}.{table}"),
        "NoSuchTableException",
        None,
    )
}

pub(crate) async fn table_exists<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    namespace: &NamespaceIdent,
    table: &str,
) -> Result<bool, ErrorModel> {
    let exists: bool = sqlx::query_scalar(
        r"
        SELECT EXISTS(
            SELECT 1 FROM tables t
            JOIN namespaces n ON t.namespace_id = n.id
            WHERE n.levels = $1 AND t.name = $2
        )",
    )
    .bind(namespace.levels().to_vec())
    .bind(table)
    .fetch_one(connection)
    .await
    .map_err(|e| e.into_error_model("Error checking table existence"))?;

    Ok(exists)
}

pub(crate) async fn fetch_table_row<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    namespace: &NamespaceIdent,
    table: &str,
) -> Result<Option<TableRow>, ErrorModel> {
    let query = format!(
        r"
        SELECT {TABLE_COLUMNS}
        FROM tables t
        JOIN namespaces n ON t.namespace_id = n.id
        WHERE n.levels = $1 AND t.name = $2"
    );

    sqlx::query_as(&query)
        .bind(namespace.levels().to_vec())
        .bind(table)
        .fetch_optional(connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching table"))
}

pub(crate) async fn fetch_table_row_by_id<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    table_id: i64,
) -> Result<Option<TableRow>, ErrorModel> {
    let query = format!("SELECT {TABLE_COLUMNS} FROM tables t WHERE t.id = $1");

    sqlx::query_as(&query)
        .bind(table_id)
        .fetch_optional(connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching table"))
}

pub(crate) async fn list_tables<'e, E: sqlx::PgExecutor<'e> + Copy>(
    connection: E,
    namespace: &NamespaceIdent,
    query: &ListTablesQuery,
) -> Result<ListTablesResponse, ErrorModel> {
    let Some(namespace_id) = get_namespace_id(connection, namespace).await? else {
        return Err(namespace_not_found(namespace));
    };

    let last_seen = query
        .page_token
        .as_deref()
        .map(decode_page_token)
        .transpose()?;
    let page_size = CONFIG.page_size_or_default(query.page_size);

    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT name FROM tables WHERE namespace_id = ");
    builder.push_bind(namespace_id);
    if let Some(last_seen) = last_seen {
        builder.push(" AND name > ");
        builder.push_bind(last_seen);
    }
    builder.push(" ORDER BY name LIMIT ");
    builder.push_bind(page_size + 1);

    let mut names: Vec<String> = builder
        .build_query_scalar()
        .fetch_all(connection)
        .await
        .map_err(|e| e.into_error_model("Error listing tables"))?;

    let has_more = names.len() > usize::try_from(page_size).unwrap_or(usize::MAX);
    if has_more {
        names.truncate(usize::try_from(page_size).unwrap_or(usize::MAX));
    }
    let next_page_token = if has_more {
        names.last().map(|name| encode_page_token(name))
    } else {
        None
    };

    Ok(ListTablesResponse {
        next_page_token,
        identifiers: names
            .into_iter()
            .map(|name| TableIdent::new(namespace.clone(), name))
            .collect(),
    })
}

pub(crate) async fn drop_table(
    namespace: &NamespaceIdent,
    table: &str,
    purge_requested: bool,
    connection: &mut PgConnection,
) -> Result<(), ErrorModel> {
    if !namespace_exists(&mut *connection, namespace).await? {
        return Err(namespace_not_found(namespace));
    }

    let Some(row) = fetch_table_row(&mut *connection, namespace, table).await? else {
        return Err(table_not_found(namespace, table));
    };

    // All child rows cascade with the table row.
    sqlx::query("DELETE FROM tables WHERE id = $1")
        .bind(row.id)
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error dropping table"))?;

    tracing::info!("Dropped table {namespace}.{table}");
    if purge_requested {
        // File-level cleanup is out of scope; the flag is only recorded.
        tracing::info!(
            "Purge requested for table {namespace}.{table} at location {}",
            row.location
        );
    }

    Ok(())
}

pub(crate) async fn rename_table(
    request: &RenameTableRequest,
    connection: &mut PgConnection,
) -> Result<(), ErrorModel> {
    let source = &request.source;
    let destination = &request.destination;

    let Some(source_namespace_id) = get_namespace_id(&mut *connection, &source.namespace).await?
    else {
        return Err(ErrorModel::not_found(
            format!("Source namespace not found: {}", source.namespace),
            "NoSuchNamespaceException",
            None,
        ));
    };
    let Some(destination_namespace_id) =
        get_namespace_id(&mut *connection, &destination.namespace).await?
    else {
        return Err(ErrorModel::not_found(
            format!("Destination namespace not found: {}", destination.namespace),
            "NoSuchNamespaceException",
            None,
        ));
    };

    if !table_exists(&mut *connection, &source.namespace, &source.name).await? {
        return Err(ErrorModel::not_found(
            format!("Source table not found: {source}"),
            "NoSuchTableException",
            None,
        ));
    }
    if table_exists(&mut *connection, &destination.namespace, &destination.name).await? {
        return Err(ErrorModel::conflict(
            format!("Destination table already exists: {destination}"),
            "AlreadyExistsException",
            None,
        ));
    }

    sqlx::query(
        r"
        UPDATE tables
        SET namespace_id = $1, name = $2, updated_at = now()
        WHERE namespace_id = $3 AND name = $4
        ",
    )
    .bind(destination_namespace_id)
    .bind(&destination.name)
    .bind(source_namespace_id)
    .bind(&source.name)
    .execute(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error renaming table"))?;

    tracing::info!("Renamed table {source} to {destination}");
    Ok(())
}

pub(crate) async fn report_metrics(
    namespace: &NamespaceIdent,
    table: &str,
    request: &ReportMetricsRequest,
    connection: &mut PgConnection,
) -> Result<(), ErrorModel> {
    let Some(row) = fetch_table_row(&mut *connection, namespace, table).await? else {
        return Err(table_not_found(namespace, table));
    };

    if request.is_scan_report() {
        sqlx::query(
            r"
            INSERT INTO operation_metrics (
                table_id, report_type, snapshot_id, filter_json,
                schema_id, projected_field_ids, projected_field_names,
                metrics_json, metadata_json
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(row.id)
        .bind(&request.report_type)
        .bind(request.snapshot_id)
        .bind(request.filter.as_ref().map(Json))
        .bind(request.schema_id)
        .bind(request.projected_field_ids.as_ref())
        .bind(request.projected_field_names.as_ref())
        .bind(Json(&request.metrics))
        .bind(request.metadata.as_ref().map(Json))
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error recording scan metrics"))?;
    } else {
        sqlx::query(
            r"
            INSERT INTO operation_metrics (
                table_id, report_type, snapshot_id, sequence_number,
                operation, metrics_json, metadata_json
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(row.id)
        .bind(&request.report_type)
        .bind(request.snapshot_id)
        .bind(request.sequence_number)
        .bind(request.operation.as_ref())
        .bind(Json(&request.metrics))
        .bind(request.metadata.as_ref().map(Json))
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error recording commit metrics"))?;
    }

    tracing::info!(
        "Recorded metrics for table {namespace}.{table}, report type: {}",
        request.report_type
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use icefloe_rest::{
        catalog::{update::TableUpdate, NamespaceIdent},
        spec::{Operation, Snapshot, Summary},
    };

    use super::*;
    use crate::implementations::postgres::{
        namespace::{self, tests::initialize_namespace},
        table::{commit, create::tests::initialize_table},
        CatalogState, PostgresTransaction,
    };

    pub(crate) fn ident(levels: &[&str]) -> NamespaceIdent {
        NamespaceIdent::from_vec(levels.iter().map(ToString::to_string).collect()).unwrap()
    }

    #[sqlx::test]
    async fn test_list_tables_pagination(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["n"]);
        initialize_namespace(state.clone(), &namespace, None).await;
        for name in ["t1", "t2", "t3"] {
            initialize_table(state.clone(), &namespace, name).await;
        }

        let page = list_tables(
            &pool,
            &namespace,
            &ListTablesQuery {
                page_size: Some(2),
                ..ListTablesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.identifiers.len(), 2);
        assert_eq!(page.identifiers[0].name, "t1");
        let token = page.next_page_token.expect("a third table exists");

        let page = list_tables(
            &pool,
            &namespace,
            &ListTablesQuery {
                page_token: Some(token),
                page_size: Some(2),
                ..ListTablesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.identifiers.len(), 1);
        assert_eq!(page.identifiers[0].name, "t3");
        assert_eq!(page.next_page_token, None);
    }

    #[sqlx::test]
    async fn test_list_tables_in_missing_namespace(pool: sqlx::PgPool) {
        let err = list_tables(&pool, &ident(&["missing"]), &ListTablesQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
        assert_eq!(err.r#type, "NoSuchNamespaceException");
    }

    #[sqlx::test]
    async fn test_drop_cascades_to_child_rows(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["n"]);
        initialize_namespace(state.clone(), &namespace, None).await;
        initialize_table(state.clone(), &namespace, "t").await;

        commit::update_table(
            state.clone(),
            &namespace,
            "t",
            &icefloe_rest::catalog::table::CommitTableRequest {
                identifier: None,
                requirements: vec![],
                updates: vec![TableUpdate::AddSnapshot {
                    snapshot: Snapshot {
                        snapshot_id: 1,
                        parent_snapshot_id: None,
                        sequence_number: 1,
                        timestamp_ms: chrono::Utc::now().timestamp_millis(),
                        manifest_list: "s3://b/t/metadata/snap-1.avro".to_string(),
                        summary: Summary {
                            operation: Operation::Append,
                            additional_properties: HashMap::new(),
                        },
                        schema_id: Some(0),
                    },
                }],
            },
        )
        .await
        .unwrap();

        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        drop_table(&namespace, "t", false, transaction.transaction())
            .await
            .unwrap();
        transaction.commit().await.unwrap();

        for child in [
            "schemas",
            "partition_specs",
            "sort_orders",
            "snapshots",
            "snapshot_refs",
            "metadata_log",
            "table_statistics",
            "partition_statistics",
        ] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {child}"))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{child} must be empty after cascade");
        }
    }

    #[sqlx::test]
    async fn test_drop_missing_table(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["n"]);
        initialize_namespace(state.clone(), &namespace, None).await;

        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = drop_table(&namespace, "missing", true, transaction.transaction())
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
        assert_eq!(err.r#type, "NoSuchTableException");
    }

    #[sqlx::test]
    async fn test_namespace_drop_blocked_until_table_dropped(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["n"]);
        initialize_namespace(state.clone(), &namespace, None).await;
        initialize_table(state.clone(), &namespace, "t").await;

        let mut transaction = PostgresTransaction::begin_write(state.clone()).await.unwrap();
        let err = namespace::drop_namespace(&namespace, transaction.transaction())
            .await
            .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "NamespaceNotEmptyException");
        transaction.rollback().await.unwrap();

        let mut transaction = PostgresTransaction::begin_write(state.clone()).await.unwrap();
        drop_table(&namespace, "t", false, transaction.transaction())
            .await
            .unwrap();
        namespace::drop_namespace(&namespace, transaction.transaction())
            .await
            .unwrap();
        transaction.commit().await.unwrap();
    }

    #[sqlx::test]
    async fn test_rename_across_namespaces(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let source_namespace = ident(&["a"]);
        let destination_namespace = ident(&["b"]);
        initialize_namespace(state.clone(), &source_namespace, None).await;
        initialize_namespace(state.clone(), &destination_namespace, None).await;
        initialize_table(state.clone(), &source_namespace, "t").await;

        let request = RenameTableRequest {
            source: TableIdent::new(source_namespace.clone(), "t"),
            destination: TableIdent::new(destination_namespace.clone(), "t"),
        };
        let mut transaction = PostgresTransaction::begin_write(state.clone()).await.unwrap();
        rename_table(&request, transaction.transaction()).await.unwrap();
        transaction.commit().await.unwrap();

        assert!(!table_exists(&pool, &source_namespace, "t").await.unwrap());
        assert!(table_exists(&pool, &destination_namespace, "t").await.unwrap());

        // The most specific error wins: a second rename of the same
        // source reports the missing source table.
        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = rename_table(&request, transaction.transaction())
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
        assert!(err.message.contains("Source table not found"));
    }

    #[sqlx::test]
    async fn test_rename_to_taken_name_conflicts(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["a"]);
        initialize_namespace(state.clone(), &namespace, None).await;
        initialize_table(state.clone(), &namespace, "t1").await;
        initialize_table(state.clone(), &namespace, "t2").await;

        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = rename_table(
            &RenameTableRequest {
                source: TableIdent::new(namespace.clone(), "t1"),
                destination: TableIdent::new(namespace.clone(), "t2"),
            },
            transaction.transaction(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "AlreadyExistsException");
    }

    #[sqlx::test]
    async fn test_report_metrics_shapes(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["n"]);
        initialize_namespace(state.clone(), &namespace, None).await;
        initialize_table(state.clone(), &namespace, "t").await;

        let mut connection = pool.acquire().await.unwrap();

        let scan: ReportMetricsRequest = serde_json::from_value(serde_json::json!({
            "report-type": "scan-report",
            "snapshot-id": 1,
            "filter": {"type": "eq", "term": "amt", "value": 5},
            "schema-id": 0,
            "projected-field-ids": [1],
            "projected-field-names": ["amt"],
            "metrics": {"result-data-files": {"unit": "count", "value": 1}}
        }))
        .unwrap();
        report_metrics(&namespace, "t", &scan, &mut connection)
            .await
            .unwrap();

        let commit_report: ReportMetricsRequest = serde_json::from_value(serde_json::json!({
            "report-type": "commit-report",
            "snapshot-id": 2,
            "sequence-number": 1,
            "operation": "append",
            "metrics": {}
        }))
        .unwrap();
        report_metrics(&namespace, "t", &commit_report, &mut connection)
            .await
            .unwrap();

        let report_types: Vec<String> = sqlx::query_scalar(
            "SELECT report_type FROM operation_metrics ORDER BY created_at, id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(report_types, vec!["scan-report", "commit-report"]);

        let err = report_metrics(&ident(&["missing"]), "t", &scan, &mut connection)
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
    }
}
