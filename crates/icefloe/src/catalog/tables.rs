use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use super::parse_namespace_path;
use crate::{
    api::{
        types::{DropTableQuery, ListTablesQuery, LoadTableQuery},
        ApiContext, CommitTableRequest, CommitTransactionRequest, CreateTableRequest, ETag,
        Json, ListTablesResponse, LoadCredentialsResponse, RenameTableRequest,
        ReportMetricsRequest, Result,
    },
    implementations::postgres::{
        credentials,
        dbutils::DBErrorHandler as _,
        table::{
            self, commit,
            create::create_table,
            load::build_load_table_result,
        },
        PostgresTransaction,
    },
};

fn etag_header_map(etag: &ETag) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = etag.as_str().parse::<HeaderValue>() {
        headers.insert(header::ETAG, value);
    }
    headers
}

pub(crate) async fn list_tables(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
    Query(query): Query<ListTablesQuery>,
) -> Result<ListTablesResponse> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("List tables request for namespace {namespace}");
    let response = table::list_tables(&context.catalog.read_pool(), &namespace, &query).await?;
    Ok(response)
}

pub(crate) async fn create_table_handler(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
    Json(request): Json<CreateTableRequest>,
) -> Result<Response> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("Create table request: {namespace}.{}", request.name);

    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    let result = create_table(&namespace, request, transaction.transaction()).await?;
    transaction.commit().await?;

    Ok(result.into_response())
}

pub(crate) async fn load_table(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
    Query(query): Query<LoadTableQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let namespace = parse_namespace_path(&namespace)?;
    let snapshots = query.snapshots.unwrap_or_default();
    tracing::info!("Load table request: {namespace}.{table}, snapshots: {snapshots:?}");

    let mut connection = context
        .catalog
        .read_pool()
        .acquire()
        .await
        .map_err(|e| e.into_error_model("Failed to acquire connection"))?;

    let Some(row) = table::fetch_table_row(&mut *connection, &namespace, &table).await? else {
        return Err(table::table_not_found(&namespace, &table).into());
    };
    let etag = ETag::for_table(row.table_uuid, row.last_updated_ms);

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    if if_none_match.is_some_and(|candidate| etag.matches(candidate)) {
        if let Some(mut cached) = context.table_cache.get(&namespace, &table).await {
            // Credentials are refreshed even when the metadata is
            // unchanged, so cached bodies never hand out stale ones.
            tracing::info!("Table {namespace}.{table} not modified, serving cached body");
            let config = credentials::get_table_config(&mut *connection, &row.location).await?;
            let storage_credentials = credentials::get_storage_credentials_lenient(
                &mut connection,
                row.id,
                &row.location,
                namespace.root(),
            )
            .await;
            cached.config = Some(config);
            cached.storage_credentials = Some(storage_credentials);
            return Ok(cached.into_response());
        }

        tracing::info!("Table {namespace}.{table} not modified, returning 304");
        return Ok((StatusCode::NOT_MODIFIED, etag_header_map(&etag)).into_response());
    }

    let result =
        build_load_table_result(&mut connection, &row, namespace.root(), snapshots).await?;
    context
        .table_cache
        .insert(&namespace, &table, result.clone())
        .await;

    Ok(result.into_response())
}

pub(crate) async fn table_exists(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let namespace = parse_namespace_path(&namespace)?;
    if table::table_exists(&context.catalog.read_pool(), &namespace, &table).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(table::table_not_found(&namespace, &table).into())
    }
}

pub(crate) async fn drop_table(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
    Query(query): Query<DropTableQuery>,
) -> Result<StatusCode> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!(
        "Drop table request: {namespace}.{table}, purge_requested: {}",
        query.purge_requested
    );
    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    table::drop_table(
        &namespace,
        &table,
        query.purge_requested,
        transaction.transaction(),
    )
    .await?;
    transaction.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn update_table(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
    Json(request): Json<CommitTableRequest>,
) -> Result<Response> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!(
        "Commit request for table {namespace}.{table} with {} requirements and {} updates",
        request.requirements.len(),
        request.updates.len()
    );
    let response = commit::update_table(context.catalog, &namespace, &table, &request).await?;
    Ok(response.into_response())
}

pub(crate) async fn commit_transaction(
    State(context): State<ApiContext>,
    Path(_prefix): Path<String>,
    Json(request): Json<CommitTransactionRequest>,
) -> Result<StatusCode> {
    tracing::info!(
        "Transaction commit request with {} table changes",
        request.table_changes.len()
    );
    commit::commit_transaction(context.catalog, &request).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn load_credentials(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
) -> Result<LoadCredentialsResponse> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("Load credentials request for table {namespace}.{table}");

    let mut connection = context
        .catalog
        .read_pool()
        .acquire()
        .await
        .map_err(|e| e.into_error_model("Failed to acquire connection"))?;

    let Some(row) = table::fetch_table_row(&mut *connection, &namespace, &table).await? else {
        return Err(table::table_not_found(&namespace, &table).into());
    };

    let storage_credentials = credentials::get_storage_credentials(
        &mut connection,
        row.id,
        &row.location,
        namespace.root(),
    )
    .await?;

    Ok(LoadCredentialsResponse {
        storage_credentials,
    })
}

pub(crate) async fn rename_table(
    State(context): State<ApiContext>,
    Path(_prefix): Path<String>,
    Json(request): Json<RenameTableRequest>,
) -> Result<StatusCode> {
    tracing::info!(
        "Rename table request: {} to {}",
        request.source,
        request.destination
    );
    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    table::rename_table(&request, transaction.transaction()).await?;
    transaction.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn report_metrics(
    State(context): State<ApiContext>,
    Path((_prefix, namespace, table)): Path<(String, String, String)>,
    Json(request): Json<ReportMetricsRequest>,
) -> Result<StatusCode> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("Metrics report for table {namespace}.{table}");

    let mut connection = context
        .catalog
        .write_pool()
        .acquire()
        .await
        .map_err(|e| e.into_error_model("Failed to acquire connection"))?;
    table::report_metrics(&namespace, &table, &request, &mut connection).await?;
    Ok(StatusCode::NO_CONTENT)
}
