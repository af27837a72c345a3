use icefloe_rest::{
    catalog::{
        table::{CreateTableRequest, LoadTableResult},
        NamespaceIdent,
    },
    spec::{PartitionSpec, SortOrder, DEFAULT_FORMAT_VERSION},
    ErrorModel,
};
use sqlx::{types::Json, PgConnection};
use uuid::Uuid;

use super::table_exists;
use crate::{
    implementations::postgres::{
        catalog_config, credentials,
        dbutils::DBErrorHandler,
        namespace::{get_namespace_id, namespace_not_found},
    },
    service::metadata::{
        assemble_table_metadata, PartitionSpecRow, SchemaRow, SortOrderRow, TableChildRows,
        TableHead,
    },
};

const INITIAL_SCHEMA_ID: i32 = 0;
const INITIAL_SPEC_ID: i32 = 0;

/// The warehouse under which a location lives: its first three
/// slash-separated segments, e.g. `s3://bucket/`.
pub(crate) fn warehouse_of_location(location: &str) -> String {
    let parts: Vec<&str> = location.split('/').take(3).collect();
    format!("{}/", parts.join("/"))
}

/// Assign missing partition field ids sequentially from the running
/// `last_partition_id`, and raise it past any ids the client supplied.
pub(crate) fn assign_partition_field_ids(spec: &mut PartitionSpec, last_partition_id: &mut i32) {
    for field in &mut spec.fields {
        match field.field_id {
            Some(field_id) => {
                if field_id > *last_partition_id {
                    *last_partition_id = field_id;
                }
            }
            None => {
                *last_partition_id += 1;
                field.field_id = Some(*last_partition_id);
            }
        }
    }
}

pub(crate) async fn create_table(
    namespace: &NamespaceIdent,
    request: CreateTableRequest,
    connection: &mut PgConnection,
) -> Result<LoadTableResult, ErrorModel> {
    let Some(namespace_id) = get_namespace_id(&mut *connection, namespace).await? else {
        return Err(namespace_not_found(namespace));
    };

    if table_exists(&mut *connection, namespace, &request.name).await? {
        return Err(ErrorModel::conflict(
            format!("Table already exists: {namespace}.{}", request.name),
            "AlreadyExistsException",
            None,
        ));
    }

    let table_uuid = Uuid::new_v4();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let format_version = DEFAULT_FORMAT_VERSION;

    let location = match request.location {
        Some(location) => location,
        None => {
            let default_warehouse =
                catalog_config::get_default_warehouse_location(&mut *connection).await;
            format!(
                "{default_warehouse}/{}/{}",
                namespace.levels().join("."),
                request.name
            )
        }
    };

    let mut schema = request.schema;
    if schema.schema_id.is_none() {
        schema.schema_id = Some(INITIAL_SCHEMA_ID);
    }
    let last_column_id = schema.highest_field_id();

    let mut last_partition_id = 0;
    let mut partition_spec = request
        .partition_spec
        .unwrap_or_else(PartitionSpec::unpartitioned);
    if partition_spec.spec_id.is_none() {
        partition_spec.spec_id = Some(INITIAL_SPEC_ID);
    }
    assign_partition_field_ids(&mut partition_spec, &mut last_partition_id);

    let sort_order = request.write_order.unwrap_or_else(SortOrder::unsorted);
    let sort_order_id = sort_order.order_id;

    let properties = request.properties.unwrap_or_default();

    let table_id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO tables (
            namespace_id, name, table_uuid, location,
            last_updated_ms, last_column_id, schema_id,
            current_schema_id, default_spec_id, last_partition_id,
            default_sort_order_id, properties, format_version
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
        ) RETURNING id
        ",
    )
    .bind(namespace_id)
    .bind(&request.name)
    .bind(table_uuid)
    .bind(&location)
    .bind(now_ms)
    .bind(last_column_id)
    .bind(INITIAL_SCHEMA_ID)
    .bind(INITIAL_SCHEMA_ID)
    .bind(INITIAL_SPEC_ID)
    .bind(last_partition_id)
    .bind(sort_order_id)
    .bind(Json(&properties))
    .bind(format_version)
    .fetch_one(&mut *connection)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => ErrorModel::conflict(
            format!("Table already exists: {namespace}.{}", request.name),
            "AlreadyExistsException",
            Some(Box::new(e)),
        ),
        _ => e.into_error_model("Error creating table"),
    })?;

    sqlx::query("INSERT INTO schemas (table_id, schema_id, schema_json) VALUES ($1, $2, $3)")
        .bind(table_id)
        .bind(INITIAL_SCHEMA_ID)
        .bind(Json(&schema))
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error inserting initial schema"))?;

    sqlx::query("INSERT INTO partition_specs (table_id, spec_id, spec_json) VALUES ($1, $2, $3)")
        .bind(table_id)
        .bind(INITIAL_SPEC_ID)
        .bind(Json(&partition_spec))
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error inserting initial partition spec"))?;

    sqlx::query("INSERT INTO sort_orders (table_id, order_id, order_json) VALUES ($1, $2, $3)")
        .bind(table_id)
        .bind(sort_order_id)
        .bind(Json(&sort_order))
        .execute(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error inserting initial sort order"))?;

    if let Some(table_credentials) = &request.credentials {
        let existing =
            credentials::get_credentials_for_location(&mut *connection, &location).await?;
        if existing.is_empty() {
            let warehouse = warehouse_of_location(&location);
            let credential_id = credentials::upsert_credentials(
                &mut *connection,
                namespace.root(),
                &warehouse,
                &table_credentials.config,
                None,
            )
            .await?;
            tracing::debug!(
                "Added credentials with id {credential_id} for warehouse {warehouse}"
            );
        }
    }

    let head = TableHead {
        table_uuid,
        location: location.clone(),
        format_version,
        last_updated_ms: now_ms,
        last_sequence_number: 0,
        last_column_id,
        current_schema_id: INITIAL_SCHEMA_ID,
        default_spec_id: INITIAL_SPEC_ID,
        last_partition_id,
        default_sort_order_id: sort_order_id,
        current_snapshot_id: None,
        properties,
        row_lineage: None,
        next_row_id: None,
    };
    let children = TableChildRows {
        schemas: vec![SchemaRow {
            schema_id: INITIAL_SCHEMA_ID,
            schema,
        }],
        partition_specs: vec![PartitionSpecRow {
            spec_id: INITIAL_SPEC_ID,
            spec: partition_spec,
        }],
        sort_orders: vec![SortOrderRow {
            order_id: sort_order_id,
            order: sort_order,
        }],
        ..TableChildRows::default()
    };
    let metadata = assemble_table_metadata(head, children);

    let config = credentials::get_table_config(&mut *connection, &location).await?;
    let storage_credentials = credentials::get_storage_credentials_lenient(
        &mut *connection,
        table_id,
        &location,
        namespace.root(),
    )
    .await;

    tracing::info!("Created table {namespace}.{} with uuid {table_uuid}", request.name);

    Ok(LoadTableResult {
        metadata_location: format!("{location}/metadata/00000-{}.metadata.json", Uuid::new_v4()),
        metadata,
        config: Some(config),
        storage_credentials: Some(storage_credentials),
    })
}
