use std::collections::HashMap;

use icefloe_rest::{catalog::table::StorageCredential, ErrorModel};
use sqlx::types::Json;

use super::dbutils::DBErrorHandler;

/// A stored credential row. `warehouse` is the storage prefix the
/// credential is valid for; `prefix` is the coarse namespace-level key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CredentialRow {
    pub(crate) prefix: String,
    pub(crate) warehouse: String,
    pub(crate) config: Json<HashMap<String, String>>,
}

/// Translation of stored credential keys into engine-side config keys.
/// Extending credential backends means extending this table.
const CONFIG_KEY_TRANSLATION: &[(&str, &str)] = &[
    ("region", "client.region"),
    ("access-key-id", "s3.access-key-id"),
    ("secret-access-key", "s3.secret-access-key"),
    ("session-token", "s3.session-token"),
];

pub(crate) fn translate_credential_config(
    config: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut table_config = HashMap::new();
    for (stored_key, config_key) in CONFIG_KEY_TRANSLATION {
        if let Some(value) = config.get(*stored_key) {
            table_config.insert((*config_key).to_string(), value.clone());
        }
    }
    if config.get("use-instance-credentials").map(String::as_str) == Some("true") {
        table_config.insert("s3.use-instance-credentials".to_string(), "true".to_string());
    }
    table_config
}

/// Conservative defaults when no credential matches a location.
pub(crate) fn default_table_config() -> HashMap<String, String> {
    HashMap::from_iter(vec![
        ("client.region".to_string(), "us-east-1".to_string()),
        ("s3.use-instance-credentials".to_string(), "true".to_string()),
    ])
}

/// Pick the global credential whose warehouse is the longest prefix of
/// `location`.
pub(crate) fn best_prefix_match<'a>(
    location: &str,
    credentials: &'a [CredentialRow],
) -> Option<&'a CredentialRow> {
    credentials
        .iter()
        .filter(|c| location.starts_with(&c.warehouse))
        .max_by_key(|c| c.warehouse.len())
}

/// Derive the `config` envelope field for a table from the best matching
/// global credential.
pub(crate) async fn get_table_config<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    location: &str,
) -> Result<HashMap<String, String>, ErrorModel> {
    let credentials: Vec<CredentialRow> = sqlx::query_as(
        "SELECT prefix, warehouse, config FROM storage_credentials WHERE table_id IS NULL",
    )
    .fetch_all(connection)
    .await
    .map_err(|e| e.into_error_model("Error fetching storage credentials"))?;

    match best_prefix_match(location, &credentials) {
        Some(matched) => {
            tracing::debug!(
                "Using credential with prefix={} warehouse={} for location {location}",
                matched.prefix,
                matched.warehouse
            );
            Ok(translate_credential_config(&matched.config))
        }
        None => {
            tracing::debug!("No matching credentials found for {location}, using defaults");
            Ok(default_table_config())
        }
    }
}

/// Resolve the ordered credential bundles for a table.
///
/// Precedence: table-scoped rows, then global rows by longest warehouse
/// prefix on the location, then global rows keyed by the root namespace
/// label. Returned bundles carry the matched warehouse as their `prefix`.
pub(crate) async fn get_storage_credentials(
    connection: &mut sqlx::PgConnection,
    table_id: i64,
    location: &str,
    namespace_root: &str,
) -> Result<Vec<StorageCredential>, ErrorModel> {
    let mut rows: Vec<CredentialRow> = sqlx::query_as(
        "SELECT prefix, warehouse, config FROM storage_credentials WHERE table_id = $1",
    )
    .bind(table_id)
    .fetch_all(&mut *connection)
    .await
    .map_err(|e| e.into_error_model("Error fetching table credentials"))?;

    if rows.is_empty() {
        rows = sqlx::query_as(
            r"
            SELECT prefix, warehouse, config FROM storage_credentials
            WHERE table_id IS NULL AND $1 LIKE (warehouse || '%')
            ORDER BY LENGTH(warehouse) DESC
            ",
        )
        .bind(location)
        .fetch_all(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching location credentials"))?;
    }

    if rows.is_empty() {
        rows = sqlx::query_as(
            r"
            SELECT prefix, warehouse, config FROM storage_credentials
            WHERE table_id IS NULL AND prefix = $1
            ORDER BY LENGTH(warehouse) DESC
            ",
        )
        .bind(namespace_root)
        .fetch_all(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching prefix credentials"))?;
    }

    Ok(rows
        .into_iter()
        .map(|row| StorageCredential {
            prefix: row.warehouse,
            config: row.config.0,
        })
        .collect())
}

/// Credential lookup failures must not fail table loads; degrade to an
/// empty list.
pub(crate) async fn get_storage_credentials_lenient(
    connection: &mut sqlx::PgConnection,
    table_id: i64,
    location: &str,
    namespace_root: &str,
) -> Vec<StorageCredential> {
    match get_storage_credentials(connection, table_id, location, namespace_root).await {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::warn!("Credential resolution failed, continuing without: {e}");
            Vec::new()
        }
    }
}

pub(crate) async fn get_credentials_id<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    prefix: &str,
    warehouse: &str,
    table_id: Option<i64>,
) -> Result<Option<i64>, ErrorModel> {
    let query = if table_id.is_some() {
        r"SELECT id FROM storage_credentials
          WHERE prefix = $1 AND warehouse = $2 AND table_id = $3"
    } else {
        r"SELECT id FROM storage_credentials
          WHERE prefix = $1 AND warehouse = $2 AND table_id IS NULL"
    };

    let mut q = sqlx::query_scalar(query).bind(prefix).bind(warehouse);
    if let Some(table_id) = table_id {
        q = q.bind(table_id);
    }
    q.fetch_optional(connection)
        .await
        .map_err(|e| e.into_error_model("Error retrieving credentials"))
}

/// Create or update a credential row, returning its id.
pub(crate) async fn upsert_credentials(
    connection: &mut sqlx::PgConnection,
    prefix: &str,
    warehouse: &str,
    config: &HashMap<String, String>,
    table_id: Option<i64>,
) -> Result<i64, ErrorModel> {
    if let Some(existing_id) =
        get_credentials_id(&mut *connection, prefix, warehouse, table_id).await?
    {
        let id: i64 = sqlx::query_scalar(
            "UPDATE storage_credentials SET config = $1, updated_at = now() WHERE id = $2 RETURNING id",
        )
        .bind(Json(config))
        .bind(existing_id)
        .fetch_one(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error updating credentials"))?;
        Ok(id)
    } else {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO storage_credentials (prefix, warehouse, config, table_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(prefix)
        .bind(warehouse)
        .bind(Json(config))
        .bind(table_id)
        .fetch_one(&mut *connection)
        .await
        .map_err(|e| e.into_error_model("Error inserting credentials"))?;
        Ok(id)
    }
}

/// Global credentials whose warehouse is a prefix of `location`, longest
/// first. Used to decide whether inline create-table credentials are
/// needed.
pub(crate) async fn get_credentials_for_location<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    location: &str,
) -> Result<Vec<CredentialRow>, ErrorModel> {
    sqlx::query_as(
        r"
        SELECT prefix, warehouse, config FROM storage_credentials
        WHERE table_id IS NULL AND $1 LIKE (warehouse || '%')
        ORDER BY LENGTH(warehouse) DESC
        ",
    )
    .bind(location)
    .fetch_all(connection)
    .await
    .map_err(|e| e.into_error_model("Error retrieving credentials for location"))
}
