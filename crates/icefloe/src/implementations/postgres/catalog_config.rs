use icefloe_rest::{catalog::config::CatalogConfig, ErrorModel};

use super::dbutils::DBErrorHandler;

const DEFAULT_CATALOG_NAME: &str = "default";
const FALLBACK_WAREHOUSE_LOCATION: &str = "s3://default-warehouse";

/// Stored config is tolerated both as a JSON object and as a JSON string
/// containing an object.
fn parse_config_json(value: serde_json::Value) -> Option<CatalogConfig> {
    let value = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner).ok()?,
        other => other,
    };
    serde_json::from_value(value).ok()
}

async fn fetch_config_row<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    catalog_name: &str,
) -> Result<Option<serde_json::Value>, ErrorModel> {
    sqlx::query_scalar("SELECT config_json FROM catalog_config WHERE catalog_name = $1")
        .bind(catalog_name)
        .fetch_optional(connection)
        .await
        .map_err(|e| e.into_error_model("Error fetching catalog configuration"))
}

/// Read catalog config for a warehouse, falling back to the `default`
/// row and finally to an empty config.
pub(crate) async fn get_config<'e, E: sqlx::PgExecutor<'e> + Copy>(
    connection: E,
    warehouse: Option<&str>,
) -> Result<CatalogConfig, ErrorModel> {
    let catalog_name = warehouse.unwrap_or(DEFAULT_CATALOG_NAME);
    tracing::debug!("Fetching configuration for catalog {catalog_name}");

    if let Some(config) = fetch_config_row(connection, catalog_name)
        .await?
        .and_then(parse_config_json)
    {
        return Ok(config);
    }

    if warehouse.is_some() {
        tracing::debug!("No configuration for {catalog_name}, falling back to default");
        if let Some(config) = fetch_config_row(connection, DEFAULT_CATALOG_NAME)
            .await?
            .and_then(parse_config_json)
        {
            return Ok(config);
        }
    }

    tracing::warn!("No catalog configuration found, returning empty config");
    Ok(CatalogConfig {
        endpoints: Some(Vec::new()),
        ..CatalogConfig::default()
    })
}

/// The warehouse location under which tables without an explicit
/// `location` are placed.
pub(crate) async fn get_default_warehouse_location<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
) -> String {
    let result: Result<Option<Option<String>>, _> = sqlx::query_scalar(
        r"
        SELECT config_json->'defaults'->>'warehouse.location'
        FROM catalog_config
        WHERE catalog_name = $1
        ",
    )
    .bind(DEFAULT_CATALOG_NAME)
    .fetch_optional(connection)
    .await;

    match result {
        Ok(Some(Some(location))) => location,
        Ok(_) => {
            tracing::warn!("Default warehouse location not configured, using fallback value");
            FALLBACK_WAREHOUSE_LOCATION.to_string()
        }
        Err(e) => {
            tracing::error!("Error fetching default warehouse location: {e}");
            FALLBACK_WAREHOUSE_LOCATION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_parse_config_json_accepts_object_and_string() {
        let object = serde_json::json!({"overrides": {"a": "1"}, "defaults": {}});
        let parsed = parse_config_json(object.clone()).unwrap();
        assert_eq!(parsed.overrides, HashMap::from([("a".into(), "1".into())]));

        let stringified = serde_json::Value::String(object.to_string());
        assert_eq!(parse_config_json(stringified).unwrap(), parsed);

        assert!(parse_config_json(serde_json::Value::String("not json".into())).is_none());
    }

    #[sqlx::test]
    async fn test_default_row_is_seeded(pool: sqlx::PgPool) {
        let config = get_config(&pool, None).await.unwrap();
        assert!(config.defaults.contains_key("warehouse.location"));
    }

    #[sqlx::test]
    async fn test_missing_warehouse_falls_back_to_default(pool: sqlx::PgPool) {
        let with_warehouse = get_config(&pool, Some("missing-warehouse")).await.unwrap();
        let default = get_config(&pool, None).await.unwrap();
        assert_eq!(with_warehouse, default);
    }

    #[sqlx::test]
    async fn test_warehouse_specific_row_wins(pool: sqlx::PgPool) {
        sqlx::query(
            "INSERT INTO catalog_config (catalog_name, config_json) VALUES ($1, $2)",
        )
        .bind("wh1")
        .bind(serde_json::json!({"overrides": {"scope": "wh1"}, "defaults": {}}))
        .execute(&pool)
        .await
        .unwrap();

        let config = get_config(&pool, Some("wh1")).await.unwrap();
        assert_eq!(config.overrides.get("scope"), Some(&"wh1".to_string()));
    }

    #[sqlx::test]
    async fn test_default_warehouse_location(pool: sqlx::PgPool) {
        let location = get_default_warehouse_location(&pool).await;
        assert!(!location.is_empty());
    }
}
