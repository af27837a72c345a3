use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Catalog configuration handed to clients on `GET /v1/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<String>>,
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for CatalogConfig {
    fn into_response(self) -> axum::response::Response {
        axum::Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_serializes_without_endpoints() {
        let value = serde_json::to_value(CatalogConfig::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"overrides": {}, "defaults": {}})
        );
    }
}
