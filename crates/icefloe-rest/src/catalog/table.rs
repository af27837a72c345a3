use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{requirement::TableRequirement, update::TableUpdate, TableIdent};
use crate::spec::{PartitionSpec, Schema, SortOrder, TableMetadata};

/// A credential bundle handed to engines. `prefix` is the matched
/// warehouse prefix so engines can pick bundles by longest-prefix match
/// against their own file URIs.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StorageCredential {
    pub prefix: String,
    pub config: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadCredentialsResponse {
    pub storage_credentials: Vec<StorageCredential>,
}

/// Inline credentials optionally supplied with a create-table request.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TableCredentials {
    pub config: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateTableRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_spec: Option<PartitionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_order: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_create: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<TableCredentials>,
}

/// Result used when a table is successfully loaded or created.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadTableResult {
    pub metadata_location: String,
    pub metadata: TableMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_credentials: Option<Vec<StorageCredential>>,
}

impl LoadTableResult {
    #[must_use]
    pub fn etag(&self) -> ETag {
        ETag::for_table(self.metadata.table_uuid, self.metadata.last_updated_ms)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListTablesResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub identifiers: Vec<TableIdent>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenameTableRequest {
    pub source: TableIdent,
    pub destination: TableIdent,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TableIdent>,
    #[serde(default)]
    pub requirements: Vec<TableRequirement>,
    #[serde(default)]
    pub updates: Vec<TableUpdate>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableResponse {
    pub metadata_location: String,
    pub metadata: TableMetadata,
}

impl CommitTableResponse {
    #[must_use]
    pub fn etag(&self) -> ETag {
        ETag::for_table(self.metadata.table_uuid, self.metadata.last_updated_ms)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTransactionRequest {
    pub table_changes: Vec<CommitTableRequest>,
}

/// Opaque version marker for conditional GETs. The wire form includes
/// the surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// `"{table_uuid}-{last_updated_ms}"`, quotes included.
    #[must_use]
    pub fn for_table(table_uuid: Uuid, last_updated_ms: i64) -> Self {
        ETag(format!("\"{table_uuid}-{last_updated_ms}\""))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a raw `If-None-Match` header value.
    #[must_use]
    pub fn matches(&self, if_none_match: &str) -> bool {
        self.0 == if_none_match
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        ETag(value.to_string())
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        ETag(value)
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "axum")]
mod axum_impls {
    use axum::{
        http::header::{self, HeaderMap, HeaderValue},
        response::IntoResponse,
    };

    use super::{CommitTableResponse, ETag, ListTablesResponse, LoadCredentialsResponse,
        LoadTableResult};

    fn etag_headers(etag: &ETag) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match etag.as_str().parse::<HeaderValue>() {
            Ok(value) => {
                headers.insert(header::ETAG, value);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to create valid ETag header from {}: {e}",
                    etag.as_str()
                );
            }
        }
        headers
    }

    impl IntoResponse for LoadTableResult {
        fn into_response(self) -> axum::response::Response {
            let headers = etag_headers(&self.etag());
            (headers, axum::Json(self)).into_response()
        }
    }

    impl IntoResponse for CommitTableResponse {
        fn into_response(self) -> axum::response::Response {
            let headers = etag_headers(&self.etag());
            (headers, axum::Json(self)).into_response()
        }
    }

    impl IntoResponse for ListTablesResponse {
        fn into_response(self) -> axum::response::Response {
            axum::Json(self).into_response()
        }
    }

    impl IntoResponse for LoadCredentialsResponse {
        fn into_response(self) -> axum::response::Response {
            axum::Json(self).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_format() {
        let uuid = Uuid::parse_str("0195c7ec-9f2c-7d83-9a61-0a1b2c3d4e5f").unwrap();
        let etag = ETag::for_table(uuid, 1_700_000_000_123);
        assert_eq!(
            etag.as_str(),
            "\"0195c7ec-9f2c-7d83-9a61-0a1b2c3d4e5f-1700000000123\""
        );
        assert!(etag.matches("\"0195c7ec-9f2c-7d83-9a61-0a1b2c3d4e5f-1700000000123\""));
        assert!(!etag.matches("\"0195c7ec-9f2c-7d83-9a61-0a1b2c3d4e5f-1700000000124\""));
    }

    #[test]
    fn test_create_table_request_parses_minimal_body() {
        let request: CreateTableRequest = serde_json::from_value(serde_json::json!({
            "name": "t1",
            "schema": {
                "type": "struct",
                "fields": [{"id": 1, "name": "amt", "type": "long", "required": true}]
            }
        }))
        .unwrap();
        assert_eq!(request.name, "t1");
        assert!(request.partition_spec.is_none());
        assert!(request.credentials.is_none());
    }

    #[test]
    fn test_commit_request_parses() {
        let request: CommitTableRequest = serde_json::from_value(serde_json::json!({
            "requirements": [{"type": "assert-current-schema-id", "current-schema-id": 0}],
            "updates": [{"action": "set-location", "location": "s3://b/t"}]
        }))
        .unwrap();
        assert_eq!(request.requirements.len(), 1);
        assert_eq!(request.updates.len(), 1);
    }
}
