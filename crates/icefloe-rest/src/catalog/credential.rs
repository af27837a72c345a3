use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/{prefix}/credentials`. Credentials are created
/// out-of-band of table lifecycles and matched by location prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub prefix: String,
    pub warehouse: String,
    pub config: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<i64>,
    #[serde(default)]
    pub overwrite: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_defaults_to_false() {
        let request: CredentialRequest = serde_json::from_value(serde_json::json!({
            "prefix": "acct",
            "warehouse": "s3://bucket/",
            "config": {"region": "eu-central-1"}
        }))
        .unwrap();
        assert!(!request.overwrite);
        assert_eq!(request.table_id, None);
    }
}
