use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    /// Missing in blobs written before id assignment; repaired on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<i32>,
    pub source_id: i32,
    pub name: String,
    pub transform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<i32>,
    #[serde(default)]
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// The unpartitioned spec with id 0.
    #[must_use]
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: Some(0),
            fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_roundtrip() {
        let json = serde_json::json!({
            "spec-id": 1,
            "fields": [
                {"field-id": 1000, "source-id": 2, "name": "ts_day", "transform": "day"}
            ]
        });
        let spec: PartitionSpec = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(spec.spec_id, Some(1));
        assert_eq!(serde_json::to_value(&spec).unwrap(), json);
    }

    #[test]
    fn test_unpartitioned() {
        let spec = PartitionSpec::unpartitioned();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            serde_json::json!({"spec-id": 0, "fields": []})
        );
    }
}
