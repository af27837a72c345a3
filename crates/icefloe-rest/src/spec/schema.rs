use serde::{Deserialize, Serialize};

/// A single column of a table schema.
///
/// `field_type` is kept as raw JSON: primitive types are strings
/// (`"long"`, `"string"`, ...) while struct/list/map types are nested
/// objects. The catalog never interprets types, it only stores and
/// returns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StructField {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: serde_json::Value,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    #[serde(rename = "type", default = "struct_type")]
    pub schema_type: String,
    /// Missing in blobs written before id assignment; repaired on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
    #[serde(default)]
    pub fields: Vec<StructField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_field_ids: Option<Vec<i32>>,
}

fn struct_type() -> String {
    "struct".to_string()
}

impl Schema {
    /// The highest field id in this schema, or 0 for an empty schema.
    #[must_use]
    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }
}
