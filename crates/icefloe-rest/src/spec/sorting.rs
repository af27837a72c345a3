use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullOrder {
    NullsFirst,
    NullsLast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SortField {
    pub source_id: i32,
    pub transform: String,
    pub direction: SortDirection,
    pub null_order: NullOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SortOrder {
    pub order_id: i64,
    #[serde(default)]
    pub fields: Vec<SortField>,
}

impl SortOrder {
    /// The unsorted order with id 0.
    #[must_use]
    pub fn unsorted() -> Self {
        Self {
            order_id: 0,
            fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_roundtrip() {
        let json = serde_json::json!({
            "order-id": 1,
            "fields": [
                {"source-id": 3, "transform": "identity", "direction": "desc", "null-order": "nulls-first"}
            ]
        });
        let order: SortOrder = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(order.fields[0].direction, SortDirection::Desc);
        assert_eq!(order.fields[0].null_order, NullOrder::NullsFirst);
        assert_eq!(serde_json::to_value(&order).unwrap(), json);
    }
}
