use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A precondition on current table state that must hold for a commit to
/// apply. Unrecognized types deserialize into [`TableRequirement::Unknown`]
/// and always fail validation, so stale or newer clients are rejected
/// deterministically instead of silently ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRequirement {
    /// The table must not exist.
    AssertCreate,
    /// The table uuid must match the requirement's uuid.
    AssertTableUuid { uuid: Uuid },
    /// With `snapshot_id` unset the named ref must not exist; otherwise
    /// it must exist and point at the given snapshot.
    AssertRefSnapshotId {
        r#ref: String,
        snapshot_id: Option<i64>,
    },
    AssertLastAssignedFieldId { last_assigned_field_id: i32 },
    AssertCurrentSchemaId { current_schema_id: i32 },
    AssertLastAssignedPartitionId { last_assigned_partition_id: i32 },
    AssertDefaultSpecId { default_spec_id: i32 },
    AssertDefaultSortOrderId { default_sort_order_id: i64 },
    /// Any requirement whose `type` tag we do not recognize, kept
    /// verbatim for diagnostics.
    Unknown(serde_json::Value),
}

/// The wire shape of the recognized requirement types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum TaggedRequirement {
    AssertCreate,
    #[serde(rename_all = "kebab-case")]
    AssertTableUuid { uuid: Uuid },
    #[serde(rename_all = "kebab-case")]
    AssertRefSnapshotId {
        r#ref: String,
        snapshot_id: Option<i64>,
    },
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedFieldId { last_assigned_field_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertCurrentSchemaId { current_schema_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedPartitionId { last_assigned_partition_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSpecId { default_spec_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSortOrderId { default_sort_order_id: i64 },
}

const KNOWN_REQUIREMENT_TYPES: &[&str] = &[
    "assert-create",
    "assert-table-uuid",
    "assert-ref-snapshot-id",
    "assert-last-assigned-field-id",
    "assert-current-schema-id",
    "assert-last-assigned-partition-id",
    "assert-default-spec-id",
    "assert-default-sort-order-id",
];

impl From<TaggedRequirement> for TableRequirement {
    fn from(tagged: TaggedRequirement) -> Self {
        match tagged {
            TaggedRequirement::AssertCreate => TableRequirement::AssertCreate,
            TaggedRequirement::AssertTableUuid { uuid } => {
                TableRequirement::AssertTableUuid { uuid }
            }
            TaggedRequirement::AssertRefSnapshotId { r#ref, snapshot_id } => {
                TableRequirement::AssertRefSnapshotId { r#ref, snapshot_id }
            }
            TaggedRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id,
            } => TableRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id,
            },
            TaggedRequirement::AssertCurrentSchemaId { current_schema_id } => {
                TableRequirement::AssertCurrentSchemaId { current_schema_id }
            }
            TaggedRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id,
            } => TableRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id,
            },
            TaggedRequirement::AssertDefaultSpecId { default_spec_id } => {
                TableRequirement::AssertDefaultSpecId { default_spec_id }
            }
            TaggedRequirement::AssertDefaultSortOrderId {
                default_sort_order_id,
            } => TableRequirement::AssertDefaultSortOrderId {
                default_sort_order_id,
            },
        }
    }
}

impl From<&TableRequirement> for Option<TaggedRequirement> {
    fn from(requirement: &TableRequirement) -> Self {
        match requirement.clone() {
            TableRequirement::AssertCreate => Some(TaggedRequirement::AssertCreate),
            TableRequirement::AssertTableUuid { uuid } => {
                Some(TaggedRequirement::AssertTableUuid { uuid })
            }
            TableRequirement::AssertRefSnapshotId { r#ref, snapshot_id } => {
                Some(TaggedRequirement::AssertRefSnapshotId { r#ref, snapshot_id })
            }
            TableRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id,
            } => Some(TaggedRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id,
            }),
            TableRequirement::AssertCurrentSchemaId { current_schema_id } => {
                Some(TaggedRequirement::AssertCurrentSchemaId { current_schema_id })
            }
            TableRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id,
            } => Some(TaggedRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id,
            }),
            TableRequirement::AssertDefaultSpecId { default_spec_id } => {
                Some(TaggedRequirement::AssertDefaultSpecId { default_spec_id })
            }
            TableRequirement::AssertDefaultSortOrderId {
                default_sort_order_id,
            } => Some(TaggedRequirement::AssertDefaultSortOrderId {
                default_sort_order_id,
            }),
            TableRequirement::Unknown(_) => None,
        }
    }
}

impl Serialize for TableRequirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if let TableRequirement::Unknown(value) = self {
            return value.serialize(serializer);
        }
        match Option::<TaggedRequirement>::from(self) {
            Some(tagged) => tagged.serialize(serializer),
            None => Err(serde::ser::Error::custom("unrepresentable requirement")),
        }
    }
}

impl<'de> Deserialize<'de> for TableRequirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let tag = value.get("type").and_then(serde_json::Value::as_str);
        if tag.is_some_and(|tag| KNOWN_REQUIREMENT_TYPES.contains(&tag)) {
            TaggedRequirement::deserialize(&value)
                .map(TableRequirement::from)
                .map_err(serde::de::Error::custom)
        } else {
            Ok(TableRequirement::Unknown(value))
        }
    }
}

impl TableRequirement {
    /// The wire name of the requirement, used in failure messages.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            TableRequirement::AssertCreate => "assert-create",
            TableRequirement::AssertTableUuid { .. } => "assert-table-uuid",
            TableRequirement::AssertRefSnapshotId { .. } => "assert-ref-snapshot-id",
            TableRequirement::AssertLastAssignedFieldId { .. } => "assert-last-assigned-field-id",
            TableRequirement::AssertCurrentSchemaId { .. } => "assert-current-schema-id",
            TableRequirement::AssertLastAssignedPartitionId { .. } => {
                "assert-last-assigned-partition-id"
            }
            TableRequirement::AssertDefaultSpecId { .. } => "assert-default-spec-id",
            TableRequirement::AssertDefaultSortOrderId { .. } => "assert-default-sort-order-id",
            TableRequirement::Unknown(value) => value
                .get("type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_requirements_parse() {
        let requirement: TableRequirement = serde_json::from_value(serde_json::json!({
            "type": "assert-current-schema-id",
            "current-schema-id": 3
        }))
        .unwrap();
        assert_eq!(
            requirement,
            TableRequirement::AssertCurrentSchemaId {
                current_schema_id: 3
            }
        );
        assert_eq!(requirement.type_name(), "assert-current-schema-id");
    }

    #[test]
    fn test_ref_requirement_with_null_snapshot() {
        let requirement: TableRequirement = serde_json::from_value(serde_json::json!({
            "type": "assert-ref-snapshot-id",
            "ref": "main",
            "snapshot-id": null
        }))
        .unwrap();
        assert_eq!(
            requirement,
            TableRequirement::AssertRefSnapshotId {
                r#ref: "main".to_string(),
                snapshot_id: None
            }
        );
    }

    #[test]
    fn test_unknown_requirement_is_captured() {
        let requirement: TableRequirement = serde_json::from_value(serde_json::json!({
            "type": "assert-view-version",
            "version": 9
        }))
        .unwrap();
        assert!(matches!(requirement, TableRequirement::Unknown(_)));
        assert_eq!(requirement.type_name(), "assert-view-version");
    }

    #[test]
    fn test_malformed_known_requirement_is_an_error() {
        let result: Result<TableRequirement, _> = serde_json::from_value(serde_json::json!({
            "type": "assert-table-uuid",
            "uuid": "not-a-uuid"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_assert_create_roundtrip() {
        let requirement = TableRequirement::AssertCreate;
        let value = serde_json::to_value(&requirement).unwrap();
        assert_eq!(value, serde_json::json!({"type": "assert-create"}));
        let parsed: TableRequirement = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, requirement);
    }

    #[test]
    fn test_uuid_requirement_roundtrip() {
        let requirement = TableRequirement::AssertTableUuid {
            uuid: Uuid::new_v4(),
        };
        let value = serde_json::to_value(&requirement).unwrap();
        assert_eq!(value["type"], "assert-table-uuid");
        let parsed: TableRequirement = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, requirement);
    }
}
