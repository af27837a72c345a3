use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListNamespacesQuery {
    pub parent: Option<String>,
    pub page_token: Option<String>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListTablesQuery {
    pub page_token: Option<String>,
    pub page_size: Option<i64>,
}

/// Which snapshots to include in a load response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotsQuery {
    #[default]
    All,
    Refs,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoadTableQuery {
    pub snapshots: Option<SnapshotsQuery>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DropTableQuery {
    #[serde(default)]
    pub purge_requested: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GetConfigQuery {
    pub warehouse: Option<String>,
}
