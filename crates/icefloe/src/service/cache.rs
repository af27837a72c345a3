use icefloe_rest::catalog::{table::LoadTableResult, NamespaceIdent};

/// Process-local cache of the last materialized load response per table.
///
/// Consulted only on conditional GETs whose `If-None-Match` equals the
/// current ETag, where it turns a bodyless 304 into a full 200 with
/// refreshed credentials. Entries are idempotent snapshots; the last
/// writer wins, and losing the whole cache is harmless because clients
/// must handle plain 304 responses anyway.
#[derive(Clone)]
pub struct TableResponseCache {
    inner: moka::future::Cache<String, LoadTableResult>,
}

impl TableResponseCache {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: moka::future::Cache::new(capacity),
        }
    }

    fn key(namespace: &NamespaceIdent, table: &str) -> String {
        format!("{}.{table}", namespace.levels().join("."))
    }

    pub async fn insert(&self, namespace: &NamespaceIdent, table: &str, result: LoadTableResult) {
        self.inner.insert(Self::key(namespace, table), result).await;
    }

    pub async fn get(&self, namespace: &NamespaceIdent, table: &str) -> Option<LoadTableResult> {
        self.inner.get(&Self::key(namespace, table)).await
    }
}

impl std::fmt::Debug for TableResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableResponseCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}
