pub mod prefix;
#[cfg(feature = "router")]
pub mod router;
pub mod types;

pub use icefloe_rest::{
    catalog::{
        config::CatalogConfig,
        credential::CredentialRequest,
        metrics::ReportMetricsRequest,
        namespace::{
            CreateNamespaceRequest, CreateNamespaceResponse, GetNamespaceResponse,
            ListNamespacesResponse, UpdateNamespacePropertiesRequest,
            UpdateNamespacePropertiesResponse,
        },
        requirement::TableRequirement,
        table::{
            CommitTableRequest, CommitTableResponse, CommitTransactionRequest, CreateTableRequest,
            ETag, ListTablesResponse, LoadCredentialsResponse, LoadTableResult,
            RenameTableRequest, StorageCredential,
        },
        update::TableUpdate,
        NamespaceIdent, TableIdent,
    },
    ErrorModel, IcebergErrorResponse,
};

use axum::extract::{FromRequest, Request};

use crate::{implementations::postgres::CatalogState, service::cache::TableResponseCache};

pub type Result<T, E = IcebergErrorResponse> = std::result::Result<T, E>;

/// `axum::Json` with rejections mapped onto the Iceberg error model:
/// malformed bodies are a 400 `BadRequestException`, not axum's
/// default 422.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = IcebergErrorResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ErrorModel::bad_request(
                rejection.body_text(),
                "BadRequestException",
                None,
            )
            .into()),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub catalog: CatalogState,
    pub table_cache: TableResponseCache,
}

impl ApiContext {
    #[must_use]
    pub fn new(catalog: CatalogState) -> Self {
        Self {
            catalog,
            table_cache: TableResponseCache::new(crate::CONFIG.table_response_cache_capacity),
        }
    }
}
