use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::parse_namespace_path;
use crate::{
    api::{
        types::ListNamespacesQuery, ApiContext, CreateNamespaceRequest, CreateNamespaceResponse,
        GetNamespaceResponse, Json, ListNamespacesResponse, Result,
        UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
    },
    implementations::postgres::{namespace, PostgresTransaction},
};

pub(crate) async fn list_namespaces(
    State(context): State<ApiContext>,
    Path(_prefix): Path<String>,
    Query(query): Query<ListNamespacesQuery>,
) -> Result<ListNamespacesResponse> {
    tracing::info!(
        "List namespaces request. parent: {:?}, page_token: {:?}, page_size: {:?}",
        query.parent,
        query.page_token,
        query.page_size
    );
    let response = namespace::list_namespaces(&context.catalog.read_pool(), &query).await?;
    Ok(response)
}

pub(crate) async fn create_namespace(
    State(context): State<ApiContext>,
    Path(_prefix): Path<String>,
    Json(request): Json<CreateNamespaceRequest>,
) -> Result<CreateNamespaceResponse> {
    tracing::info!("Create namespace request: {}", request.namespace);
    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    let response = namespace::create_namespace(request, transaction.transaction()).await?;
    transaction.commit().await?;
    Ok(response)
}

pub(crate) async fn get_namespace(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
) -> Result<GetNamespaceResponse> {
    let namespace = parse_namespace_path(&namespace)?;
    let response = namespace::get_namespace(&context.catalog.read_pool(), &namespace).await?;
    Ok(response)
}

pub(crate) async fn namespace_exists(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
) -> Result<StatusCode> {
    let namespace = parse_namespace_path(&namespace)?;
    if namespace::namespace_exists(&context.catalog.read_pool(), &namespace).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(namespace::namespace_not_found(&namespace).into())
    }
}

pub(crate) async fn drop_namespace(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
) -> Result<StatusCode> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("Drop namespace request: {namespace}");
    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    namespace::drop_namespace(&namespace, transaction.transaction()).await?;
    transaction.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn update_namespace_properties(
    State(context): State<ApiContext>,
    Path((_prefix, namespace)): Path<(String, String)>,
    Json(request): Json<UpdateNamespacePropertiesRequest>,
) -> Result<UpdateNamespacePropertiesResponse> {
    let namespace = parse_namespace_path(&namespace)?;
    tracing::info!("Update namespace properties request: {namespace}");
    let mut transaction = PostgresTransaction::begin_write(context.catalog).await?;
    let response =
        namespace::update_namespace_properties(&namespace, request, transaction.transaction())
            .await?;
    transaction.commit().await?;
    Ok(response)
}
