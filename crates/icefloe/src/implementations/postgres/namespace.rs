use std::collections::HashMap;

use icefloe_rest::{
    catalog::{
        namespace::{
            CreateNamespaceRequest, CreateNamespaceResponse, GetNamespaceResponse,
            ListNamespacesResponse, UpdateNamespacePropertiesRequest,
            UpdateNamespacePropertiesResponse,
        },
        NamespaceIdent,
    },
    ErrorModel,
};
use sqlx::{types::Json, Postgres, QueryBuilder, Transaction};

use super::{
    dbutils::DBErrorHandler,
    pagination::{decode_namespace_token, encode_namespace_token},
};
use crate::{api::types::ListNamespacesQuery, CONFIG};

pub(crate) fn namespace_not_found(namespace: &NamespaceIdent) -> ErrorModel {
    ErrorModel::not_found(
        format!("Namespace not found: {namespace}"),
        "NoSuchNamespaceException",
        None,
    )
}

pub(crate) async fn namespace_exists<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    namespace: &NamespaceIdent,
) -> Result<bool, ErrorModel> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM namespaces WHERE levels = $1)",
    )
    .bind(namespace.levels().to_vec())
    .fetch_one(connection)
    .await
    .map_err(|e| e.into_error_model("Error checking namespace existence"))?;

    Ok(exists)
}

pub(crate) async fn get_namespace_id<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    namespace: &NamespaceIdent,
) -> Result<Option<i64>, ErrorModel> {
    sqlx::query_scalar("SELECT id FROM namespaces WHERE levels = $1")
        .bind(namespace.levels().to_vec())
        .fetch_optional(connection)
        .await
        .map_err(|e| e.into_error_model("Error resolving namespace id"))
}

pub(crate) async fn list_namespaces<'e, E: sqlx::PgExecutor<'e> + Copy>(
    connection: E,
    query: &ListNamespacesQuery,
) -> Result<ListNamespacesResponse, ErrorModel> {
    let parent = query
        .parent
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(NamespaceIdent::from_url_segment)
        .transpose()
        .map_err(|e| {
            ErrorModel::bad_request("Invalid parent namespace", "BadRequestException", Some(Box::new(e)))
        })?;

    if let Some(parent) = &parent {
        if !namespace_exists(connection, parent).await? {
            return Err(ErrorModel::not_found(
                format!("Parent namespace not found: {parent}"),
                "NoSuchNamespaceException",
                None,
            ));
        }
    }

    let token_levels = query
        .page_token
        .as_deref()
        .map(decode_namespace_token)
        .transpose()?;
    let page_size = CONFIG.page_size_or_default(query.page_size);

    let mut builder = QueryBuilder::<Postgres>::new("SELECT levels FROM namespaces");
    let mut keyword = " WHERE ";
    if let Some(parent) = &parent {
        // Children have exactly one more label and share the parent as
        // their prefix.
        let parent_len =
            i32::try_from(parent.len()).map_err(|e| {
                ErrorModel::bad_request("Parent namespace too deep", "BadRequestException", Some(Box::new(e)))
            })?;
        builder.push(keyword);
        builder.push("array_length(levels, 1) = ");
        builder.push_bind(parent_len + 1);
        builder.push(" AND levels[1:");
        builder.push_bind(parent_len);
        builder.push("] = ");
        builder.push_bind(parent.levels().to_vec());
        keyword = " AND ";
    }
    if let Some(last_seen) = &token_levels {
        builder.push(keyword);
        builder.push("levels > ");
        builder.push_bind(last_seen.clone());
    }
    builder.push(" ORDER BY levels LIMIT ");
    builder.push_bind(page_size + 1);

    let mut rows: Vec<Vec<String>> = builder
        .build_query_scalar()
        .fetch_all(connection)
        .await
        .map_err(|e| e.into_error_model("Error listing namespaces"))?;

    let has_more = rows.len() > usize::try_from(page_size).unwrap_or(usize::MAX);
    if has_more {
        rows.truncate(usize::try_from(page_size).unwrap_or(usize::MAX));
    }

    let next_page_token = if has_more {
        rows.last().map(|levels| encode_namespace_token(levels))
    } else {
        None
    };

    let namespaces = rows
        .into_iter()
        .map(|levels| {
            NamespaceIdent::from_vec(levels).map_err(|e| {
                ErrorModel::internal(
                    "Stored namespace has no labels",
                    "InternalServerError",
                    Some(Box::new(e)),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ListNamespacesResponse {
        next_page_token,
        namespaces,
    })
}

pub(crate) async fn create_namespace(
    request: CreateNamespaceRequest,
    transaction: &mut Transaction<'_, Postgres>,
) -> Result<CreateNamespaceResponse, ErrorModel> {
    let CreateNamespaceRequest {
        namespace,
        properties,
    } = request;

    if namespace_exists(&mut **transaction, &namespace).await? {
        return Err(ErrorModel::conflict(
            format!("Namespace already exists: {namespace}"),
            "AlreadyExistsException",
            None,
        ));
    }

    let properties = properties.unwrap_or_default();
    sqlx::query("INSERT INTO namespaces (levels, properties) VALUES ($1, $2)")
        .bind(namespace.levels().to_vec())
        .bind(Json(&properties))
        .execute(&mut **transaction)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => ErrorModel::conflict(
                format!("Namespace already exists: {namespace}"),
                "AlreadyExistsException",
                Some(Box::new(e)),
            ),
            _ => e.into_error_model("Error creating namespace"),
        })?;

    tracing::info!("Created namespace {namespace}");
    Ok(CreateNamespaceResponse {
        namespace,
        properties: Some(properties),
    })
}

pub(crate) async fn get_namespace<'e, E: sqlx::PgExecutor<'e>>(
    connection: E,
    namespace: &NamespaceIdent,
) -> Result<GetNamespaceResponse, ErrorModel> {
    let row: Option<(Vec<String>, Json<HashMap<String, String>>)> =
        sqlx::query_as("SELECT levels, properties FROM namespaces WHERE levels = $1")
            .bind(namespace.levels().to_vec())
            .fetch_optional(connection)
            .await
            .map_err(|e| e.into_error_model("Error getting namespace"))?;

    let Some((_, Json(properties))) = row else {
        return Err(namespace_not_found(namespace));
    };

    Ok(GetNamespaceResponse {
        namespace: namespace.clone(),
        properties: Some(properties),
    })
}

pub(crate) async fn drop_namespace(
    namespace: &NamespaceIdent,
    transaction: &mut Transaction<'_, Postgres>,
) -> Result<(), ErrorModel> {
    if !namespace_exists(&mut **transaction, namespace).await? {
        return Err(namespace_not_found(namespace));
    }

    let has_children: bool = sqlx::query_scalar(
        r"
        SELECT EXISTS(
            SELECT 1 FROM tables
            WHERE namespace_id = (SELECT id FROM namespaces WHERE levels = $1)
        ) OR EXISTS(
            SELECT 1 FROM views
            WHERE namespace_id = (SELECT id FROM namespaces WHERE levels = $1)
        )",
    )
    .bind(namespace.levels().to_vec())
    .fetch_one(&mut **transaction)
    .await
    .map_err(|e| e.into_error_model("Error checking namespace emptiness"))?;

    if has_children {
        return Err(ErrorModel::conflict(
            format!("Namespace is not empty: {namespace}"),
            "NamespaceNotEmptyException",
            None,
        ));
    }

    sqlx::query("DELETE FROM namespaces WHERE levels = $1")
        .bind(namespace.levels().to_vec())
        .execute(&mut **transaction)
        .await
        .map_err(|e| e.into_error_model("Error dropping namespace"))?;

    tracing::info!("Dropped namespace {namespace}");
    Ok(())
}

pub(crate) async fn update_namespace_properties(
    namespace: &NamespaceIdent,
    request: UpdateNamespacePropertiesRequest,
    transaction: &mut Transaction<'_, Postgres>,
) -> Result<UpdateNamespacePropertiesResponse, ErrorModel> {
    let removals = request.removals.unwrap_or_default();
    let updates = request.updates.unwrap_or_default();

    let conflicting: Vec<&String> = removals.iter().filter(|k| updates.contains_key(*k)).collect();
    if !conflicting.is_empty() {
        return Err(ErrorModel::unprocessable_entity(
            format!("Cannot remove and update the same property keys: {conflicting:?}"),
            "UnprocessableEntityException",
            None,
        ));
    }

    let row: Option<Json<HashMap<String, String>>> =
        sqlx::query_scalar("SELECT properties FROM namespaces WHERE levels = $1")
            .bind(namespace.levels().to_vec())
            .fetch_optional(&mut **transaction)
            .await
            .map_err(|e| e.into_error_model("Error reading namespace properties"))?;

    let Some(Json(mut properties)) = row else {
        return Err(namespace_not_found(namespace));
    };

    let mut removed = Vec::new();
    let mut missing = Vec::new();
    for key in removals {
        if properties.remove(&key).is_some() {
            removed.push(key);
        } else {
            missing.push(key);
        }
    }

    let mut updated = Vec::new();
    for (key, value) in updates {
        properties.insert(key.clone(), value);
        updated.push(key);
    }

    sqlx::query("UPDATE namespaces SET properties = $1, updated_at = now() WHERE levels = $2")
        .bind(Json(&properties))
        .bind(namespace.levels().to_vec())
        .execute(&mut **transaction)
        .await
        .map_err(|e| e.into_error_model("Error updating namespace properties"))?;

    Ok(UpdateNamespacePropertiesResponse {
        updated,
        removed,
        missing: if missing.is_empty() {
            None
        } else {
            Some(missing)
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::implementations::postgres::{CatalogState, PostgresTransaction};

    pub(crate) async fn initialize_namespace(
        state: CatalogState,
        namespace: &NamespaceIdent,
        properties: Option<HashMap<String, String>>,
    ) -> CreateNamespaceResponse {
        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();

        let response = create_namespace(
            CreateNamespaceRequest {
                namespace: namespace.clone(),
                properties,
            },
            transaction.transaction(),
        )
        .await
        .unwrap();

        transaction.commit().await.unwrap();
        response
    }

    fn ident(levels: &[&str]) -> NamespaceIdent {
        NamespaceIdent::from_vec(levels.iter().map(ToString::to_string).collect()).unwrap()
    }

    #[sqlx::test]
    async fn test_namespace_lifecycle(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["test"]);
        let properties = HashMap::from_iter(vec![
            ("key1".to_string(), "value1".to_string()),
            ("key2".to_string(), "value2".to_string()),
        ]);

        let response =
            initialize_namespace(state.clone(), &namespace, Some(properties.clone())).await;
        assert_eq!(response.namespace, namespace);
        assert_eq!(response.properties, Some(properties.clone()));

        assert!(namespace_exists(&pool, &namespace).await.unwrap());

        let response = get_namespace(&pool, &namespace).await.unwrap();
        assert_eq!(response.properties, Some(properties));

        let mut transaction = PostgresTransaction::begin_write(state.clone()).await.unwrap();
        drop_namespace(&namespace, transaction.transaction())
            .await
            .unwrap();
        transaction.commit().await.unwrap();

        assert!(!namespace_exists(&pool, &namespace).await.unwrap());
    }

    #[sqlx::test]
    async fn test_create_duplicate_namespace_conflicts(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["test"]);
        initialize_namespace(state.clone(), &namespace, None).await;

        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = create_namespace(
            CreateNamespaceRequest {
                namespace: namespace.clone(),
                properties: None,
            },
            transaction.transaction(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "AlreadyExistsException");
    }

    #[sqlx::test]
    async fn test_get_nonexistent_namespace(pool: sqlx::PgPool) {
        let err = get_namespace(&pool, &ident(&["missing"])).await.unwrap_err();
        assert_eq!(err.code, 404);
        assert_eq!(err.r#type, "NoSuchNamespaceException");
    }

    #[sqlx::test]
    async fn test_drop_nonexistent_namespace(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = drop_namespace(&ident(&["missing"]), transaction.transaction())
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
    }

    #[sqlx::test]
    async fn test_list_with_parent_filter(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        initialize_namespace(state.clone(), &ident(&["a"]), None).await;
        initialize_namespace(state.clone(), &ident(&["a", "b"]), None).await;
        initialize_namespace(state.clone(), &ident(&["a", "b", "c"]), None).await;
        initialize_namespace(state.clone(), &ident(&["ab"]), None).await;

        let response = list_namespaces(
            &pool,
            &ListNamespacesQuery {
                parent: Some("a".to_string()),
                ..ListNamespacesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(response.namespaces, vec![ident(&["a", "b"])]);

        let response = list_namespaces(&pool, &ListNamespacesQuery::default())
            .await
            .unwrap();
        // Only top-level filtering comes from parent; a bare list returns
        // every namespace ordered by path.
        assert_eq!(response.namespaces.len(), 4);

        let err = list_namespaces(
            &pool,
            &ListNamespacesQuery {
                parent: Some("missing".to_string()),
                ..ListNamespacesQuery::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 404);
    }

    #[sqlx::test]
    async fn test_list_pagination(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        for name in ["n1", "n2", "n3"] {
            initialize_namespace(state.clone(), &ident(&[name]), None).await;
        }

        let page = list_namespaces(
            &pool,
            &ListNamespacesQuery {
                page_size: Some(2),
                ..ListNamespacesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.namespaces, vec![ident(&["n1"]), ident(&["n2"])]);
        let token = page.next_page_token.expect("more rows exist");

        let page = list_namespaces(
            &pool,
            &ListNamespacesQuery {
                page_token: Some(token),
                page_size: Some(2),
                ..ListNamespacesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.namespaces, vec![ident(&["n3"])]);
        assert_eq!(page.next_page_token, None);
    }

    #[sqlx::test]
    async fn test_malformed_page_token(pool: sqlx::PgPool) {
        let err = list_namespaces(
            &pool,
            &ListNamespacesQuery {
                page_token: Some("???".to_string()),
                ..ListNamespacesQuery::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 400);
    }

    #[sqlx::test]
    async fn test_update_properties(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["test"]);
        initialize_namespace(
            state.clone(),
            &namespace,
            Some(HashMap::from_iter(vec![(
                "owner".to_string(),
                "finance".to_string(),
            )])),
        )
        .await;

        let mut transaction = PostgresTransaction::begin_write(state.clone()).await.unwrap();
        let response = update_namespace_properties(
            &namespace,
            UpdateNamespacePropertiesRequest {
                removals: Some(vec!["owner".to_string(), "ghost".to_string()]),
                updates: Some(HashMap::from_iter(vec![(
                    "steward".to_string(),
                    "data-eng".to_string(),
                )])),
            },
            transaction.transaction(),
        )
        .await
        .unwrap();
        transaction.commit().await.unwrap();

        assert_eq!(response.updated, vec!["steward".to_string()]);
        assert_eq!(response.removed, vec!["owner".to_string()]);
        assert_eq!(response.missing, Some(vec!["ghost".to_string()]));

        let stored = get_namespace(&pool, &namespace).await.unwrap();
        assert_eq!(
            stored.properties,
            Some(HashMap::from_iter(vec![(
                "steward".to_string(),
                "data-eng".to_string()
            )]))
        );
    }

    #[sqlx::test]
    async fn test_update_properties_key_conflict(pool: sqlx::PgPool) {
        let state = CatalogState::from_pools(pool.clone(), pool.clone());
        let namespace = ident(&["test"]);
        initialize_namespace(state.clone(), &namespace, None).await;

        let mut transaction = PostgresTransaction::begin_write(state).await.unwrap();
        let err = update_namespace_properties(
            &namespace,
            UpdateNamespacePropertiesRequest {
                removals: Some(vec!["k".to_string()]),
                updates: Some(HashMap::from_iter(vec![(
                    "k".to_string(),
                    "v".to_string(),
                )])),
            },
            transaction.transaction(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 422);
        assert_eq!(err.r#type, "UnprocessableEntityException");
    }
}
