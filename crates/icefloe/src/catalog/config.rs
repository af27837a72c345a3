use axum::extract::{Query, State};

use crate::{
    api::{types::GetConfigQuery, ApiContext, CatalogConfig, Result},
    implementations::postgres::catalog_config,
};

pub(crate) async fn get_config(
    State(context): State<ApiContext>,
    Query(query): Query<GetConfigQuery>,
) -> Result<CatalogConfig> {
    tracing::info!("Config request for warehouse {:?}", query.warehouse);
    let config =
        catalog_config::get_config(&context.catalog.read_pool(), query.warehouse.as_deref())
            .await?;
    Ok(config)
}
