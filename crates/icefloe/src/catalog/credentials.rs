use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use icefloe_rest::ErrorModel;

use crate::{
    api::{ApiContext, CredentialRequest, Json, Result},
    implementations::postgres::{credentials, dbutils::DBErrorHandler as _},
};

pub(crate) async fn create_credentials(
    State(context): State<ApiContext>,
    Path(_prefix): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> Result<StatusCode> {
    tracing::info!(
        "Create credentials request for prefix {}, warehouse {}",
        request.prefix,
        request.warehouse
    );

    let mut connection = context
        .catalog
        .write_pool()
        .acquire()
        .await
        .map_err(|e| e.into_error_model("Failed to acquire connection"))?;

    let existing = credentials::get_credentials_id(
        &mut *connection,
        &request.prefix,
        &request.warehouse,
        request.table_id,
    )
    .await?;

    if existing.is_some() && !request.overwrite {
        return Err(ErrorModel::conflict(
            "Credentials already exist. Set overwrite=true to update.",
            "AlreadyExistsException",
            None,
        )
        .into());
    }

    let credential_id = credentials::upsert_credentials(
        &mut connection,
        &request.prefix,
        &request.warehouse,
        &request.config,
        request.table_id,
    )
    .await?;

    tracing::info!("Credentials created/updated with id {credential_id}");
    Ok(StatusCode::CREATED)
}
