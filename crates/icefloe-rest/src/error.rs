use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// JSON wrapper for all error responses (non-2xx)
#[derive(Debug, Serialize, Deserialize)]
pub struct IcebergErrorResponse {
    pub error: ErrorModel,
}

/// JSON error payload returned in a response with further details on the error
#[derive(Default, Debug, TypedBuilder, Serialize, Deserialize)]
pub struct ErrorModel {
    /// Human-readable error message
    #[builder(setter(into))]
    pub message: String,
    /// Internal type definition of the error
    #[builder(setter(into))]
    pub r#type: String,
    /// HTTP response code
    pub code: u16,
    #[serde(skip)]
    #[builder(default)]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub stack: Vec<String>,
    #[serde(skip)]
    #[builder(default=uuid::Uuid::now_v7())]
    pub error_id: Uuid,
}

impl From<ErrorModel> for IcebergErrorResponse {
    fn from(value: ErrorModel) -> Self {
        IcebergErrorResponse { error: value }
    }
}

impl From<IcebergErrorResponse> for ErrorModel {
    fn from(value: IcebergErrorResponse) -> Self {
        value.error
    }
}

impl std::fmt::Display for IcebergErrorResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl StdError for ErrorModel {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Display for ErrorModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({}): {}", self.r#type, self.code, self.message)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.as_ref() {
            writeln!(f, "Caused by:")?;
            error_chain_fmt(&**source, f)?;
        }

        Ok(())
    }
}

fn error_chain_fmt(e: impl std::error::Error, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

impl ErrorModel {
    pub fn new(
        message: impl Into<String>,
        r#type: impl Into<String>,
        code: u16,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::builder()
            .message(message)
            .r#type(r#type)
            .code(code)
            .source(source)
            .build()
    }

    pub fn bad_request(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::BAD_REQUEST.as_u16(), source)
    }

    pub fn not_found(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::NOT_FOUND.as_u16(), source)
    }

    pub fn conflict(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::CONFLICT.as_u16(), source)
    }

    pub fn unprocessable_entity(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            source,
        )
    }

    pub fn internal(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            source,
        )
    }

    #[must_use]
    pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
        self.stack.push(detail.into());
        self
    }

    #[must_use]
    pub fn append_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.stack.extend(details);
        self
    }

    /// Drop the detail stack, e.g. before serializing a response outside
    /// of development mode.
    #[must_use]
    pub fn without_stack(mut self) -> Self {
        self.stack.clear();
        self
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for IcebergErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.error.code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error_id = %self.error.error_id, "{}", self.error);
        } else {
            tracing::debug!(error_id = %self.error.error_id, "{}", self.error);
        }

        (status, axum::Json(self)).into_response()
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorModel {
    fn into_response(self) -> axum::response::Response {
        IcebergErrorResponse::from(self).into_response()
    }
}
