//! HTTP handlers for the REST catalog surface.

pub mod config;
pub mod credentials;
pub mod namespaces;
pub mod tables;

use icefloe_rest::{catalog::NamespaceIdent, ErrorModel, IcebergErrorResponse};

/// Parse the `{namespace}` path segment (unit-separator encoded).
pub(crate) fn parse_namespace_path(segment: &str) -> Result<NamespaceIdent, IcebergErrorResponse> {
    NamespaceIdent::from_url_segment(segment).map_err(|e| {
        ErrorModel::bad_request(
            format!("Invalid namespace: {segment}"),
            "BadRequestException",
            Some(Box::new(e)),
        )
        .into()
    })
}
