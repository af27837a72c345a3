use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::NamespaceIdent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateNamespaceRequest {
    pub namespace: NamespaceIdent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateNamespaceResponse {
    pub namespace: NamespaceIdent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GetNamespaceResponse {
    pub namespace: NamespaceIdent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListNamespacesResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub namespaces: Vec<NamespaceIdent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateNamespacePropertiesRequest {
    #[serde(default)]
    pub removals: Option<Vec<String>>,
    #[serde(default)]
    pub updates: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateNamespacePropertiesResponse {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

#[cfg(feature = "axum")]
mod axum_impls {
    use super::{
        CreateNamespaceResponse, GetNamespaceResponse, ListNamespacesResponse,
        UpdateNamespacePropertiesResponse,
    };

    macro_rules! impl_into_response {
        ($type:ty) => {
            impl axum::response::IntoResponse for $type {
                fn into_response(self) -> axum::response::Response {
                    axum::Json(self).into_response()
                }
            }
        };
    }

    impl_into_response!(CreateNamespaceResponse);
    impl_into_response!(GetNamespaceResponse);
    impl_into_response!(ListNamespacesResponse);
    impl_into_response!(UpdateNamespacePropertiesResponse);
}
