//! Prefix-agnostic path rewriting.
//!
//! Clients configured with a catalog prefix send `/{prefix}/v1/...`,
//! which is rewritten to `/v1/{prefix}/...` before routing. The config
//! endpoint is special: `/{warehouse}/v1/config` becomes
//! `/v1/config?warehouse={warehouse}`, preserving any caller-supplied
//! `warehouse=` parameter.

use axum::{extract::Request, middleware::Next, response::Response};
use http::uri::{PathAndQuery, Uri};
use lazy_regex::regex_captures;

pub async fn rewrite_prefixed_paths(mut request: Request, next: Next) -> Response {
    if let Some(rewritten) = rewritten_uri(request.uri()) {
        tracing::debug!("Rewriting path '{}' to '{}'", request.uri(), rewritten);
        *request.uri_mut() = rewritten;
    }
    next.run(request).await
}

fn rewritten_uri(uri: &Uri) -> Option<Uri> {
    let path = uri.path();
    let query = uri.query();

    let path_and_query = if let Some((_, prefix)) = regex_captures!(r"^/([^/]+)/v1/config$", path) {
        if prefix == "v1" {
            return None;
        }
        match query {
            Some(q) if q.contains("warehouse=") => format!("/v1/config?{q}"),
            Some(q) => format!("/v1/config?{q}&warehouse={prefix}"),
            None => format!("/v1/config?warehouse={prefix}"),
        }
    } else if let Some((_, prefix, rest)) = regex_captures!(r"^/([^/]+)/v1/(.+)$", path) {
        if prefix == "v1" {
            return None;
        }
        match query {
            Some(q) => format!("/v1/{prefix}/{rest}?{q}"),
            None => format!("/v1/{prefix}/{rest}"),
        }
    } else {
        return None;
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = PathAndQuery::try_from(path_and_query).ok();
    Uri::from_parts(parts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(uri: &str) -> Option<String> {
        rewritten_uri(&uri.parse::<Uri>().unwrap()).map(|u| u.to_string())
    }

    #[test]
    fn test_prefixed_path_is_rewritten() {
        assert_eq!(
            rewrite("/tenant-a/v1/namespaces/acct/tables"),
            Some("/v1/tenant-a/namespaces/acct/tables".to_string())
        );
    }

    #[test]
    fn test_query_is_preserved() {
        assert_eq!(
            rewrite("/tenant-a/v1/namespaces?page_size=10"),
            Some("/v1/tenant-a/namespaces?page_size=10".to_string())
        );
    }

    #[test]
    fn test_canonical_path_untouched() {
        assert_eq!(rewrite("/v1/namespaces"), None);
        assert_eq!(rewrite("/v1/config"), None);
        assert_eq!(rewrite("/health"), None);
    }

    #[test]
    fn test_config_prefix_becomes_warehouse_param() {
        assert_eq!(
            rewrite("/wh1/v1/config"),
            Some("/v1/config?warehouse=wh1".to_string())
        );
    }

    #[test]
    fn test_config_existing_warehouse_param_wins() {
        assert_eq!(
            rewrite("/wh1/v1/config?warehouse=wh2"),
            Some("/v1/config?warehouse=wh2".to_string())
        );
    }

    #[test]
    fn test_config_other_params_are_kept() {
        assert_eq!(
            rewrite("/wh1/v1/config?foo=bar"),
            Some("/v1/config?foo=bar&warehouse=wh1".to_string())
        );
    }
}
