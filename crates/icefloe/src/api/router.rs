use anyhow::Context as _;
use axum::{
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::{self, TraceLayer},
};

use super::{prefix::rewrite_prefixed_paths, ApiContext};
use crate::{
    catalog::{config, credentials, namespaces, tables},
    CancellationToken, CONFIG,
};

/// Build the full catalog router. The prefix-rewrite middleware wraps
/// the router itself so `/{prefix}/v1/...` forms are normalized before
/// routing.
#[must_use]
pub fn new_full_router(context: ApiContext) -> Router {
    let v1_routes = Router::new()
        .route("/v1/config", get(config::get_config))
        .route(
            "/v1/{prefix}/namespaces",
            get(namespaces::list_namespaces).post(namespaces::create_namespace),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}",
            get(namespaces::get_namespace)
                .head(namespaces::namespace_exists)
                .delete(namespaces::drop_namespace),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}/properties",
            post(namespaces::update_namespace_properties),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}/tables",
            get(tables::list_tables).post(tables::create_table_handler),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
            get(tables::load_table)
                .head(tables::table_exists)
                .delete(tables::drop_table)
                .post(tables::update_table),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}/tables/{table}/credentials",
            get(tables::load_credentials),
        )
        .route(
            "/v1/{prefix}/namespaces/{namespace}/tables/{table}/metrics",
            post(tables::report_metrics),
        )
        .route("/v1/{prefix}/tables/rename", post(tables::rename_table))
        .route(
            "/v1/{prefix}/transactions/commit",
            post(tables::commit_transaction),
        )
        .route("/v1/{prefix}/credentials", post(credentials::create_credentials));

    Router::new()
        .merge(v1_routes)
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "ok"})) }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveHeadersLayer::new([
                    axum::http::header::AUTHORIZATION,
                ]))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                        .on_response(trace::DefaultOnResponse::new().level(tracing::Level::DEBUG)),
                )
                .layer(TimeoutLayer::new(CONFIG.request_timeout()))
                .layer(CatchPanicLayer::new()),
        )
        .layer(axum::middleware::from_fn(rewrite_prefixed_paths))
        .with_state(context)
}

/// Serve the given router on the given listener until the shutdown
/// token fires, then drain in-flight requests.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let drain_signal = async move {
        shutdown.cancelled().await;
        tracing::info!("Shutting down catalog server, draining in-flight requests");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(drain_signal)
        .await
        .context("catalog server exited with an error")
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, response::IntoResponse};
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    use super::*;

    /// A router with the same prefix middleware but inert handlers, so
    /// rewrites can be asserted without a live backend.
    fn echo_router() -> Router {
        async fn echo(uri: axum::http::Uri) -> impl IntoResponse {
            uri.to_string()
        }
        Router::new()
            .route("/v1/config", get(echo))
            .route("/v1/{prefix}/namespaces", get(echo))
            .layer(axum::middleware::from_fn(rewrite_prefixed_paths))
    }

    async fn get_body(router: Router, uri: &str) -> String {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_prefixed_namespace_route_resolves() {
        let body = get_body(echo_router(), "/tenant/v1/namespaces?page_size=1").await;
        assert_eq!(body, "/v1/tenant/namespaces?page_size=1");
    }

    #[tokio::test]
    async fn test_prefixed_config_route_resolves() {
        let body = get_body(echo_router(), "/wh1/v1/config").await;
        assert_eq!(body, "/v1/config?warehouse=wh1");
    }

    #[tokio::test]
    async fn test_unprefixed_routes_untouched() {
        let body = get_body(echo_router(), "/v1/tenant/namespaces").await;
        assert_eq!(body, "/v1/tenant/namespaces");
    }
}
