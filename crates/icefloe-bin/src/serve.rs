use icefloe::{
    api::{
        router::{new_full_router, serve as service_serve},
        ApiContext,
    },
    implementations::postgres::{
        build_pool_opts, get_reader_pool, get_writer_pool, migrate, CatalogState,
    },
    tokio, tracing, CancellationToken,
};

pub(crate) async fn serve(bind_addr: std::net::SocketAddr) -> Result<(), anyhow::Error> {
    let read_pool = get_reader_pool(build_pool_opts()).await?;
    let write_pool = get_writer_pool(build_pool_opts()).await?;

    migrate(&write_pool).await?;

    let catalog_state = CatalogState::from_pools(read_pool, write_pool);
    let router = new_full_router(ApiContext::new(catalog_state));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {bind_addr}");

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown_token.cancel();
        }
    });

    service_serve(listener, router, cancellation_token).await
}
