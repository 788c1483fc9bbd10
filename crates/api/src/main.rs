use std::net::SocketAddr;

use anyhow::Result;
use crisis_api::{build_app, ApiConfig};
use crisis_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("crisis_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();
    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "crisis plan q&a api started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
