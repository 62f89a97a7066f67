use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voyage_relay::{router, AppState, Config, RelayService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyage_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    if config.llm.api_key().is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; chat requests will fail until it is configured");
    }
    tracing::info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        timeout_secs = config.llm.timeout_secs,
        max_history = ?config.llm.max_history,
        "Relay configured"
    );

    let relay = Arc::new(RelayService::new(config.llm.clone())?);

    let app = router(AppState::new(relay))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("🚢 Voyage estimator running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
