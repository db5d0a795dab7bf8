use std::sync::Arc;

use fieldcheck_gateway::{app_router, AppState, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldcheck_gateway=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(GatewayConfig::from_env()?);
    tracing::info!("Starting fieldcheck-gateway with config: {:?}", config);

    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config)?;
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("fieldcheck-gateway listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
