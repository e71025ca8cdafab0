use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xrpb_checkout::{
    client::EvmWallet,
    config::Config,
    handlers::*,
    services::*,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    tracing::info!("Starting XRPB checkout API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let storage = Arc::new(StorageService::new(&config.redis_url).await?);
    let session = Arc::new(SessionStore::new(storage.clone()));
    session.load().await?;

    let xrpl = Arc::new(XrplService::new(
        &config.xrpl_rpc_url,
        config.xrpl_rpc_fallback.as_deref(),
    ));

    let evm = match (
        &config.evm_rpc_url,
        &config.evm_wallet_private_key,
        config.evm_recipient_address,
    ) {
        (Some(rpc_url), Some(private_key), Some(recipient)) => {
            let wallet = EvmWallet::new(
                rpc_url,
                private_key,
                config.evm_chain_id,
                config.evm_token_address,
                recipient,
                Duration::from_secs(config.evm_confirm_timeout_secs),
            )
            .await?;
            tracing::info!("EVM signer ready: {:?}", wallet.address());
            Some(Arc::new(wallet))
        }
        _ => None,
    };

    let oracle = Arc::new(PriceOracle::new(&config, storage.clone()));
    let analytics = Arc::new(Analytics::new(storage.clone()));
    let monitor = Arc::new(MonitorService::new(analytics.clone()));
    let initiator = Arc::new(PaymentInitiator::new(&config, storage.clone(), evm.clone()));
    let finalizer = Arc::new(PaymentFinalizer::new(&config.backend_api_url, session.clone()));

    // Build application state
    let app_state = AppState {
        config: config.clone(),
        oracle,
        initiator,
        monitor,
        finalizer,
        xrpl: xrpl.clone(),
        analytics: analytics.clone(),
    };

    let health_state = HealthState {
        storage: storage.clone(),
        xrpl,
        evm,
        analytics: analytics.clone(),
    };

    // Per-IP rate limiting
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(health_state)
        .route("/stats", get(get_stats))
        .with_state(analytics.clone())
        .route("/ws/dashboard", get(websocket_handler))
        .route("/prices", get(get_prices))
        .route("/checkout/initiate", post(initiate_checkout))
        .route("/checkout/status", get(checkout_status))
        .route("/checkout/cancel", post(cancel_checkout))
        .route("/checkout/finalize", post(finalize_checkout))
        .with_state(app_state)
        // Global middleware
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(axum::middleware::from_fn_with_state(
            analytics.clone(),
            track_requests,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    // ConnectInfo feeds the per-IP rate limit key extractor
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn track_requests(
    axum::extract::State(analytics): axum::extract::State<Arc<Analytics>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    analytics.record_request().await;
    next.run(request).await
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;

    // GovernorLayer takes the config behind an Arc since tower_governor 0.4
    #[test]
    fn rate_limiter_config_builds_behind_an_arc() {
        let conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(30)
                .finish()
                .unwrap(),
        );
        let _layer = GovernorLayer { config: conf };
    }
}
