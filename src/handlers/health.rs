use crate::{
    client::EvmWallet,
    models::HealthStatus,
    services::{Analytics, StorageService, XrplService},
};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub storage: Arc<StorageService>,
    pub xrpl: Arc<XrplService>,
    pub evm: Option<Arc<EvmWallet>>,
    pub analytics: Arc<Analytics>,
}

pub async fn health_check(State(state): State<HealthState>) -> Json<HealthStatus> {
    let redis_ok = state.storage.ping().await.unwrap_or(false);
    let xrpl_ok = state.xrpl.ping().await;
    let evm_ok = match &state.evm {
        Some(wallet) => wallet.ping().await,
        None => false,
    };

    let status = if redis_ok && xrpl_ok {
        "healthy"
    } else if xrpl_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        xrpl_rpc: xrpl_ok,
        evm_wallet: evm_ok,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
