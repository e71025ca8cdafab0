use crate::{
    config::Config,
    error::CheckoutError,
    models::{ApiResponse, Chain, PriceQuote},
    services::{
        Analytics, FinalizeParams, InitiateOutcome, MonitorService, MonitorState,
        MonitoringSession, PaymentFinalizer, PaymentInitiator, PriceOracle, VerifyPaymentResponse,
        XrplService,
    },
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub oracle: Arc<PriceOracle>,
    pub initiator: Arc<PaymentInitiator>,
    pub monitor: Arc<MonitorService>,
    pub finalizer: Arc<PaymentFinalizer>,
    pub xrpl: Arc<XrplService>,
    pub analytics: Arc<Analytics>,
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub tier_id: String,
    pub chain: Chain,
    pub fiat_amount: f64,
    #[serde(default)]
    pub mobile: bool,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub tier_name: String,
    pub method: Chain,
    pub tx_hash: String,
    pub amount: f64,
    pub payment_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Initiate outcome plus the quote the conversion was computed from, so the
/// storefront can show the rate it is committing to.
#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    #[serde(flatten)]
    pub outcome: InitiateOutcome,
    pub quote: PriceQuote,
}

/// Runs the front half of one checkout attempt: quote, validate, dispatch.
/// For XRPL this also (re)starts the single monitoring session; any prior
/// session is torn down first.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<ApiResponse<InitiateResponse>>, CheckoutError> {
    let prices = state.oracle.get_all_prices().await;
    let usd_per_token = prices.effective(request.chain);
    let quote = PriceQuote {
        chain: request.chain,
        usd_per_token,
        fetched_at: chrono::Utc::now(),
    };

    let intent = state.initiator.build_intent(
        &request.tier_id,
        request.chain,
        request.fiat_amount,
        usd_per_token,
    )?;

    let outcome = state.initiator.initiate(&intent, request.mobile).await?;

    if request.chain == Chain::Xrpl {
        let session = MonitoringSession {
            destination_address: intent.recipient_address.clone(),
            expected_amount: intent.token_amount,
            currency_code: intent.currency_code.clone(),
            issuer: intent.issuer.clone(),
            tolerance_fraction: state.config.tolerance_fraction,
            timeout: Duration::from_secs(state.config.monitor_timeout_secs),
            poll_interval: Duration::from_millis(state.config.poll_interval_ms),
            tx_page_limit: crate::services::monitor::DEFAULT_TX_PAGE_LIMIT,
        };
        state.monitor.start(session, state.xrpl.clone()).await;
    }

    state
        .analytics
        .record_checkout_started(request.chain.as_str(), request.fiat_amount)
        .await;

    Ok(Json(ApiResponse::new(InitiateResponse { outcome, quote })))
}

pub async fn checkout_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<MonitorState>> {
    Json(ApiResponse::new(state.monitor.status().await))
}

/// Cleanup contract for modal close / page teardown: stops the active
/// session's polling and countdown.
pub async fn cancel_checkout(
    State(state): State<AppState>,
) -> Json<ApiResponse<CancelResponse>> {
    let cancelled = state.monitor.cancel().await;
    Json(ApiResponse::new(CancelResponse { cancelled }))
}

pub async fn finalize_checkout(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>, CheckoutError> {
    let params = FinalizeParams {
        tier_name: request.tier_name,
        method: request.method,
        tx_hash: request.tx_hash,
        fiat_amount: request.amount,
        payment_url: request.payment_url,
    };

    let result = state.finalizer.finalize(&params).await?;
    state.analytics.record_payment_finalized();

    Ok(Json(ApiResponse::new(result)))
}
