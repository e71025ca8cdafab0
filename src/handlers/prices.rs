use crate::{
    handlers::checkout::AppState,
    models::{ApiResponse, PriceBoard},
};
use axum::{extract::State, Json};

/// Current per-chain XRPB prices. Dead sources surface as `live: false`
/// with the fallback floor applied, so the storefront can keep quoting.
pub async fn get_prices(State(state): State<AppState>) -> Json<ApiResponse<PriceBoard>> {
    let prices = state.oracle.get_all_prices().await;
    Json(ApiResponse::new(PriceBoard::from(&prices)))
}
