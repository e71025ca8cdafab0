use crate::{models::{ApiResponse, Stats}, services::Analytics};
use axum::{extract::State, Json};
use std::sync::Arc;

pub async fn get_stats(State(analytics): State<Arc<Analytics>>) -> Json<ApiResponse<Stats>> {
    Json(ApiResponse::new(analytics.get_stats().await))
}
