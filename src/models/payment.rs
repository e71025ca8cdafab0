use crate::models::Chain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One checkout attempt's worth of payment parameters. Never persisted;
/// built when the buyer confirms a chain and consumed by the initiator.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub tier_id: String,
    pub chain: Chain,
    pub fiat_amount: f64,
    pub token_amount: f64,
    pub recipient_address: String,
    pub currency_code: String,
    pub issuer: Option<String>,
}

/// Persisted when a mobile buyer is bounced out to the wallet app, so the
/// flow can be resumed after the app-switch round trip. Nothing in this
/// service replays it yet; resumption is a documented forward-compat stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingIntent {
    pub chain: Chain,
    pub fiat_amount: f64,
    pub token_amount: f64,
    pub recipient_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub tx_hash: String,
    pub chain: Chain,
    pub fiat_amount: f64,
    pub token_amount: f64,
    pub confirmed: bool,
    pub recorded_at: DateTime<Utc>,
}
