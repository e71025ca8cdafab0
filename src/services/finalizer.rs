use crate::error::CheckoutError;
use crate::models::Chain;
use crate::services::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FinalizeParams {
    pub tier_name: String,
    pub method: Chain,
    pub tx_hash: String,
    pub fiat_amount: f64,
    pub payment_url: Option<String>,
}

#[derive(Serialize)]
struct VerifyPaymentBody<'a> {
    #[serde(rename = "tierName")]
    tier_name: &'a str,
    #[serde(rename = "transactionHash")]
    transaction_hash: &'a str,
    #[serde(rename = "paymentMethod")]
    payment_method: &'a str,
    amount: f64,
    currency: &'a str,
    #[serde(rename = "paymentUrl", skip_serializing_if = "Option::is_none")]
    payment_url: Option<&'a str>,
    verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    #[serde(default)]
    pub membership: Option<serde_json::Value>,
    #[serde(rename = "storefrontCredentials", default)]
    pub storefront_credentials: Option<serde_json::Value>,
    #[serde(rename = "emailSent", default)]
    pub email_sent: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reports an observed payment to the marketplace backend, which is the
/// actual verification authority and activates the membership. One POST, no
/// retries; a failed finalize means the buyer re-attempts checkout and
/// dedup is the backend's concern.
pub struct PaymentFinalizer {
    client: reqwest::Client,
    backend_url: String,
    session: Arc<SessionStore>,
}

impl PaymentFinalizer {
    pub fn new(backend_url: &str, session: Arc<SessionStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub async fn finalize(
        &self,
        params: &FinalizeParams,
    ) -> Result<VerifyPaymentResponse, CheckoutError> {
        let body = VerifyPaymentBody {
            tier_name: &params.tier_name,
            transaction_hash: &params.tx_hash,
            payment_method: params.method.as_str(),
            amount: params.fiat_amount,
            currency: "USD",
            payment_url: params.payment_url.as_deref(),
            verified: true,
        };

        let url = format!("{}/membership/verify-payment", self.backend_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.session.bearer_token().await {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CheckoutError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = if text.is_empty() {
                status.to_string()
            } else {
                text
            };
            return Err(CheckoutError::Backend(detail));
        }

        let parsed: VerifyPaymentResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::Backend(format!("unreadable response: {}", e)))?;

        if !parsed.success {
            return Err(CheckoutError::Backend(
                parsed
                    .error
                    .unwrap_or_else(|| "backend rejected the payment".to_string()),
            ));
        }

        tracing::info!(
            tier = %params.tier_name,
            tx_hash = %params.tx_hash,
            "Membership activated"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{SessionState, StorageService};
    use serde_json::json;

    async fn finalizer(backend_url: &str, token: Option<&str>) -> PaymentFinalizer {
        let storage = Arc::new(StorageService::new("redis://127.0.0.1:1").await.unwrap());
        let session = Arc::new(SessionStore::new(storage));
        if let Some(token) = token {
            session
                .save(SessionState {
                    token: Some(token.to_string()),
                    login_type: Some("buyer".to_string()),
                })
                .await
                .unwrap();
        }
        PaymentFinalizer::new(backend_url, session)
    }

    fn params() -> FinalizeParams {
        FinalizeParams {
            tier_name: "pro".to_string(),
            method: Chain::Xrpl,
            tx_hash: "ABCDEF".to_string(),
            fiat_amount: 50.0,
            payment_url: Some("xumm://detect/request:r...".to_string()),
        }
    }

    #[tokio::test]
    async fn finalize_sends_verified_payload_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/membership/verify-payment")
            .match_header("authorization", "Bearer jwt-token")
            .match_body(mockito::Matcher::PartialJson(json!({
                "tierName": "pro",
                "transactionHash": "ABCDEF",
                "paymentMethod": "xrpl",
                "amount": 50.0,
                "currency": "USD",
                "verified": true
            })))
            .with_body(
                json!({"success": true, "membership": {"tier": "pro"}, "emailSent": true})
                    .to_string(),
            )
            .create_async()
            .await;

        let finalizer = finalizer(&server.url(), Some("jwt-token")).await;
        let result = finalizer.finalize(&params()).await.unwrap();
        assert!(result.success);
        assert!(result.email_sent);
        assert!(result.membership.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn finalize_is_safe_to_attempt_twice_for_the_same_hash() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/membership/verify-payment")
            .with_body(json!({"success": true}).to_string())
            .expect(2)
            .create_async()
            .await;

        let finalizer = finalizer(&server.url(), None).await;
        let first = finalizer.finalize(&params()).await.unwrap();
        let second = finalizer.finalize(&params()).await.unwrap();
        assert!(first.success && second.success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn backend_failure_is_surfaced_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/membership/verify-payment")
            .with_status(500)
            .with_body("escrow ledger mismatch")
            .create_async()
            .await;

        let finalizer = finalizer(&server.url(), None).await;
        let err = finalizer.finalize(&params()).await.unwrap_err();
        match err {
            CheckoutError::Backend(detail) => assert!(detail.contains("escrow ledger mismatch")),
            other => panic!("expected Backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn backend_level_rejection_is_a_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/membership/verify-payment")
            .with_body(
                json!({"success": false, "error": "transaction already consumed"}).to_string(),
            )
            .create_async()
            .await;

        let finalizer = finalizer(&server.url(), None).await;
        let err = finalizer.finalize(&params()).await.unwrap_err();
        match err {
            CheckoutError::Backend(detail) => {
                assert_eq!(detail, "transaction already consumed")
            }
            other => panic!("expected Backend error, got {:?}", other),
        }
    }
}
