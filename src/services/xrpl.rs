use crate::models::{AccountTxResponse, LedgerTransaction};
use crate::services::monitor::LedgerSource;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;

/// JSON-RPC client for a public XRPL node, with an optional fallback node
/// tried when the primary fails.
pub struct XrplService {
    client: reqwest::Client,
    primary: String,
    fallback: Option<String>,
}

impl XrplService {
    pub fn new(primary: &str, fallback: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            primary: primary.to_string(),
            fallback: fallback.map(str::to_string),
        }
    }

    async fn account_tx(
        &self,
        url: &str,
        account: &str,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>> {
        let body = json!({
            "method": "account_tx",
            "params": [{
                "account": account,
                "ledger_index_min": -1,
                "ledger_index_max": -1,
                "limit": limit,
                "forward": false
            }]
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("account_tx request failed")?;

        if !response.status().is_success() {
            bail!("ledger node returned {}", response.status());
        }

        let parsed: AccountTxResponse = response
            .json()
            .await
            .context("account_tx response was not valid JSON")?;

        if parsed.result.status.as_deref() == Some("error") {
            bail!(
                "ledger node error: {}",
                parsed
                    .result
                    .error_message
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }

        Ok(parsed.result.transactions)
    }

    pub async fn ping(&self) -> bool {
        let body = json!({"method": "server_info", "params": [{}]});
        match self.client.post(&self.primary).json(&body).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LedgerSource for XrplService {
    async fn recent_transactions(
        &self,
        account: &str,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>> {
        match self.account_tx(&self.primary, account, limit).await {
            Ok(transactions) => Ok(transactions),
            Err(e) if self.fallback.is_some() => {
                tracing::warn!("Primary XRPL node failed ({:#}), trying fallback", e);
                self.account_tx(self.fallback.as_ref().unwrap(), account, limit)
                    .await
            }
            Err(e) => Err(e),
        }
    }
}
