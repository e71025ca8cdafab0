use crate::config::Config;
use crate::models::ChainPrices;
use crate::services::storage::{StorageService, PRICES_CACHE_KEY};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::sync::Arc;

const PRICE_CACHE_TTL_SECS: u64 = 30;

#[derive(Deserialize)]
struct DexPairResponse {
    #[serde(default)]
    pairs: Vec<DexPair>,
}

#[derive(Deserialize)]
struct DexPair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

#[derive(Deserialize)]
struct ProxyPriceResponse {
    success: bool,
    price: Option<f64>,
}

#[derive(Deserialize)]
struct TokenListResponse {
    #[serde(default)]
    data: Vec<TokenListing>,
}

#[derive(Deserialize)]
struct TokenListing {
    symbol: Option<String>,
    address: Option<String>,
    #[serde(rename = "usdPerToken")]
    usd_per_token: Option<f64>,
}

/// Aggregates XRPB/USD quotes from the three chain-specific sources.
/// Sources are fetched together and settled independently: one source
/// failing degrades that chain to `None`, never the whole board.
pub struct PriceOracle {
    client: reqwest::Client,
    storage: Arc<StorageService>,
    dex_pair_url: String,
    xrpl_proxy_url: String,
    evm_token_list_url: String,
    token_symbol: String,
    evm_token_address: Option<String>,
}

impl PriceOracle {
    pub fn new(config: &Config, storage: Arc<StorageService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            storage,
            dex_pair_url: config.dex_pair_url.clone(),
            xrpl_proxy_url: config.xrpl_price_proxy_url.clone(),
            evm_token_list_url: config.evm_token_list_url.clone(),
            token_symbol: config.xrpb_currency_code.clone(),
            evm_token_address: config.evm_token_address.map(|a| format!("{:#x}", a)),
        }
    }

    #[cfg(test)]
    fn for_tests(
        storage: Arc<StorageService>,
        dex_pair_url: String,
        xrpl_proxy_url: String,
        evm_token_list_url: String,
        evm_token_address: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            storage,
            dex_pair_url,
            xrpl_proxy_url,
            evm_token_list_url,
            token_symbol: "XRPB".to_string(),
            evm_token_address,
        }
    }

    /// One quote per chain, `None` where the source failed. Cached for 30s;
    /// the UI re-invokes on its own interval to self-heal, so no retries
    /// happen inside a single call.
    pub async fn get_all_prices(&self) -> ChainPrices {
        if let Ok(Some(cached)) = self.storage.get::<ChainPrices>(PRICES_CACHE_KEY).await {
            tracing::debug!("Returning cached price board");
            return cached;
        }

        let (solana, xrpl, xrpl_evm) =
            tokio::join!(self.fetch_solana(), self.fetch_xrpl(), self.fetch_evm());

        let prices = ChainPrices {
            solana,
            xrpl,
            xrpl_evm,
        };

        let _ = self
            .storage
            .set(PRICES_CACHE_KEY, &prices, PRICE_CACHE_TTL_SECS)
            .await;

        tracing::info!(
            solana = ?prices.solana,
            xrpl = ?prices.xrpl,
            xrpl_evm = ?prices.xrpl_evm,
            "Price board refreshed"
        );

        prices
    }

    async fn fetch_solana(&self) -> Option<f64> {
        match self.try_fetch_solana().await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!("Solana price source failed: {:#}", e);
                None
            }
        }
    }

    async fn try_fetch_solana(&self) -> Result<f64> {
        let response = self.client.get(&self.dex_pair_url).send().await?;
        if !response.status().is_success() {
            bail!("pair lookup returned {}", response.status());
        }

        let body: DexPairResponse = response.json().await?;
        let price_str = body
            .pairs
            .first()
            .and_then(|p| p.price_usd.as_deref())
            .context("no pairs in response")?;

        let price: f64 = price_str.parse().context("non-numeric priceUsd")?;
        validate_price(price)
    }

    async fn fetch_xrpl(&self) -> Option<f64> {
        match self.try_fetch_xrpl().await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!("XRPL price proxy failed: {:#}", e);
                None
            }
        }
    }

    async fn try_fetch_xrpl(&self) -> Result<f64> {
        let response = self.client.get(&self.xrpl_proxy_url).send().await?;
        if !response.status().is_success() {
            bail!("price proxy returned {}", response.status());
        }

        let body: ProxyPriceResponse = response.json().await?;
        if !body.success {
            bail!("price proxy reported failure");
        }
        let price = body.price.context("price proxy omitted price")?;
        validate_price(price)
    }

    async fn fetch_evm(&self) -> Option<f64> {
        match self.try_fetch_evm().await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!("EVM token listing failed: {:#}", e);
                None
            }
        }
    }

    async fn try_fetch_evm(&self) -> Result<f64> {
        let expected_address = self
            .evm_token_address
            .as_deref()
            .context("no EVM token address configured")?;

        let response = self.client.get(&self.evm_token_list_url).send().await?;
        if !response.status().is_success() {
            bail!("token listing returned {}", response.status());
        }

        let body: TokenListResponse = response.json().await?;
        let listing = body
            .data
            .iter()
            .find(|entry| {
                entry
                    .symbol
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case(&self.token_symbol))
                    .unwrap_or(false)
                    && entry
                        .address
                        .as_deref()
                        .map(|a| a.eq_ignore_ascii_case(expected_address))
                        .unwrap_or(false)
            })
            .context("token not present in listing")?;

        let price = listing.usd_per_token.context("listing omitted usdPerToken")?;
        validate_price(price)
    }
}

fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price <= 0.0 {
        bail!("invalid price: {}", price);
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chain, FALLBACK_PRICE_USD};
    use serde_json::json;

    const EVM_TOKEN: &str = "0x00000000000000000000000000000000000058b2";

    async fn storage() -> Arc<StorageService> {
        Arc::new(StorageService::new("redis://127.0.0.1:1").await.unwrap())
    }

    fn oracle(server: &mockito::ServerGuard, storage: Arc<StorageService>) -> PriceOracle {
        PriceOracle::for_tests(
            storage,
            format!("{}/pairs", server.url()),
            format!("{}/proxy", server.url()),
            format!("{}/tokens", server.url()),
            Some(EVM_TOKEN.to_string()),
        )
    }

    #[tokio::test]
    async fn all_sources_healthy_yields_three_prices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pairs")
            .with_body(json!({"pairs": [{"priceUsd": "0.0521"}]}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/proxy")
            .with_body(json!({"success": true, "price": 0.0534}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/tokens")
            .with_body(
                json!({"data": [
                    {"symbol": "WETH", "address": "0xdead", "usdPerToken": 3000.0},
                    {"symbol": "XRPB", "address": EVM_TOKEN, "usdPerToken": 0.0517}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let prices = oracle(&server, storage().await).get_all_prices().await;
        assert_eq!(prices.solana, Some(0.0521));
        assert_eq!(prices.xrpl, Some(0.0534));
        assert_eq!(prices.xrpl_evm, Some(0.0517));
    }

    #[tokio::test]
    async fn one_failing_source_does_not_poison_the_others() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pairs")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/proxy")
            .with_body(json!({"success": true, "price": 0.05}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/tokens")
            .with_body(
                json!({"data": [{"symbol": "XRPB", "address": EVM_TOKEN, "usdPerToken": 0.051}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let prices = oracle(&server, storage().await).get_all_prices().await;
        assert_eq!(prices.solana, None);
        assert_eq!(prices.xrpl, Some(0.05));
        assert_eq!(prices.xrpl_evm, Some(0.051));
    }

    #[tokio::test]
    async fn all_sources_down_degrades_to_fallback_not_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pairs")
            .with_status(502)
            .create_async()
            .await;
        server
            .mock("GET", "/proxy")
            .with_body(json!({"success": false}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/tokens")
            .with_status(404)
            .create_async()
            .await;

        let prices = oracle(&server, storage().await).get_all_prices().await;
        assert_eq!(prices.solana, None);
        assert_eq!(prices.xrpl, None);
        assert_eq!(prices.xrpl_evm, None);

        // Checkout stays possible on the fixed floor.
        for chain in [Chain::Solana, Chain::Xrpl, Chain::XrplEvm] {
            assert_eq!(prices.effective(chain), FALLBACK_PRICE_USD);
        }
    }

    #[tokio::test]
    async fn zero_and_non_numeric_prices_are_treated_as_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pairs")
            .with_body(json!({"pairs": [{"priceUsd": "0"}]}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/proxy")
            .with_body(json!({"success": true, "price": 0.05}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/tokens")
            .with_body(
                json!({"data": [{"symbol": "XRPB", "address": "0xother", "usdPerToken": 0.05}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let prices = oracle(&server, storage().await).get_all_prices().await;
        assert_eq!(prices.solana, None);
        // address mismatch means the listing entry does not count
        assert_eq!(prices.xrpl_evm, None);
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        let pairs = server
            .mock("GET", "/pairs")
            .with_body(json!({"pairs": [{"priceUsd": "0.05"}]}).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/proxy")
            .with_body(json!({"success": true, "price": 0.05}).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/tokens")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let oracle = oracle(&server, storage().await);
        let first = oracle.get_all_prices().await;
        let second = oracle.get_all_prices().await;
        assert_eq!(first.solana, second.solana);
        pairs.assert_async().await;
    }
}
