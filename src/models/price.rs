use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor applied when every live source for a chain is down, so checkout
/// stays possible on stale markets instead of blocking.
pub const FALLBACK_PRICE_USD: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Solana,
    Xrpl,
    XrplEvm,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Xrpl => "xrpl",
            Chain::XrplEvm => "xrpl-evm",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub chain: Chain,
    pub usd_per_token: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Aggregated per-chain XRPB prices. `None` means the source failed or
/// returned garbage; callers fall back rather than error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPrices {
    pub solana: Option<f64>,
    pub xrpl: Option<f64>,
    pub xrpl_evm: Option<f64>,
}

impl ChainPrices {
    pub fn for_chain(&self, chain: Chain) -> Option<f64> {
        match chain {
            Chain::Solana => self.solana,
            Chain::Xrpl => self.xrpl,
            Chain::XrplEvm => self.xrpl_evm,
        }
    }

    /// Live price if the source answered, otherwise the fixed floor.
    pub fn effective(&self, chain: Chain) -> f64 {
        self.for_chain(chain).unwrap_or(FALLBACK_PRICE_USD)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub usd_per_token: Option<f64>,
    pub effective: f64,
    pub live: bool,
}

impl PriceEntry {
    pub fn from_source(price: Option<f64>) -> Self {
        Self {
            usd_per_token: price,
            effective: price.unwrap_or(FALLBACK_PRICE_USD),
            live: price.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBoard {
    pub solana: PriceEntry,
    pub xrpl: PriceEntry,
    pub xrpl_evm: PriceEntry,
    pub fetched_at: DateTime<Utc>,
}

impl From<&ChainPrices> for PriceBoard {
    fn from(prices: &ChainPrices) -> Self {
        Self {
            solana: PriceEntry::from_source(prices.solana),
            xrpl: PriceEntry::from_source(prices.xrpl),
            xrpl_evm: PriceEntry::from_source(prices.xrpl_evm),
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_price_falls_back_when_source_is_down() {
        let prices = ChainPrices {
            solana: None,
            xrpl: Some(0.052),
            xrpl_evm: None,
        };

        assert_eq!(prices.effective(Chain::Solana), FALLBACK_PRICE_USD);
        assert_eq!(prices.effective(Chain::Xrpl), 0.052);
        assert_eq!(prices.effective(Chain::XrplEvm), FALLBACK_PRICE_USD);
    }

    #[test]
    fn chain_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Chain::XrplEvm).unwrap(),
            "\"xrpl-evm\""
        );
        let chain: Chain = serde_json::from_str("\"xrpl\"").unwrap();
        assert_eq!(chain, Chain::Xrpl);
    }
}
