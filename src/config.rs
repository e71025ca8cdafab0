use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // XRPL (payment destination + monitoring)
    pub xrpl_rpc_url: String,
    pub xrpl_rpc_fallback: Option<String>,
    pub xrpl_recipient_address: String,
    pub xrpb_currency_code: String,
    pub xrpb_issuer_address: String,
    pub xrpl_network: String,

    // XRPL EVM sidechain (optional signer path)
    pub evm_rpc_url: Option<String>,
    pub evm_chain_id: u64,
    pub evm_recipient_address: Option<Address>,
    pub evm_token_address: Option<Address>,
    pub evm_wallet_private_key: Option<String>,

    // Marketplace backend (membership verification authority)
    pub backend_api_url: String,

    // Price sources
    pub dex_pair_url: String,
    pub xrpl_price_proxy_url: String,
    pub evm_token_list_url: String,

    // Redis
    pub redis_url: String,

    // Rate Limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,

    // Monitoring
    pub monitor_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub evm_confirm_timeout_secs: u64,
    pub tolerance_fraction: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            xrpl_rpc_url: std::env::var("XRPL_RPC_URL")
                .unwrap_or_else(|_| "https://xrplcluster.com".to_string()),
            xrpl_rpc_fallback: std::env::var("XRPL_RPC_FALLBACK").ok(),
            xrpl_recipient_address: std::env::var("XRPL_RECIPIENT_ADDRESS")
                .context("XRPL_RECIPIENT_ADDRESS required")?,
            xrpb_currency_code: std::env::var("XRPB_CURRENCY_CODE")
                .unwrap_or_else(|_| "XRPB".to_string()),
            xrpb_issuer_address: std::env::var("XRPB_ISSUER_ADDRESS")
                .context("XRPB_ISSUER_ADDRESS required")?,
            xrpl_network: std::env::var("XRPL_NETWORK").unwrap_or_else(|_| "mainnet".to_string()),

            evm_rpc_url: std::env::var("EVM_RPC_URL").ok(),
            evm_chain_id: std::env::var("EVM_CHAIN_ID")
                .unwrap_or_else(|_| "1440000".to_string())
                .parse()
                .context("Invalid EVM_CHAIN_ID")?,
            evm_recipient_address: Self::parse_optional_address("EVM_RECIPIENT_ADDRESS")?,
            evm_token_address: Self::parse_optional_address("EVM_TOKEN_ADDRESS")?,
            evm_wallet_private_key: std::env::var("EVM_WALLET_PRIVATE_KEY").ok(),

            backend_api_url: std::env::var("BACKEND_API_URL")
                .context("BACKEND_API_URL required")?,

            dex_pair_url: std::env::var("DEX_PAIR_URL")
                .context("DEX_PAIR_URL required")?,
            xrpl_price_proxy_url: std::env::var("XRPL_PRICE_PROXY_URL")
                .context("XRPL_PRICE_PROXY_URL required")?,
            evm_token_list_url: std::env::var("EVM_TOKEN_LIST_URL")
                .context("EVM_TOKEN_LIST_URL required")?,

            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_PER_SECOND")?,
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_BURST")?,

            monitor_timeout_secs: std::env::var("MONITOR_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid MONITOR_TIMEOUT_SECS")?,
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("Invalid POLL_INTERVAL_MS")?,
            evm_confirm_timeout_secs: std::env::var("EVM_CONFIRM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid EVM_CONFIRM_TIMEOUT_SECS")?,
            tolerance_fraction: std::env::var("TOLERANCE_FRACTION")
                .unwrap_or_else(|_| "0.09".to_string())
                .parse()
                .context("Invalid TOLERANCE_FRACTION")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_optional_address(var: &str) -> Result<Option<Address>> {
        match std::env::var(var) {
            Ok(addr_str) => Address::from_str(&addr_str)
                .map(Some)
                .with_context(|| format!("Invalid address for {}", var)),
            Err(_) => Ok(None),
        }
    }

    pub fn evm_enabled(&self) -> bool {
        self.evm_rpc_url.is_some()
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("XRPL_RPC_URL", &self.xrpl_rpc_url),
            ("BACKEND_API_URL", &self.backend_api_url),
            ("DEX_PAIR_URL", &self.dex_pair_url),
            ("XRPL_PRICE_PROXY_URL", &self.xrpl_price_proxy_url),
            ("EVM_TOKEN_LIST_URL", &self.evm_token_list_url),
        ] {
            if !url.starts_with("http") {
                bail!("{} must be HTTP(S) URL", name);
            }
        }

        if !self.xrpl_recipient_address.starts_with('r') {
            bail!("XRPL_RECIPIENT_ADDRESS must be a classic r-address");
        }
        if !self.xrpb_issuer_address.starts_with('r') {
            bail!("XRPB_ISSUER_ADDRESS must be a classic r-address");
        }

        if self.evm_enabled() {
            if self.evm_wallet_private_key.is_none() {
                bail!("EVM_WALLET_PRIVATE_KEY required when EVM_RPC_URL is set");
            }
            if self.evm_recipient_address.is_none() {
                bail!("EVM_RECIPIENT_ADDRESS required when EVM_RPC_URL is set");
            }
        }

        if !(self.tolerance_fraction > 0.0 && self.tolerance_fraction <= 0.5) {
            bail!("TOLERANCE_FRACTION must be in (0, 0.5]");
        }
        if self.poll_interval_ms == 0 || self.monitor_timeout_secs == 0 {
            bail!("Monitor timers must be non-zero");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
