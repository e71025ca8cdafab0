use crate::client::evm_wallet::EvmWallet;
use crate::config::Config;
use crate::error::CheckoutError;
use crate::models::{currency_to_ledger_code, Chain, PaymentIntent, PaymentReceipt, PendingIntent};
use crate::services::storage::{receipt_key, StorageService, PENDING_INTENT_KEY};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

const PENDING_INTENT_TTL_SECS: u64 = 3600;
const RECEIPT_TTL_SECS: u64 = 86_400 * 30;

/// fiat / price, fixed to 6 decimal places.
pub fn token_amount(fiat_amount: f64, usd_per_token: f64) -> f64 {
    ((fiat_amount / usd_per_token) * 1e6).round() / 1e6
}

pub fn format_token_amount(amount: f64) -> String {
    format!("{:.6}", amount)
}

/// Maps raw wallet/signer failures to the messages the storefront shows.
pub fn map_wallet_error(error: &anyhow::Error) -> String {
    let message = format!("{:#}", error);
    let lower = message.to_lowercase();

    if lower.contains("insufficient funds") || lower.contains("insufficient eth") {
        "Insufficient ETH balance to cover the payment and gas. Top up your wallet and try again."
            .to_string()
    } else if lower.contains("insufficient xrpb") {
        message
    } else if lower.contains("rejected") || lower.contains("denied") {
        "Transaction was rejected in the wallet.".to_string()
    } else {
        message
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateOutcome {
    pub chain: Chain,
    pub token_amount: f64,
    pub token_amount_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Dispatches one payment attempt: a wallet deep link for XRPL (fire and
/// return, the monitor picks up from there) or a direct signer transfer on
/// the EVM sidechain.
pub struct PaymentInitiator {
    storage: Arc<StorageService>,
    evm: Option<Arc<EvmWallet>>,
    xrpl_recipient: String,
    currency_code: String,
    issuer: String,
    network: String,
}

impl PaymentInitiator {
    pub fn new(config: &Config, storage: Arc<StorageService>, evm: Option<Arc<EvmWallet>>) -> Self {
        Self {
            storage,
            evm,
            xrpl_recipient: config.xrpl_recipient_address.clone(),
            currency_code: config.xrpb_currency_code.clone(),
            issuer: config.xrpb_issuer_address.clone(),
            network: config.xrpl_network.clone(),
        }
    }

    /// Fail-fast validation and conversion; no network calls happen here.
    pub fn build_intent(
        &self,
        tier_id: &str,
        chain: Chain,
        fiat_amount: f64,
        usd_per_token: f64,
    ) -> Result<PaymentIntent, CheckoutError> {
        if !fiat_amount.is_finite() || fiat_amount <= 0.0 {
            return Err(CheckoutError::Validation(
                "Amount must be a positive number".to_string(),
            ));
        }
        if !usd_per_token.is_finite() || usd_per_token <= 0.0 {
            return Err(CheckoutError::Validation(
                "Price quote unavailable for the selected chain".to_string(),
            ));
        }
        if chain == Chain::Solana {
            return Err(CheckoutError::Validation(
                "Solana payments are completed in the connected wallet, not through this service"
                    .to_string(),
            ));
        }
        if self.xrpl_recipient.is_empty() {
            return Err(CheckoutError::Validation(
                "Recipient address is not configured".to_string(),
            ));
        }

        Ok(PaymentIntent {
            tier_id: tier_id.to_string(),
            chain,
            fiat_amount,
            token_amount: token_amount(fiat_amount, usd_per_token),
            recipient_address: self.xrpl_recipient.clone(),
            currency_code: self.currency_code.clone(),
            issuer: Some(self.issuer.clone()),
        })
    }

    pub async fn initiate(
        &self,
        intent: &PaymentIntent,
        mobile: bool,
    ) -> Result<InitiateOutcome, CheckoutError> {
        match intent.chain {
            Chain::Xrpl => self.initiate_xrpl(intent, mobile).await,
            Chain::XrplEvm => self.initiate_evm(intent).await,
            Chain::Solana => Err(CheckoutError::Validation(
                "Solana payments are completed in the connected wallet, not through this service"
                    .to_string(),
            )),
        }
    }

    /// Builds the wallet deep link and returns immediately. Completing the
    /// external wallet flow is the buyer's business; the monitor detects the
    /// resulting payment independently.
    async fn initiate_xrpl(
        &self,
        intent: &PaymentIntent,
        mobile: bool,
    ) -> Result<InitiateOutcome, CheckoutError> {
        let amount = format_token_amount(intent.token_amount);
        let currency = currency_to_ledger_code(&intent.currency_code);

        // App scheme on desktop; universal link for the mobile app-switch.
        let base = if mobile {
            format!(
                "https://xumm.app/detect/request:{}",
                intent.recipient_address
            )
        } else {
            format!("xumm://detect/request:{}", intent.recipient_address)
        };
        let payment_url = format!(
            "{}?amount={}&currency={}&issuer={}&network={}",
            base, amount, currency, self.issuer, self.network
        );

        if mobile {
            let pending = PendingIntent {
                chain: intent.chain,
                fiat_amount: intent.fiat_amount,
                token_amount: intent.token_amount,
                recipient_address: intent.recipient_address.clone(),
                created_at: Utc::now(),
            };
            self.storage
                .set(PENDING_INTENT_KEY, &pending, PENDING_INTENT_TTL_SECS)
                .await
                .map_err(|e| CheckoutError::Storage(e.to_string()))?;
        }

        tracing::info!(
            chain = %intent.chain,
            amount = %amount,
            "Payment deep link issued"
        );

        Ok(InitiateOutcome {
            chain: intent.chain,
            token_amount: intent.token_amount,
            token_amount_display: amount,
            payment_url: Some(payment_url),
            tx_hash: None,
            warning: None,
        })
    }

    async fn initiate_evm(&self, intent: &PaymentIntent) -> Result<InitiateOutcome, CheckoutError> {
        let Some(wallet) = &self.evm else {
            return Err(CheckoutError::Wallet(
                "EVM wallet is not configured".to_string(),
            ));
        };

        let display = format_token_amount(intent.token_amount);
        let outcome = wallet
            .send_payment(&display)
            .await
            .map_err(|e| CheckoutError::Wallet(map_wallet_error(&e)))?;

        let tx_hash = format!("{:?}", outcome.tx_hash);

        let receipt = PaymentReceipt {
            tx_hash: tx_hash.clone(),
            chain: intent.chain,
            fiat_amount: intent.fiat_amount,
            token_amount: intent.token_amount,
            confirmed: outcome.confirmed,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self
            .storage
            .set(&receipt_key(&tx_hash), &receipt, RECEIPT_TTL_SECS)
            .await
        {
            tracing::warn!("Failed to persist payment receipt: {:#}", e);
        }

        Ok(InitiateOutcome {
            chain: intent.chain,
            token_amount: intent.token_amount,
            token_amount_display: display,
            payment_url: None,
            tx_hash: Some(tx_hash),
            warning: (!outcome.confirmed).then(|| "unconfirmed".to_string()),
        })
    }
}
