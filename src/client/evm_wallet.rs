use anyhow::{bail, Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionRequest, H256, U256},
    utils::{parse_ether, parse_units},
};
use std::sync::Arc;
use std::time::Duration;

// Minimal ERC-20 surface for the bridged XRPB contract
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

#[derive(Debug, Clone)]
pub struct EvmPaymentOutcome {
    pub tx_hash: H256,
    /// False when submission succeeded but confirmation did not arrive
    /// within the bounded wait; the transaction may still land.
    pub confirmed: bool,
}

/// Signer path for the XRPL EVM sidechain: native-coin transfer, or ERC-20
/// `transfer` when a token contract is configured.
pub struct EvmWallet {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    token: Option<Address>,
    recipient: Address,
    confirm_timeout: Duration,
}

impl EvmWallet {
    pub async fn new(
        rpc_url: &str,
        private_key: &str,
        chain_id: u64,
        token: Option<Address>,
        recipient: Address,
        confirm_timeout: Duration,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        let wallet = private_key
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);

        let provider = Arc::new(SignerMiddleware::new(provider, wallet));

        Ok(Self {
            provider,
            token,
            recipient,
            confirm_timeout,
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    pub async fn ping(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }

    /// Submits the payment and waits for confirmation up to the bounded
    /// timeout. An unconfirmed submission is reported as success with
    /// `confirmed: false`, never as a failure.
    pub async fn send_payment(&self, token_amount: &str) -> Result<EvmPaymentOutcome> {
        match self.token {
            Some(token_address) => self.send_token_transfer(token_address, token_amount).await,
            None => self.send_native_transfer(token_amount).await,
        }
    }

    async fn send_native_transfer(&self, amount: &str) -> Result<EvmPaymentOutcome> {
        let value = parse_ether(amount).context("Invalid transfer amount")?;

        let balance = self
            .provider
            .get_balance(self.address(), None)
            .await
            .context("Failed to read wallet balance")?;
        if balance < value {
            bail!("Insufficient ETH balance to cover the payment and gas");
        }

        tracing::info!("Sending {} native units to {}", amount, self.recipient);

        let tx = TransactionRequest::new().to(self.recipient).value(value);
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .context("Failed to submit transfer")?;

        self.await_confirmation(pending).await
    }

    async fn send_token_transfer(
        &self,
        token_address: Address,
        amount: &str,
    ) -> Result<EvmPaymentOutcome> {
        let token = IERC20::new(token_address, self.provider.clone());

        let decimals = token
            .decimals()
            .call()
            .await
            .context("Failed to read token decimals")?;
        let units: U256 = parse_units(amount, decimals as u32)
            .context("Invalid transfer amount")?
            .into();

        let balance = token
            .balance_of(self.address())
            .call()
            .await
            .context("Failed to read token balance")?;
        if balance < units {
            bail!("Insufficient XRPB balance: {} < {}", balance, units);
        }

        tracing::info!(
            "Sending {} XRPB ({} units) to {}",
            amount,
            units,
            self.recipient
        );

        let call = token.transfer(self.recipient, units);
        let pending = call.send().await.context("Failed to submit XRPB transfer")?;

        self.await_confirmation(pending).await
    }

    async fn await_confirmation(
        &self,
        pending: PendingTransaction<'_, Http>,
    ) -> Result<EvmPaymentOutcome> {
        let tx_hash = *pending;

        match tokio::time::timeout(self.confirm_timeout, pending).await {
            Ok(Ok(Some(receipt))) => {
                if receipt.status != Some(1.into()) {
                    bail!("Transaction failed onchain");
                }
                tracing::info!("Payment confirmed: {:?}", tx_hash);
                Ok(EvmPaymentOutcome {
                    tx_hash,
                    confirmed: true,
                })
            }
            Ok(Ok(None)) => bail!("Transaction dropped from the mempool"),
            Ok(Err(e)) => Err(e).context("Failed to get transaction receipt"),
            Err(_) => {
                tracing::warn!(
                    "No confirmation for {:?} within {}s, reporting unconfirmed",
                    tx_hash,
                    self.confirm_timeout.as_secs()
                );
                Ok(EvmPaymentOutcome {
                    tx_hash,
                    confirmed: false,
                })
            }
        }
    }
}
