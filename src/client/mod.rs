pub mod evm_wallet;

pub use evm_wallet::{EvmPaymentOutcome, EvmWallet};
