//! External collaborators, passed in explicitly by the caller.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    error::BuilderError, fee_rate::FeeRate, intention::InvokeArgs, signing::SigningDescriptor,
    utxo_info::UnspentOutput,
};

/// Errors returned by remote services.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service couldn't be reached or failed internally.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered, but not with something we can use.
    #[error("unexpected response: {0}")]
    BadResponse(String),

    /// The settlement service refused the transaction.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<ServiceError> for BuilderError {
    fn from(e: ServiceError) -> Self {
        BuilderError::Service(e.to_string())
    }
}

/// Errors returned by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signing refused: {0}")]
    Refused(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait FeeRateProvider: Sync + Send {
    /// Current fee rate in sat/vB. Read once per action.
    async fn current_fee_rate(&self) -> Result<FeeRate, ServiceError>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait UtxoProvider: Sync + Send {
    /// Spendable outputs of `address`, with rune balances and keys filled in.
    async fn utxos(&self, address: &str) -> Result<Vec<UnspentOutput>, ServiceError>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PoolStateProvider: Sync + Send {
    /// Nonce the pool will expect from the next intention.
    async fn pool_nonce(&self, pool_address: &str) -> Result<u64, ServiceError>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PsbtSigner: Sync + Send {
    /// Signs the listed inputs of `psbt_hex` and returns the signed PSBT, hex encoded.
    async fn sign_psbt(
        &self,
        psbt_hex: &str,
        to_sign: &[SigningDescriptor],
    ) -> Result<String, SignerError>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait SettlementService: Sync + Send {
    /// Submits a signed transaction with its intentions and returns the final txid.
    async fn invoke(&self, args: InvokeArgs) -> Result<String, ServiceError>;
}
