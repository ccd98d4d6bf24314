use ree_safe_math::MathError;
use thiserror::Error;

use crate::rune::RuneId;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Not enough BTC in the selected UTXOs, short by {shortfall} sats")]
    InsufficientFunds { shortfall: u64 },

    #[error("Fee estimation failed: {0}")]
    FeeEstimationFailed(String),

    #[error("Rune {rune} is not conserved: {consumed} consumed, {routed} routed")]
    TokenAccountingMismatch {
        rune: RuneId,
        consumed: u128,
        routed: u128,
    },

    #[error("The signer refused to sign: {0}")]
    SigningRefused(String),

    #[error("The signer did not answer in time")]
    SigningTimeout,

    #[error("Pool state expired, current nonce = {current}")]
    StaleNonceRejected { current: u64 },

    #[error("Settlement rejected: {0}")]
    SettlementRejected(String),

    #[error("The configured fee rate is invalid")]
    InvalidFeeRate,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("An arithmetic error ocurred")]
    CalcOverflow,

    #[error("Rune {0} not found in the UTXO")]
    RuneNotFound(RuneId),

    #[error("Not enough runes, expected {expected}, found {found}")]
    InsufficientRunes { expected: u128, found: u128 },

    #[error("Rune directive encoding failed: {0}")]
    RuneEncoding(String),

    #[error("Input {0} has no public key")]
    MissingPublicKey(usize),

    #[error("Outputs can't be added after the change output")]
    OutputAfterChange,

    #[error("Pool {0} already has an intention in this set")]
    DuplicatePoolIntention(String),

    #[error("Invalid PSBT: {0}")]
    InvalidPsbt(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Output of {0} sats is below the dust limit")]
    OutputBelowDust(u64),

    #[error("The txid depends on scriptSigs only known after signing")]
    UnpredictableTxid,
}

impl BuilderError {
    /// Short label shown to users next to the action name.
    pub fn category(&self) -> &'static str {
        match self {
            BuilderError::InvalidAddress(_) => "invalid address",
            BuilderError::InsufficientFunds { .. } => "insufficient funds",
            BuilderError::FeeEstimationFailed(_) => "fee estimation failed",
            BuilderError::TokenAccountingMismatch { .. } => "token accounting mismatch",
            BuilderError::SigningRefused(_) => "signing refused",
            BuilderError::SigningTimeout => "signing timeout",
            BuilderError::StaleNonceRejected { .. } => "pool state changed",
            BuilderError::SettlementRejected(_) => "settlement rejected",
            BuilderError::InsufficientRunes { .. } | BuilderError::RuneNotFound(_) => {
                "insufficient runes"
            }
            BuilderError::InvalidFeeRate | BuilderError::InvalidConfig(_) => "invalid settings",
            BuilderError::Service(_) => "service unavailable",
            BuilderError::OutputBelowDust(_) => "amount too small",
            BuilderError::UnpredictableTxid => "unsupported address",
            BuilderError::CalcOverflow
            | BuilderError::RuneEncoding(_)
            | BuilderError::MissingPublicKey(_)
            | BuilderError::OutputAfterChange
            | BuilderError::DuplicatePoolIntention(_)
            | BuilderError::InvalidPsbt(_) => "internal error",
        }
    }

    /// Whether rebuilding from fresh state and asking the user again may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BuilderError::SigningRefused(_)
                | BuilderError::SigningTimeout
                | BuilderError::StaleNonceRejected { .. }
        )
    }

    /// `"<action>: <category>"`, never the raw remote payload.
    pub fn user_message(&self, action: &str) -> String {
        format!("{}: {}", action, self.category())
    }
}

impl From<MathError> for BuilderError {
    fn from(_: MathError) -> Self {
        BuilderError::CalcOverflow
    }
}

impl From<bitcoin::psbt::Error> for BuilderError {
    fn from(error: bitcoin::psbt::Error) -> Self {
        BuilderError::InvalidPsbt(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_errors_become_overflow() {
        let err: BuilderError = MathError::SubtractionOverflow.into();
        assert_eq!(err, BuilderError::CalcOverflow);
    }

    #[test]
    fn recoverable_errors() {
        assert!(BuilderError::SigningTimeout.is_recoverable());
        assert!(BuilderError::StaleNonceRejected { current: 6 }.is_recoverable());
        assert!(BuilderError::SigningRefused("user closed the popup".into()).is_recoverable());
        assert!(!BuilderError::InsufficientFunds { shortfall: 10 }.is_recoverable());
        assert!(!BuilderError::FeeEstimationFailed("x".into()).is_recoverable());
    }

    #[test]
    fn user_message_hides_details() {
        let err = BuilderError::SettlementRejected("{\"Err\":\"internal trace\"}".into());
        assert_eq!(err.user_message("claim_bid"), "claim_bid: settlement rejected");
    }
}
