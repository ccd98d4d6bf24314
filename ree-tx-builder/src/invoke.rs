//! Reading fresh pool state before a build, and signing and submitting the result.
//!
//! Nothing here retries. A stale nonce, a refused signature or a timeout is returned to the
//! caller, who must rebuild the whole action from freshly read state.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::{
    actions::{ActionContext, BuiltAction, PoolInfo},
    config::BuilderConfig,
    error::BuilderError,
    intention::{IntentionRecord, InvokeArgs, TransactionStatus},
    runestone::RuneCodec,
    services::{
        FeeRateProvider, PoolStateProvider, PsbtSigner, ServiceError, SettlementService,
        SignerError, UtxoProvider,
    },
};

const STALE_POOL_STATE: &str = "pool state expired";
const MAX_REJECTION_LEN: usize = 160;

/// State read right before building one action.
pub struct PreparedAction<'a> {
    pub context: ActionContext<'a>,
    /// Current nonce of every pool the action touches, keyed by address.
    pub nonces: BTreeMap<String, u64>,
}

impl PreparedAction<'_> {
    /// The pool at `address` with the nonce just read.
    pub fn pool(&self, name: &str, address: &str) -> Option<PoolInfo> {
        self.nonces
            .get(address)
            .map(|nonce| PoolInfo::new(name, address, *nonce))
    }
}

/// A settled action.
#[derive(Clone, Debug)]
pub struct SubmittedAction {
    pub txid: String,
    pub records: Vec<IntentionRecord>,
}

/// Reads the fee rate, the payer's UTXOs and the nonce of each pool in `pool_addresses`.
///
/// Call this for every build. The returned state must not be reused for another action.
pub async fn prepare_context<'a>(
    fee_provider: &dyn FeeRateProvider,
    utxo_provider: &dyn UtxoProvider,
    pool_state: &dyn PoolStateProvider,
    payment_address: &str,
    pool_addresses: &[&str],
    config: BuilderConfig,
    codec: &'a dyn RuneCodec,
) -> Result<PreparedAction<'a>, BuilderError> {
    config.validate()?;

    let fee_rate = fee_provider.current_fee_rate().await?;
    let user_btc_utxos = utxo_provider.utxos(payment_address).await?;

    let mut nonces = BTreeMap::new();
    for address in pool_addresses {
        let nonce = pool_state.pool_nonce(address).await?;
        nonces.insert(address.to_string(), nonce);
    }

    debug!(
        fee_rate = fee_rate.n(),
        utxos = user_btc_utxos.len(),
        pools = nonces.len(),
        "prepared action state"
    );

    Ok(PreparedAction {
        context: ActionContext::new(config, fee_rate, payment_address, user_btc_utxos, codec),
        nonces,
    })
}

/// Gets `built` signed, then hands it to the settlement service with its intentions.
pub async fn invoke_action(
    built: &BuiltAction,
    signer: &dyn PsbtSigner,
    settlement: &dyn SettlementService,
    config: &BuilderConfig,
) -> Result<SubmittedAction, BuilderError> {
    let action = built
        .records
        .first()
        .map(|record| record.invoke_action.as_str())
        .unwrap_or_default();

    let psbt_hex = built.psbt_hex();
    let signed = match tokio::time::timeout(
        config.signer_timeout(),
        signer.sign_psbt(&psbt_hex, &built.to_sign),
    )
    .await
    {
        Ok(Ok(signed)) => signed,
        Ok(Err(SignerError::Refused(reason))) => {
            warn!(action, txid = %built.txid, "signer refused");
            return Err(BuilderError::SigningRefused(reason));
        }
        Ok(Err(SignerError::Unavailable(reason))) => {
            return Err(BuilderError::Service(reason));
        }
        Err(_) => {
            warn!(
                action,
                txid = %built.txid,
                "signer timed out after {}s",
                config.signer_timeout_secs
            );
            return Err(BuilderError::SigningTimeout);
        }
    };

    let args = InvokeArgs {
        psbt_hex: signed,
        intention_set: built.intention_set.clone(),
        initiator_utxo_proof: Vec::new(),
    };

    let txid = settlement.invoke(args).await.map_err(|e| {
        let error = settlement_error(e);
        if error.is_recoverable() {
            warn!(action, txid = %built.txid, %error, "settlement rejected");
        }
        error
    })?;

    info!(action, %txid, fee = built.fee, "action settled");

    let mut records = built.records.clone();
    for record in &mut records {
        record.set_status(TransactionStatus::Broadcasted);
    }

    Ok(SubmittedAction { txid, records })
}

fn settlement_error(error: ServiceError) -> BuilderError {
    match error {
        ServiceError::Rejected(reason) => match stale_nonce(&reason) {
            Some(current) => BuilderError::StaleNonceRejected { current },
            None => BuilderError::SettlementRejected(filter_reason(&reason)),
        },
        other => other.into(),
    }
}

/// Current nonce from a `pool state expired, current = N` rejection.
fn stale_nonce(reason: &str) -> Option<u64> {
    let lower = reason.to_ascii_lowercase();
    let rest = &lower[lower.find(STALE_POOL_STATE)?..];
    let after = rest[rest.find("current")?..].trim_start_matches("current");
    let digits: String = after
        .trim_start_matches(|c: char| c == ' ' || c == '=' || c == ':')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// First line of a remote message, without control characters and bounded in length.
fn filter_reason(reason: &str) -> String {
    reason
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_REJECTION_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}
