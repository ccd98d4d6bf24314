//! One builder per pool action.
//!
//! Every action follows the same shape: protocol inputs first, then the protocol outputs in a
//! fixed order (edicts address them by index), then the runestone, then user sats until the
//! fee is paid. The change output always comes last.

use bitcoin::{psbt::Psbt, Transaction, Txid};
use chrono::Utc;
use tracing::info;

use crate::{
    config::BuilderConfig,
    error::BuilderError,
    fee_rate::FeeRate,
    intention::{
        ActionType, Intention, IntentionDetail, IntentionRecord, IntentionSet, PoolBasic,
        TransactionStatus,
    },
    runestone::{check_targets, RuneCodec, RuneLedger, RuneTransfer},
    selection::SelectionOutcome,
    signing::{classify_signing_inputs_for, spent_user_utxos, SigningDescriptor},
    utxo_info::UnspentOutput,
    TransactionBuilder,
};

pub mod add_liquidity;
pub mod auction;
pub mod claim_bid;
pub mod deposit_nft;
pub mod reclaim_nft;
pub mod register;
pub mod settle_bid;
pub mod withdraw;

pub use add_liquidity::{build_add_liquidity, AddLiquidityRequest};
pub use auction::{build_auction, AuctionRequest};
pub use claim_bid::{build_claim_bid, ClaimBidRequest};
pub use deposit_nft::{build_deposit_nft, DepositNftRequest};
pub use reclaim_nft::{build_reclaim_nft, ReclaimNftRequest};
pub use register::{build_register, RegisterRequest};
pub use settle_bid::{build_settle_bid, SettleBidRequest};
pub use withdraw::{build_withdraw, WithdrawRequest};

/// A pool as seen right before building.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolInfo {
    pub name: String,
    pub address: String,
    pub nonce: u64,
}

impl PoolInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>, nonce: u64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            nonce,
        }
    }

    fn basic(&self) -> PoolBasic {
        PoolBasic {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

/// What an action hands to [`ActionContext::complete`] once its protocol outputs are in place.
struct Completion<'p> {
    action: ActionType,
    pool: &'p PoolInfo,
    /// Checked against the final outputs before funding.
    transfers: Vec<RuneTransfer>,
    /// User address other than the payment address whose inputs are spent.
    also_signs: Option<&'p str>,
    /// Fund with the largest user UTXOs first instead of wallet order.
    largest_first: bool,
    detail: IntentionDetail,
}

/// State every action reads. Built fresh for each action.
pub struct ActionContext<'a> {
    pub config: BuilderConfig,
    pub fee_rate: FeeRate,
    /// Pays the fee, receives BTC change and signs.
    pub payment_address: String,
    pub user_btc_utxos: Vec<UnspentOutput>,
    pub codec: &'a dyn RuneCodec,
}

/// Everything the caller needs to get an action signed and settled.
#[derive(Clone, Debug)]
pub struct BuiltAction {
    pub psbt: Psbt,
    pub unsigned_tx: Transaction,
    pub txid: Txid,
    pub to_sign: Vec<SigningDescriptor>,
    /// User UTXOs this transaction consumes.
    pub to_spend: Vec<UnspentOutput>,
    pub fee: u64,
    pub fee_rate: FeeRate,
    pub intention_set: IntentionSet,
    pub records: Vec<IntentionRecord>,
}

impl BuiltAction {
    pub fn psbt_hex(&self) -> String {
        hex::encode(self.psbt.serialize())
    }
}

impl<'a> ActionContext<'a> {
    pub fn new(
        config: BuilderConfig,
        fee_rate: FeeRate,
        payment_address: impl Into<String>,
        user_btc_utxos: Vec<UnspentOutput>,
        codec: &'a dyn RuneCodec,
    ) -> Self {
        Self {
            config,
            fee_rate,
            payment_address: payment_address.into(),
            user_btc_utxos,
            codec,
        }
    }

    fn builder(&self) -> Result<TransactionBuilder, BuilderError> {
        let mut builder = TransactionBuilder::new(self.config);
        builder.set_fee_rate(self.fee_rate);
        builder.set_rbf(false);
        builder.set_change_address(&self.payment_address)?;
        Ok(builder)
    }

    /// Balances `ledger`, encodes it and appends the runestone output.
    fn add_runestone(
        &self,
        builder: &mut TransactionBuilder,
        ledger: RuneLedger,
    ) -> Result<Vec<RuneTransfer>, BuilderError> {
        let transfers = ledger.finish()?;
        let script = self.codec.encode(&transfers)?;
        builder.add_script_output(script, 0)?;
        Ok(transfers)
    }

    fn fund(
        &self,
        builder: &mut TransactionBuilder,
        largest_first: bool,
    ) -> Result<SelectionOutcome, BuilderError> {
        if largest_first {
            let mut candidates = self.user_btc_utxos.clone();
            candidates.sort_by(|a, b| b.value.cmp(&a.value));
            builder.select_and_fund(&candidates, self.config.max_candidates)
        } else {
            builder.select_and_fund(&self.user_btc_utxos, self.config.max_candidates)
        }
    }

    /// First owner among `utxos` that is not the payment address.
    fn other_owner<'u>(
        &self,
        utxos: impl IntoIterator<Item = &'u UnspentOutput>,
    ) -> Option<&'u str> {
        utxos
            .into_iter()
            .map(|utxo| utxo.address.as_str())
            .find(|address| *address != self.payment_address)
    }

    /// Funds the transaction and assembles the signing request, intentions and record.
    ///
    /// `make_intentions` receives the final txid.
    fn complete(
        &self,
        mut builder: TransactionBuilder,
        completion: Completion<'_>,
        make_intentions: impl FnOnce(Txid) -> Vec<Intention>,
    ) -> Result<BuiltAction, BuilderError> {
        let Completion {
            action,
            pool,
            transfers,
            also_signs,
            largest_first,
            detail,
        } = completion;

        check_targets(&transfers, builder.outputs())?;

        let outcome = self.fund(&mut builder, largest_first)?;
        let txid = builder.txid()?;

        let intentions = make_intentions(txid);
        if !builder.txid_is_final()
            && intentions
                .iter()
                .any(|intention| !intention.pool_utxo_received.is_empty())
        {
            return Err(BuilderError::UnpredictableTxid);
        }

        let mut intention_set = IntentionSet::new(&self.payment_address, outcome.fee);
        for intention in intentions {
            intention_set.push(intention)?;
        }

        let mut owned = vec![self.payment_address.as_str()];
        owned.extend(also_signs);

        let psbt = builder.finalize()?;
        let to_sign = classify_signing_inputs_for(&builder, &owned)?;
        let to_spend = spent_user_utxos(&builder, &owned);

        let record = IntentionRecord {
            action_type: action,
            status: TransactionStatus::Pending,
            timestamp: Utc::now(),
            pool: pool.basic(),
            txid: txid.to_string(),
            invoke_action: action.to_string(),
            fee: outcome.fee,
            fee_rate: self.fee_rate,
            initiator: self.payment_address.clone(),
            included_block_height: None,
            detail,
        };

        info!(
            action = %action,
            %txid,
            pool = %pool.address,
            fee = outcome.fee,
            inputs = builder.inputs().len(),
            outputs = builder.outputs().len(),
            "built action"
        );

        Ok(BuiltAction {
            unsigned_tx: psbt.unsigned_tx.clone(),
            psbt,
            txid,
            to_sign,
            to_spend,
            fee: outcome.fee,
            fee_rate: self.fee_rate,
            intention_set,
            records: vec![record],
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{constants::DUST_LIMIT, rune::RuneId, test_utils::*};

    /// Checks BTC conservation, rune conservation and the dust policy of a built action.
    ///
    /// `fixtures` must contain every UTXO the action may have spent.
    pub fn assert_conserves(built: &BuiltAction, codec: &dyn RuneCodec, fixtures: &[UnspentOutput]) {
        let input_total: u64 = built
            .psbt
            .inputs
            .iter()
            .map(|input| input.witness_utxo.as_ref().unwrap().value.to_sat())
            .sum();
        let output_total: u64 = built
            .unsigned_tx
            .output
            .iter()
            .map(|output| output.value.to_sat())
            .sum();
        assert_eq!(input_total, output_total + built.fee);
        assert_eq!(built.intention_set.tx_fee_in_sats, built.fee);

        let mut consumed: BTreeMap<RuneId, u128> = BTreeMap::new();
        for input in &built.unsigned_tx.input {
            let utxo = fixtures
                .iter()
                .find(|utxo| utxo.outpoint() == input.previous_output)
                .expect("spent UTXO missing from fixtures");
            for rune in &utxo.runes {
                *consumed.entry(rune.id).or_default() += rune.amount;
            }
        }
        consumed.retain(|_, amount| *amount > 0);

        let mut routed: BTreeMap<RuneId, u128> = BTreeMap::new();
        for transfer in codec.decode(&built.unsigned_tx).unwrap_or_default() {
            *routed.entry(transfer.id).or_default() += transfer.amount;
        }
        assert_eq!(consumed, routed);

        for (index, output) in built.unsigned_tx.output.iter().enumerate() {
            let value = output.value.to_sat();
            if !output.script_pubkey.is_op_return() {
                assert!(value >= DUST_LIMIT, "output {index} below dust: {value}");
            }
        }
    }

    pub fn user_btc(btc: &[u64]) -> Vec<UnspentOutput> {
        btc.iter()
            .enumerate()
            .map(|(n, value)| user_btc_utxo(200 + n as u8, *value))
            .collect()
    }

    pub fn context<'a>(codec: &'a dyn RuneCodec, fee_rate: u64, btc: &[u64]) -> ActionContext<'a> {
        ActionContext::new(
            config(),
            FeeRate::try_from(fee_rate).unwrap(),
            user_p2tr().to_string(),
            user_btc(btc),
            codec,
        )
    }

    pub fn pool(address: &bitcoin::Address, nonce: u64) -> PoolInfo {
        PoolInfo::new("pool", address.to_string(), nonce)
    }

    /// Rune transfers carried by the built transaction.
    pub fn transfers(built: &BuiltAction, codec: &dyn RuneCodec) -> Vec<RuneTransfer> {
        codec.decode(&built.unsigned_tx).unwrap_or_default()
    }
}
