//! Bitcoin transaction builder for REE pool actions.
//!
//! This crate assembles the unsigned transactions behind every user action against an REE
//! exchange pool (register, withdraw, add liquidity, NFT deposit, auction bid, claim, settle
//! and reclaim). Each action mixes pool-owned UTXOs with user-owned UTXOs, routes the runes it
//! consumes through a runestone, tops the transaction up with user sats until the measured fee
//! is covered, and emits the [`intention::IntentionSet`] that the settlement service checks
//! against pool state before co-signing.
//!
//! ## Quick Start
//!
//! ```rust
//! use ree_tx_builder::{config::BuilderConfig, fee_rate::FeeRate, TransactionBuilder};
//!
//! let mut builder = TransactionBuilder::new(BuilderConfig::default());
//! builder.set_fee_rate(FeeRate::try_from(10.0)?);
//! builder.set_change_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")?;
//!
//! // Add protocol inputs and outputs, then fund the fee from user UTXOs:
//! // builder.select_and_fund(&user_utxos, config.max_candidates)?;
//! // let psbt = builder.finalize()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`TransactionBuilder`] accumulates inputs and outputs. Output order is insertion order and
//!   never changes, since runestone edicts point at outputs by index.
//! - [`calc_fee`] measures the real vsize of a throwaway, fully signed copy of the transaction.
//! - [`selection`] pulls user UTXOs in, one per round, re-measuring the fee every time.
//! - [`runestone`] keeps rune balances conserved and hands edicts to a [`runestone::RuneCodec`].
//! - [`signing`] tells the wallet which inputs it must sign and how.
//! - [`actions`] holds one builder per pool action; [`invoke`] signs and submits the result.

use bitcoin::{
    absolute::LockTime,
    psbt::Psbt,
    script::{Builder as ScriptBuilder, PushBytesBuf},
    secp256k1::XOnlyPublicKey,
    transaction::Version,
    Amount, CompressedPublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use ree_safe_math::{checked_sum, safe_add};
use tracing::debug;

use crate::{
    address::{parse_address, AddressType},
    config::BuilderConfig,
    constants::{FINAL_SEQUENCE, RBF_SEQUENCE},
    error::BuilderError,
    fee_rate::FeeRate,
    rune::RuneAmount,
    utxo_info::UnspentOutput,
};

pub mod actions;
pub mod address;
pub mod calc_fee;
pub mod config;
pub mod constants;
pub mod error;
pub mod fee_rate;
pub mod input_calc;
pub mod intention;
pub mod invoke;
pub mod rune;
pub mod runestone;
pub mod selection;
mod serde;
pub mod services;
pub mod signing;
pub mod utxo_info;

#[cfg(test)]
pub(crate) mod test_utils;

/// An input plus the PSBT fields its signer needs.
#[derive(Clone, Debug)]
pub struct BuilderInput {
    pub utxo: UnspentOutput,
    pub witness_utxo: TxOut,
    /// Untweaked key of a taproot input, when the owner's key is known.
    pub tap_internal_key: Option<XOnlyPublicKey>,
    /// P2WPKH program wrapped by a P2SH-P2WPKH input.
    pub redeem_script: Option<ScriptBuf>,
}

impl BuilderInput {
    pub fn from_utxo(utxo: UnspentOutput) -> Self {
        let witness_utxo = TxOut {
            value: Amount::from_sat(utxo.value),
            script_pubkey: utxo.script_pubkey.clone(),
        };

        let tap_internal_key = match (utxo.address_type, utxo.public_key) {
            (AddressType::P2tr, Some(pk)) => Some(XOnlyPublicKey::from(pk.inner)),
            _ => None,
        };

        let redeem_script = match (utxo.address_type, utxo.public_key) {
            (AddressType::P2shP2wpkh, Some(pk)) => CompressedPublicKey::try_from(pk)
                .ok()
                .map(|pk| ScriptBuf::new_p2wpkh(&pk.wpubkey_hash())),
            _ => None,
        };

        Self {
            utxo,
            witness_utxo,
            tap_internal_key,
            redeem_script,
        }
    }

    /// scriptSig the input will carry once signed, when it is known before signing.
    pub fn final_script_sig(&self) -> Result<Option<ScriptBuf>, BuilderError> {
        match &self.redeem_script {
            Some(redeem) if self.utxo.address_type == AddressType::P2shP2wpkh => {
                let push = PushBytesBuf::try_from(redeem.to_bytes())
                    .map_err(|e| BuilderError::InvalidPsbt(e.to_string()))?;
                Ok(Some(ScriptBuilder::new().push_slice(push).into_script()))
            }
            _ => Ok(None),
        }
    }
}

/// Mutable accumulator for one action's transaction.
///
/// The builder is single-use: after any error the caller discards it and starts again from
/// fresh pool and UTXO state.
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    config: BuilderConfig,
    inputs: Vec<BuilderInput>,
    outputs: Vec<TxOut>,
    change_index: Option<usize>,
    change_script: Option<ScriptBuf>,
    fee_rate: Option<FeeRate>,
    enable_rbf: bool,
    total_btc_input: u64,
    total_rune_inputs: Vec<RuneAmount>,
}

impl TransactionBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            inputs: Vec::new(),
            outputs: Vec::new(),
            change_index: None,
            change_script: None,
            fee_rate: None,
            enable_rbf: config.enable_rbf,
            total_btc_input: 0,
            total_rune_inputs: Vec::new(),
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn set_fee_rate(&mut self, fee_rate: FeeRate) {
        self.fee_rate = Some(fee_rate);
    }

    pub fn fee_rate(&self) -> Result<FeeRate, BuilderError> {
        self.fee_rate.ok_or(BuilderError::InvalidFeeRate)
    }

    pub fn set_rbf(&mut self, enable: bool) {
        self.enable_rbf = enable;
    }

    pub fn rbf_enabled(&self) -> bool {
        self.enable_rbf
    }

    pub fn set_change_address(&mut self, address: &str) -> Result<(), BuilderError> {
        let address = parse_address(address, self.config.network)?;
        self.change_script = Some(address.script_pubkey());
        Ok(())
    }

    /// Appends `utxo` as the next input and returns its index.
    pub fn add_input(&mut self, utxo: UnspentOutput) -> Result<usize, BuilderError> {
        self.total_btc_input = safe_add(self.total_btc_input, utxo.value)?;

        for rune in &utxo.runes {
            self.add_rune_input(*rune)?;
        }

        self.inputs.push(BuilderInput::from_utxo(utxo));
        Ok(self.inputs.len() - 1)
    }

    /// Drops the most recently added input and returns its UTXO.
    pub fn remove_last_input(&mut self) -> Option<UnspentOutput> {
        let input = self.inputs.pop()?;

        self.total_btc_input = self.total_btc_input.saturating_sub(input.utxo.value);
        for rune in &input.utxo.runes {
            if let Some(total) = self
                .total_rune_inputs
                .iter_mut()
                .find(|total| total.id == rune.id)
            {
                total.amount = total.amount.saturating_sub(rune.amount);
            }
        }
        self.total_rune_inputs.retain(|total| total.amount > 0);

        Some(input.utxo)
    }

    pub fn add_output(&mut self, address: &str, value: u64) -> Result<usize, BuilderError> {
        let address = parse_address(address, self.config.network)?;
        self.push_output(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: address.script_pubkey(),
        })
    }

    pub fn add_script_output(
        &mut self,
        script: ScriptBuf,
        value: u64,
    ) -> Result<usize, BuilderError> {
        self.push_output(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        })
    }

    /// Appends the change output, replacing the previous one if any.
    pub fn add_change_output(&mut self, value: u64) -> Result<usize, BuilderError> {
        let script = self
            .change_script
            .clone()
            .ok_or_else(|| BuilderError::InvalidAddress("change address not set".into()))?;

        self.remove_change_output();
        self.outputs.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        });

        let index = self.outputs.len() - 1;
        self.change_index = Some(index);
        Ok(index)
    }

    pub fn remove_change_output(&mut self) -> Option<TxOut> {
        let index = self.change_index.take()?;
        Some(self.outputs.remove(index))
    }

    pub fn change_index(&self) -> Option<usize> {
        self.change_index
    }

    pub fn change_amount(&self) -> u64 {
        self.change_index
            .and_then(|index| self.outputs.get(index))
            .map(|output| output.value.to_sat())
            .unwrap_or(0)
    }

    pub fn inputs(&self) -> &[BuilderInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    pub fn total_input(&self) -> u64 {
        self.total_btc_input
    }

    pub fn total_output(&self) -> Result<u64, BuilderError> {
        Ok(checked_sum(self.outputs.iter().map(|o| o.value.to_sat()))?)
    }

    /// Rune balances carried by the inputs added so far.
    pub fn total_rune_inputs(&self) -> &[RuneAmount] {
        &self.total_rune_inputs
    }

    /// `total_input - total_output`, i.e. the fee the transaction pays as it stands.
    pub fn fee_paid(&self) -> Result<u64, BuilderError> {
        let total_output = self.total_output()?;
        self.total_btc_input
            .checked_sub(total_output)
            .ok_or_else(|| BuilderError::InsufficientFunds {
                shortfall: total_output - self.total_btc_input,
            })
    }

    pub fn input_sequence(&self) -> Sequence {
        if self.enable_rbf {
            RBF_SEQUENCE
        } else {
            FINAL_SEQUENCE
        }
    }

    /// The transaction as it stands, with empty scriptSigs and witnesses.
    pub fn unsigned_transaction(&self) -> Transaction {
        let sequence = self.input_sequence();

        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.utxo.outpoint(),
                    script_sig: ScriptBuf::new(),
                    sequence,
                    witness: Witness::new(),
                })
                .collect(),
            output: self.outputs.clone(),
        }
    }

    /// Txid the transaction will have once signed.
    ///
    /// Witness data doesn't affect the txid, but the scriptSig of wrapped segwit inputs does,
    /// so those are filled in with the push of their redeem script. The scriptSig of a legacy
    /// or unrecognized input is only known after signing, so the txid is final only when
    /// [`Self::txid_is_final`] holds.
    pub fn txid(&self) -> Result<Txid, BuilderError> {
        let mut tx = self.unsigned_transaction();

        for (tx_in, input) in tx.input.iter_mut().zip(&self.inputs) {
            if let Some(script_sig) = input.final_script_sig()? {
                tx_in.script_sig = script_sig;
            }
        }

        Ok(tx.compute_txid())
    }

    /// Whether every input's scriptSig is known before signing.
    pub fn txid_is_final(&self) -> bool {
        self.inputs.iter().all(|input| {
            !matches!(
                input.utxo.address_type,
                AddressType::P2pkh | AddressType::Unknown
            )
        })
    }

    /// Measured fee of the current transaction. See [`calc_fee::estimate_fee`].
    pub fn estimate_fee(&self) -> Result<u64, BuilderError> {
        calc_fee::estimate_fee(self)
    }

    /// Serializes the builder into a PSBT ready for the signer.
    pub fn finalize(&self) -> Result<Psbt, BuilderError> {
        self.fee_paid()?;

        let mut psbt = Psbt::from_unsigned_tx(self.unsigned_transaction())?;

        for (psbt_input, input) in psbt.inputs.iter_mut().zip(&self.inputs) {
            psbt_input.witness_utxo = Some(input.witness_utxo.clone());
            psbt_input.tap_internal_key = input.tap_internal_key;
            psbt_input.redeem_script = input.redeem_script.clone();

            if input.utxo.address_type == AddressType::P2pkh {
                psbt_input.non_witness_utxo = input.utxo.raw_tx.clone();
            }
        }

        debug!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            fee = self.fee_paid()?,
            "finalized psbt"
        );

        Ok(psbt)
    }

    fn push_output(&mut self, output: TxOut) -> Result<usize, BuilderError> {
        // The change output stays last so that removing it never shifts another output.
        if self.change_index.is_some() {
            return Err(BuilderError::OutputAfterChange);
        }
        self.outputs.push(output);
        Ok(self.outputs.len() - 1)
    }

    fn add_rune_input(&mut self, rune: RuneAmount) -> Result<(), BuilderError> {
        match self
            .total_rune_inputs
            .iter_mut()
            .find(|total| total.id == rune.id)
        {
            Some(total) => {
                total.amount = total
                    .amount
                    .checked_add(rune.amount)
                    .ok_or(BuilderError::CalcOverflow)?;
            }
            None => self.total_rune_inputs.push(rune),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rune::RuneId;
    use crate::test_utils::*;

    mod new {
        use super::*;

        #[test]
        fn creates_empty_transaction_builder() {
            let builder = TransactionBuilder::new(config());

            assert!(builder.inputs().is_empty());
            assert!(builder.outputs().is_empty());
            assert_eq!(builder.total_input(), 0);
            assert_eq!(builder.total_output().unwrap(), 0);
            assert!(builder.total_rune_inputs().is_empty());
            assert_eq!(builder.change_index(), None);
            assert!(!builder.rbf_enabled());
            assert_eq!(builder.fee_rate(), Err(BuilderError::InvalidFeeRate));

            let tx = builder.unsigned_transaction();
            assert_eq!(tx.version, Version::TWO);
            assert_eq!(tx.lock_time, LockTime::ZERO);
        }
    }

    mod inputs {
        use super::*;

        #[test]
        fn add_input_tracks_btc_and_runes() {
            let mut builder = builder(1);
            builder.add_input(pool_rune_utxo(1, 1_000)).unwrap();
            builder.add_input(pool_rune_utxo(2, 500)).unwrap();
            let index = builder.add_input(user_btc_utxo(3, 10_000)).unwrap();

            assert_eq!(index, 2);
            assert_eq!(builder.total_input(), 546 * 2 + 10_000);
            assert_eq!(
                builder.total_rune_inputs(),
                &[RuneAmount::new(RUNE, 1_500)]
            );
        }

        #[test]
        fn remove_last_input_rolls_back_totals() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            builder.add_input(pool_rune_utxo(2, 700)).unwrap();

            let removed = builder.remove_last_input().unwrap();

            assert_eq!(removed.vout, 0);
            assert_eq!(builder.inputs().len(), 1);
            assert_eq!(builder.total_input(), 10_000);
            assert!(builder.total_rune_inputs().is_empty());
            assert!(TransactionBuilder::new(config()).remove_last_input().is_none());
        }

        #[test]
        fn taproot_input_gets_internal_key() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();

            let (xonly, _) = keypair(1).x_only_public_key();
            assert_eq!(builder.inputs()[0].tap_internal_key, Some(xonly));
            assert_eq!(builder.inputs()[0].redeem_script, None);
        }

        #[test]
        fn wrapped_segwit_input_gets_redeem_script() {
            let address = p2sh_p2wpkh_address(4);
            let mut builder = builder(1);
            builder.add_input(btc_utxo(1, 10_000, &address, 4)).unwrap();

            let redeem = builder.inputs()[0].redeem_script.clone().unwrap();
            assert!(redeem.is_p2wpkh());
            assert_eq!(
                ScriptBuf::new_p2sh(&redeem.script_hash()),
                address.script_pubkey()
            );
        }
    }

    mod outputs {
        use super::*;

        #[test]
        fn change_output_replaces_previous_one() {
            let mut builder = builder(1);
            builder.set_change_address(&user_p2tr().to_string()).unwrap();
            builder.add_output(&pool_p2tr().to_string(), 546).unwrap();

            assert_eq!(builder.add_change_output(1_000).unwrap(), 1);
            assert_eq!(builder.add_change_output(2_000).unwrap(), 1);

            assert_eq!(builder.outputs().len(), 2);
            assert_eq!(builder.change_amount(), 2_000);

            let removed = builder.remove_change_output().unwrap();
            assert_eq!(removed.value.to_sat(), 2_000);
            assert_eq!(builder.outputs().len(), 1);
            assert_eq!(builder.change_amount(), 0);
            assert!(builder.remove_change_output().is_none());
        }

        #[test]
        fn change_requires_change_address() {
            let mut builder = builder(1);
            assert!(matches!(
                builder.add_change_output(1_000),
                Err(BuilderError::InvalidAddress(_))
            ));
        }

        #[test]
        fn outputs_cannot_follow_change() {
            let mut builder = builder(1);
            builder.set_change_address(&user_p2tr().to_string()).unwrap();
            builder.add_change_output(1_000).unwrap();

            assert_eq!(
                builder.add_output(&pool_p2tr().to_string(), 546),
                Err(BuilderError::OutputAfterChange)
            );
            assert_eq!(
                builder.add_script_output(ScriptBuf::new(), 0),
                Err(BuilderError::OutputAfterChange)
            );
        }

        #[test]
        fn rejects_address_from_other_network() {
            let mut builder = builder(1);
            let err = builder
                .add_output("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", 546)
                .unwrap_err();
            assert!(matches!(err, BuilderError::InvalidAddress(_)));
        }

        #[test]
        fn output_order_is_insertion_order() {
            let mut builder = builder(1);
            builder
                .add_script_output(ScriptBuf::from_bytes(vec![0x6a, 0x01, 0x01]), 0)
                .unwrap();
            builder.add_output(&user_p2tr().to_string(), 546).unwrap();
            builder.add_output(&pool_p2tr().to_string(), 600).unwrap();

            let outputs = builder.outputs();
            assert!(outputs[0].script_pubkey.is_op_return());
            assert_eq!(outputs[1].script_pubkey, user_p2tr().script_pubkey());
            assert_eq!(outputs[2].value.to_sat(), 600);
        }
    }

    mod fee_paid {
        use super::*;

        #[test]
        fn calculates_fee_paid_correctly() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            builder.add_output(&pool_p2tr().to_string(), 9_000).unwrap();

            assert_eq!(builder.fee_paid().unwrap(), 1_000);
        }

        #[test]
        fn returns_error_when_insufficient_input() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 1_000)).unwrap();
            builder.add_output(&pool_p2tr().to_string(), 1_500).unwrap();

            assert_eq!(
                builder.fee_paid(),
                Err(BuilderError::InsufficientFunds { shortfall: 500 })
            );
            assert!(builder.finalize().is_err());
        }
    }

    mod finalize {
        use super::*;

        #[test]
        fn sequence_follows_rbf_flag() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            builder.add_input(user_btc_utxo(2, 10_000)).unwrap();

            let psbt = builder.finalize().unwrap();
            assert!(psbt
                .unsigned_tx
                .input
                .iter()
                .all(|input| input.sequence == Sequence::MAX));

            builder.set_rbf(true);
            let psbt = builder.finalize().unwrap();
            assert!(psbt
                .unsigned_tx
                .input
                .iter()
                .all(|input| input.sequence.to_consensus_u32() == 0xffff_fffd));
        }

        #[test]
        fn psbt_carries_signing_context() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            builder
                .add_input(btc_utxo(2, 20_000, &p2sh_p2wpkh_address(4), 4))
                .unwrap();
            builder.add_output(&pool_p2tr().to_string(), 25_000).unwrap();

            let psbt = builder.finalize().unwrap();

            assert_eq!(
                psbt.inputs[0].witness_utxo.as_ref().unwrap().value.to_sat(),
                10_000
            );
            assert!(psbt.inputs[0].tap_internal_key.is_some());
            assert!(psbt.inputs[1].redeem_script.is_some());
            assert_eq!(psbt.unsigned_tx.output.len(), 1);
        }
    }

    mod txid {
        use super::*;

        #[test]
        fn matches_unsigned_txid_for_native_segwit() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            builder.add_output(&pool_p2tr().to_string(), 9_000).unwrap();

            assert_eq!(
                builder.txid().unwrap(),
                builder.unsigned_transaction().compute_txid()
            );
        }

        #[test]
        fn includes_redeem_script_for_wrapped_segwit() {
            let mut builder = builder(1);
            builder
                .add_input(btc_utxo(1, 10_000, &p2sh_p2wpkh_address(4), 4))
                .unwrap();
            builder.add_output(&pool_p2tr().to_string(), 9_000).unwrap();

            assert_ne!(
                builder.txid().unwrap(),
                builder.unsigned_transaction().compute_txid()
            );
            assert!(builder.txid_is_final());
        }

        #[test]
        fn legacy_inputs_are_not_final() {
            let mut builder = builder(1);
            builder.add_input(user_btc_utxo(1, 10_000)).unwrap();
            assert!(builder.txid_is_final());

            builder
                .add_input(btc_utxo(2, 10_000, &p2pkh_address(4), 4))
                .unwrap();
            assert!(!builder.txid_is_final());
        }
    }

    #[test]
    fn rune_totals_keep_ids_apart() {
        let mut builder = builder(1);
        let other = RuneId::new(1, 1);
        builder
            .add_input(
                pool_rune_utxo(1, 10).with_runes(vec![
                    RuneAmount::new(RUNE, 10),
                    RuneAmount::new(other, 3),
                ]),
            )
            .unwrap();
        builder.add_input(pool_rune_utxo(2, 5)).unwrap();

        assert_eq!(
            builder.total_rune_inputs(),
            &[RuneAmount::new(RUNE, 15), RuneAmount::new(other, 3)]
        );
    }
}
