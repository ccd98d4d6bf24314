use std::fmt;

use bitcoin::{Address, Network, OutPoint, PublicKey, ScriptBuf, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::{
    address::{classify_parsed, parse_address, AddressType},
    error::BuilderError,
    rune::{RuneAmount, RuneId},
};

/// A spendable output together with everything needed to spend it.
///
/// `runes` is always present; an empty list means the UTXO only carries sats and may be used
/// to pay fees.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    pub address: String,
    pub script_pubkey: ScriptBuf,
    pub address_type: AddressType,
    #[serde(default)]
    pub runes: Vec<RuneAmount>,
    #[serde(default)]
    pub public_key: Option<PublicKey>,
    /// Previous transaction, needed by signers of legacy inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<Transaction>,
}

impl UnspentOutput {
    pub fn new(
        outpoint: OutPoint,
        value: u64,
        address: &str,
        network: Network,
    ) -> Result<Self, BuilderError> {
        let parsed = parse_address(address, network)?;
        Ok(Self::from_address(outpoint, value, &parsed))
    }

    pub fn from_address(outpoint: OutPoint, value: u64, address: &Address) -> Self {
        Self {
            txid: outpoint.txid,
            vout: outpoint.vout,
            value,
            address: address.to_string(),
            script_pubkey: address.script_pubkey(),
            address_type: classify_parsed(address),
            runes: Vec::new(),
            public_key: None,
            raw_tx: None,
        }
    }

    pub fn with_runes(mut self, runes: Vec<RuneAmount>) -> Self {
        self.runes = runes;
        self
    }

    pub fn with_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn with_raw_tx(mut self, raw_tx: Transaction) -> Self {
        self.raw_tx = Some(raw_tx);
        self
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn has_runes(&self) -> bool {
        self.runes.iter().any(|rune| rune.amount > 0)
    }

    /// Total amount of `id` on this UTXO. Duplicate entries are summed.
    pub fn rune_amount(&self, id: &RuneId) -> Option<u128> {
        self.runes
            .iter()
            .filter(|rune| rune.id == *id)
            .map(|rune| rune.amount)
            .reduce(|a, b| a.saturating_add(b))
    }

    /// Like [`Self::rune_amount`] but fails when the rune is absent.
    pub fn require_rune(&self, id: &RuneId) -> Result<u128, BuilderError> {
        self.rune_amount(id).ok_or(BuilderError::RuneNotFound(*id))
    }
}

impl fmt::Display for UnspentOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl PartialEq for UnspentOutput {
    fn eq(&self, other: &Self) -> bool {
        self.outpoint() == other.outpoint()
    }
}

impl Eq for UnspentOutput {}
