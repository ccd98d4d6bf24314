//! Rune directive assembly.
//!
//! A rune balance on a spent input that no edict routes is burned by the protocol, and an edict
//! with amount zero moves everything left of that rune. The [`RuneLedger`] keeps both mistakes
//! out of a transfer list before it reaches a [`RuneCodec`].

use std::collections::BTreeMap;

use bitcoin::{ScriptBuf, Transaction, TxOut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::BuilderError, rune::RuneId, BuilderInput};

/// Largest OP_RETURN script relayed by default policy.
pub const MAX_OP_RETURN_SIZE: usize = 83;

/// One edict: `amount` of `id` goes to output `output`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneTransfer {
    pub id: RuneId,
    #[serde(
        serialize_with = "crate::serde::serialize_u128",
        deserialize_with = "crate::serde::deserialize_u128"
    )]
    pub amount: u128,
    pub output: u32,
}

impl RuneTransfer {
    pub fn new(id: RuneId, amount: u128, output: u32) -> Self {
        Self { id, amount, output }
    }
}

/// Encodes transfer lists into an output script and reads them back from transactions.
pub trait RuneCodec: Send + Sync {
    fn encode(&self, transfers: &[RuneTransfer]) -> Result<ScriptBuf, BuilderError>;

    /// Transfers carried by `tx`, or `None` when it has no valid directive.
    fn decode(&self, tx: &Transaction) -> Option<Vec<RuneTransfer>>;
}

/// Rune balances consumed by a transaction and where they are sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuneLedger {
    consumed: BTreeMap<RuneId, u128>,
    routed: BTreeMap<RuneId, u128>,
    transfers: Vec<RuneTransfer>,
}

impl RuneLedger {
    pub fn from_inputs(inputs: &[BuilderInput]) -> Result<Self, BuilderError> {
        let mut ledger = Self::default();

        for rune in inputs.iter().flat_map(|input| &input.utxo.runes) {
            let consumed = ledger.consumed.entry(rune.id).or_default();
            *consumed = consumed
                .checked_add(rune.amount)
                .ok_or(BuilderError::CalcOverflow)?;
        }

        Ok(ledger)
    }

    pub fn consumed(&self, id: &RuneId) -> u128 {
        self.consumed.get(id).copied().unwrap_or(0)
    }

    /// Amount of `id` not routed yet.
    pub fn remaining(&self, id: &RuneId) -> u128 {
        let routed = self.routed.get(id).copied().unwrap_or(0);
        self.consumed(id).saturating_sub(routed)
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.values().all(|amount| *amount == 0)
    }

    /// Whether any rune still needs a destination.
    pub fn has_remaining(&self) -> bool {
        self.consumed.keys().any(|id| self.remaining(id) > 0)
    }

    /// Sends `amount` of `id` to `output`. Zero amounts are skipped.
    pub fn route(&mut self, id: RuneId, amount: u128, output: u32) -> Result<(), BuilderError> {
        if amount == 0 {
            return Ok(());
        }
        if !self.consumed.contains_key(&id) {
            return Err(BuilderError::RuneNotFound(id));
        }

        let remaining = self.remaining(&id);
        if amount > remaining {
            return Err(BuilderError::InsufficientRunes {
                expected: amount,
                found: remaining,
            });
        }

        *self.routed.entry(id).or_default() += amount;

        match self
            .transfers
            .iter_mut()
            .find(|transfer| transfer.id == id && transfer.output == output)
        {
            Some(transfer) => transfer.amount += amount,
            None => self.transfers.push(RuneTransfer::new(id, amount, output)),
        }

        Ok(())
    }

    /// Sends whatever is left of every rune to `output`.
    pub fn route_remaining_to(&mut self, output: u32) -> Result<(), BuilderError> {
        let ids: Vec<RuneId> = self.consumed.keys().copied().collect();
        for id in ids {
            let remaining = self.remaining(&id);
            self.route(id, remaining, output)?;
        }
        Ok(())
    }

    pub fn transfers(&self) -> &[RuneTransfer] {
        &self.transfers
    }

    /// Checks that every consumed rune is routed in full and returns the transfer list.
    pub fn finish(self) -> Result<Vec<RuneTransfer>, BuilderError> {
        for (id, consumed) in &self.consumed {
            let routed = self.routed.get(id).copied().unwrap_or(0);
            if routed != *consumed {
                return Err(BuilderError::TokenAccountingMismatch {
                    rune: *id,
                    consumed: *consumed,
                    routed,
                });
            }
        }

        debug!(transfers = self.transfers.len(), "rune ledger balanced");

        Ok(self.transfers)
    }
}

/// Checks that every transfer targets an existing, spendable output.
pub fn check_targets(transfers: &[RuneTransfer], outputs: &[TxOut]) -> Result<(), BuilderError> {
    for transfer in transfers {
        match outputs.get(transfer.output as usize) {
            None => {
                return Err(BuilderError::RuneEncoding(format!(
                    "edict for {} targets output {} of {}",
                    transfer.id,
                    transfer.output,
                    outputs.len()
                )))
            }
            Some(output) if output.script_pubkey.is_op_return() => {
                return Err(BuilderError::RuneEncoding(format!(
                    "edict for {} targets the OP_RETURN output {}",
                    transfer.id, transfer.output
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(feature = "runes")]
pub use self::ordinals_codec::OrdinalsRuneCodec;

#[cfg(feature = "runes")]
mod ordinals_codec {
    use bitcoin::{ScriptBuf, Transaction};
    use ordinals::{Artifact, Edict, Runestone};

    use super::{RuneCodec, RuneTransfer, MAX_OP_RETURN_SIZE};
    use crate::{error::BuilderError, rune::RuneId};

    /// [`RuneCodec`] over the `ordinals` runestone format.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct OrdinalsRuneCodec;

    impl RuneCodec for OrdinalsRuneCodec {
        fn encode(&self, transfers: &[RuneTransfer]) -> Result<ScriptBuf, BuilderError> {
            if transfers.is_empty() {
                return Err(BuilderError::RuneEncoding("no transfers to encode".into()));
            }

            let edicts = transfers
                .iter()
                .map(|transfer| {
                    if transfer.amount == 0 {
                        return Err(BuilderError::RuneEncoding(format!(
                            "zero amount edict for {}",
                            transfer.id
                        )));
                    }
                    Ok(Edict {
                        id: ordinals::RuneId {
                            block: transfer.id.block,
                            tx: transfer.id.tx,
                        },
                        amount: transfer.amount,
                        output: transfer.output,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let script = Runestone {
                edicts,
                ..Default::default()
            }
            .encipher();

            if script.len() > MAX_OP_RETURN_SIZE {
                return Err(BuilderError::RuneEncoding(format!(
                    "runestone of {} bytes exceeds {MAX_OP_RETURN_SIZE}",
                    script.len()
                )));
            }

            Ok(script)
        }

        fn decode(&self, tx: &Transaction) -> Option<Vec<RuneTransfer>> {
            match Runestone::decipher(tx)? {
                Artifact::Runestone(runestone) => Some(
                    runestone
                        .edicts
                        .into_iter()
                        .map(|edict| {
                            RuneTransfer::new(
                                RuneId::new(edict.id.block, edict.id.tx),
                                edict.amount,
                                edict.output,
                            )
                        })
                        .collect(),
                ),
                Artifact::Cenotaph(_) => None,
            }
        }
    }

}
