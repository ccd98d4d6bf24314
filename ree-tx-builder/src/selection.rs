//! UTXO selection.
//!
//! Funding is iterative: one candidate per round, with the fee measured again after every
//! addition, because each input changes the size of the transaction it is paying for.

use ree_safe_math::{safe_add, safe_mul, safe_sub};
use tracing::debug;

use crate::{
    error::BuilderError, rune::RuneId, utxo_info::UnspentOutput, TransactionBuilder,
};

/// What [`TransactionBuilder::select_and_fund`] added to the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// Candidates added as inputs, in the order they were added.
    pub selected: Vec<UnspentOutput>,
    /// `total_input - total_output` of the funded transaction.
    pub fee: u64,
    /// Value of the change output, if one was kept.
    pub change: Option<u64>,
}

impl TransactionBuilder {
    /// Measured fee scaled by the configured safety multiplier.
    pub fn padded_fee(&self) -> Result<u64, BuilderError> {
        Ok(safe_mul(
            self.estimate_fee()?,
            self.config().fee_safety_multiplier,
        )?)
    }

    /// Adds sats-only `candidates`, in the given order, until the inputs cover the outputs plus
    /// the padded fee, then settles the change.
    ///
    /// All protocol outputs must already be in place: a change output is appended while
    /// measuring, and nothing may be added after it. Change above the dust limit is kept,
    /// anything at or below it is left to the miner.
    pub fn select_and_fund(
        &mut self,
        candidates: &[UnspentOutput],
        max_candidates: usize,
    ) -> Result<SelectionOutcome, BuilderError> {
        // Placeholder so every measurement includes the change output.
        self.add_change_output(0)?;

        let total_output = self.total_output()?;
        let mut fee = self.padded_fee()?;
        let mut selected = Vec::new();

        let fresh = candidates
            .iter()
            .filter(|utxo| !utxo.has_runes())
            .filter(|utxo| {
                !self
                    .inputs()
                    .iter()
                    .any(|input| input.utxo.outpoint() == utxo.outpoint())
            })
            .take(max_candidates)
            .cloned()
            .collect::<Vec<_>>();

        for (round, utxo) in fresh.into_iter().enumerate() {
            if self.total_input() >= safe_add(total_output, fee)? {
                break;
            }

            let template_vsize = utxo.address_type.added_virtual_size();
            self.add_input(utxo.clone())?;
            selected.push(utxo);
            fee = self.padded_fee()?;

            debug!(
                round,
                template_vsize = ?template_vsize,
                total_input = self.total_input(),
                total_output,
                fee,
                "selection round"
            );
        }

        let required = safe_add(total_output, fee)?;
        if self.total_input() < required {
            self.remove_change_output();
            return Err(BuilderError::InsufficientFunds {
                shortfall: required - self.total_input(),
            });
        }

        let change = safe_sub(safe_sub(self.total_input(), total_output)?, fee)?;
        let change = if change > self.config().dust_limit {
            self.add_change_output(change)?;
            Some(change)
        } else {
            self.remove_change_output();
            None
        };

        Ok(SelectionOutcome {
            selected,
            fee: self.fee_paid()?,
            change,
        })
    }
}

/// Sats-only UTXOs from `utxos`, in order, until their sum reaches `target`.
pub fn select_btc_utxos(
    utxos: &[UnspentOutput],
    target: u64,
) -> Result<Vec<UnspentOutput>, BuilderError> {
    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in utxos.iter().filter(|utxo| !utxo.has_runes()) {
        if total >= target {
            break;
        }
        total = safe_add(total, utxo.value)?;
        selected.push(utxo.clone());
    }

    if total < target {
        return Err(BuilderError::InsufficientFunds {
            shortfall: target - total,
        });
    }

    Ok(selected)
}

/// UTXOs holding `rune_id`, in order, until they carry at least `target` of it.
pub fn select_rune_utxos(
    utxos: &[UnspentOutput],
    rune_id: RuneId,
    target: u128,
) -> Result<Vec<UnspentOutput>, BuilderError> {
    let mut selected = Vec::new();
    let mut found = 0u128;

    for utxo in utxos {
        if found >= target {
            break;
        }
        if let Some(amount) = utxo.rune_amount(&rune_id) {
            found = found.checked_add(amount).ok_or(BuilderError::CalcOverflow)?;
            selected.push(utxo.clone());
        }
    }

    if found < target {
        return Err(BuilderError::InsufficientRunes {
            expected: target,
            found,
        });
    }

    Ok(selected)
}
