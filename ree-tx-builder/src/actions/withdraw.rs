//! Withdraw runes from a cookie pool.

use super::{ActionContext, BuiltAction, Completion, PoolInfo};
use crate::{
    constants::{COOKIE_EXCHANGE_ID, RUNE_CARRIER_VALUE},
    error::BuilderError,
    intention::{ActionType, CoinBalance, Intention, IntentionDetail},
    rune::RuneId,
    runestone::RuneLedger,
    utxo_info::UnspentOutput,
};

#[derive(Clone, Debug)]
pub struct WithdrawRequest {
    pub pool: PoolInfo,
    pub pool_utxo: UnspentOutput,
    pub rune_id: RuneId,
    pub amount: u128,
}

/// Outputs: the pool keeps its sats and the rest of its runes (0), the user receives
/// `amount` (1), OP_RETURN (2), change.
pub fn build_withdraw(
    ctx: &ActionContext<'_>,
    req: &WithdrawRequest,
) -> Result<BuiltAction, BuilderError> {
    let mut builder = ctx.builder()?;

    builder.add_input(req.pool_utxo.clone())?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, req.amount, 1)?;
    ledger.route_remaining_to(0)?;

    builder.add_output(&req.pool.address, req.pool_utxo.value)?;
    builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    let transfers = ctx.add_runestone(&mut builder, ledger)?;

    ctx.complete(
        builder,
        Completion {
            action: ActionType::Withdraw,
            pool: &req.pool,
            transfers,
            also_signs: None,
            largest_first: false,
            detail: IntentionDetail::Withdraw {
                rune_id: req.rune_id,
                amount: req.amount,
            },
        },
        |_| {
            vec![Intention::new(
                COOKIE_EXCHANGE_ID,
                ActionType::Withdraw,
                &req.pool.address,
                req.pool.nonce,
            )
            .output_coin(
                &ctx.payment_address,
                CoinBalance::rune(req.rune_id, req.amount),
            )]
        },
    )
}
