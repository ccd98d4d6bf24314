//! Register with a cookie pool by paying its registration fee.

use bitcoin::OutPoint;
use ree_safe_math::safe_add;

use super::{ActionContext, BuiltAction, Completion, PoolInfo};
use crate::{
    constants::COOKIE_EXCHANGE_ID,
    error::BuilderError,
    intention::{ActionType, CoinBalance, Intention, IntentionDetail},
    runestone::RuneLedger,
    utxo_info::UnspentOutput,
};

#[derive(Clone, Debug)]
pub struct RegisterRequest {
    pub pool: PoolInfo,
    pub pool_utxo: UnspentOutput,
    pub register_fee: u64,
}

/// Inputs: the pool UTXO, then user sats.
/// Outputs: the pool with `register_fee` added, an OP_RETURN when the pool UTXO carries runes,
/// then change.
pub fn build_register(
    ctx: &ActionContext<'_>,
    req: &RegisterRequest,
) -> Result<BuiltAction, BuilderError> {
    let mut builder = ctx.builder()?;

    builder.add_input(req.pool_utxo.clone())?;
    builder.add_output(
        &req.pool.address,
        safe_add(req.pool_utxo.value, req.register_fee)?,
    )?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    let transfers = if ledger.is_empty() {
        Vec::new()
    } else {
        ledger.route_remaining_to(0)?;
        ctx.add_runestone(&mut builder, ledger)?
    };

    let pool_spent = req.pool_utxo.outpoint();

    ctx.complete(
        builder,
        Completion {
            action: ActionType::Register,
            pool: &req.pool,
            transfers,
            also_signs: None,
            largest_first: false,
            detail: IntentionDetail::Register {
                register_fee: req.register_fee,
            },
        },
        |txid| {
            vec![Intention::new(
                COOKIE_EXCHANGE_ID,
                ActionType::Register,
                &req.pool.address,
                req.pool.nonce,
            )
            .input_coin(&ctx.payment_address, CoinBalance::btc(req.register_fee))
            .spends(pool_spent)
            .receives(OutPoint::new(txid, 0))]
        },
    )
}
