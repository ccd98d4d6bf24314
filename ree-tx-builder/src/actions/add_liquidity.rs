//! Move sats and runes from a cookie pool into a swap pool as liquidity.
//!
//! This is the only action touching two pools, so its intention set has two legs, each
//! checked against its own pool nonce.

use ree_safe_math::safe_sub;
use serde_json::json;

use super::{ActionContext, BuiltAction, Completion, PoolInfo};
use crate::{
    constants::{COOKIE_EXCHANGE_ID, RICHSWAP_EXCHANGE_ID},
    error::BuilderError,
    intention::{ActionType, CoinBalance, Intention, IntentionDetail},
    rune::RuneId,
    runestone::RuneLedger,
    utxo_info::UnspentOutput,
};

#[derive(Clone, Debug)]
pub struct AddLiquidityRequest {
    pub cookie_pool: PoolInfo,
    pub cookie_pool_utxo: UnspentOutput,
    pub swap_pool: PoolInfo,
    pub rune_id: RuneId,
    pub rune_amount: u128,
    pub btc_amount: u64,
    pub game_id: u64,
}

/// Outputs: cookie pool keeps `sats - btc_amount` and its remaining runes (0), swap pool
/// receives `btc_amount` and `rune_amount` (1), OP_RETURN (2), change.
pub fn build_add_liquidity(
    ctx: &ActionContext<'_>,
    req: &AddLiquidityRequest,
) -> Result<BuiltAction, BuilderError> {
    if req.btc_amount < ctx.config.dust_limit {
        return Err(BuilderError::OutputBelowDust(req.btc_amount));
    }

    let remaining_sats = safe_sub(req.cookie_pool_utxo.value, req.btc_amount)
        .ok()
        .filter(|sats| *sats >= ctx.config.dust_limit)
        .ok_or(BuilderError::InsufficientFunds {
            shortfall: req
                .btc_amount
                .saturating_add(ctx.config.dust_limit)
                .saturating_sub(req.cookie_pool_utxo.value),
        })?;

    let mut builder = ctx.builder()?;

    builder.add_input(req.cookie_pool_utxo.clone())?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, req.rune_amount, 1)?;
    ledger.route_remaining_to(0)?;

    builder.add_output(&req.cookie_pool.address, remaining_sats)?;
    builder.add_output(&req.swap_pool.address, req.btc_amount)?;
    let transfers = ctx.add_runestone(&mut builder, ledger)?;

    let rune = CoinBalance::rune(req.rune_id, req.rune_amount);
    let btc = CoinBalance::btc(req.btc_amount);

    ctx.complete(
        builder,
        Completion {
            action: ActionType::AddLiquidity,
            pool: &req.cookie_pool,
            transfers,
            also_signs: None,
            largest_first: false,
            detail: IntentionDetail::AddLiquidity {
                rune_id: req.rune_id,
                rune_amount: req.rune_amount,
                btc_amount: req.btc_amount,
                game_id: req.game_id,
            },
        },
        |_| {
            vec![
                Intention::new(
                    COOKIE_EXCHANGE_ID,
                    ActionType::AddLiquidity,
                    &req.cookie_pool.address,
                    req.cookie_pool.nonce,
                )
                .with_params(json!({ "game_id": req.game_id }).to_string())
                .output_coin(&req.swap_pool.address, rune)
                .output_coin(&req.swap_pool.address, btc),
                Intention::new(
                    RICHSWAP_EXCHANGE_ID,
                    ActionType::AddLiquidity,
                    &req.swap_pool.address,
                    req.swap_pool.nonce,
                )
                .input_coin(&req.cookie_pool.address, btc)
                .input_coin(&req.cookie_pool.address, rune),
            ]
        },
    )
}
