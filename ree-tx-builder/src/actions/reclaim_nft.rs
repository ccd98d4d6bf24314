//! Reclaim a deposited NFT from an ordi pool by paying runes back.

use ree_safe_math::safe_add;

use super::{ActionContext, BuiltAction, Completion, PoolInfo};
use crate::{
    constants::{ORDI_EXCHANGE_ID, RUNE_CARRIER_VALUE},
    error::BuilderError,
    intention::{ActionType, CoinBalance, Intention, IntentionDetail},
    rune::RuneId,
    runestone::RuneLedger,
    selection::select_rune_utxos,
    utxo_info::UnspentOutput,
};

#[derive(Clone, Debug)]
pub struct ReclaimNftRequest {
    pub pool: PoolInfo,
    pub pool_inscription_utxo: UnspentOutput,
    pub pool_rune_utxo: UnspentOutput,
    pub user_rune_utxos: Vec<UnspentOutput>,
    pub rune_id: RuneId,
    pub send_rune_amount: u128,
    pub inscription_id: String,
    pub nft_deposit_id: String,
}

/// Inputs: the pool inscription UTXO (0), the pool rune UTXO (1), user rune UTXOs, user sats.
/// Outputs: OP_RETURN (0), user receives the inscription (1), pool keeps its runes plus the
/// payment (2), user rune change (3) when any remains, change.
pub fn build_reclaim_nft(
    ctx: &ActionContext<'_>,
    req: &ReclaimNftRequest,
) -> Result<BuiltAction, BuilderError> {
    let pool_amount = req.pool_rune_utxo.require_rune(&req.rune_id)?;
    let paying = select_rune_utxos(&req.user_rune_utxos, req.rune_id, req.send_rune_amount)?;

    let mut builder = ctx.builder()?;

    builder.add_input(req.pool_inscription_utxo.clone())?;
    builder.add_input(req.pool_rune_utxo.clone())?;
    for utxo in &paying {
        builder.add_input(utxo.clone())?;
    }

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, safe_add(pool_amount, req.send_rune_amount)?, 2)?;
    let has_change = ledger.has_remaining();
    ledger.route_remaining_to(3)?;

    let transfers = ctx.add_runestone(&mut builder, ledger)?;
    builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&req.pool.address, RUNE_CARRIER_VALUE)?;
    if has_change {
        builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    }

    ctx.complete(
        builder,
        Completion {
            action: ActionType::ReclaimNft,
            pool: &req.pool,
            transfers,
            also_signs: ctx.other_owner(&paying),
            largest_first: false,
            detail: IntentionDetail::ReclaimNft {
                rune_id: req.rune_id,
                inscription_id: req.inscription_id.clone(),
                nft_deposit_id: req.nft_deposit_id.clone(),
                send_rune_amount: req.send_rune_amount,
            },
        },
        |_| {
            vec![Intention::new(
                ORDI_EXCHANGE_ID,
                ActionType::ReclaimNft,
                &req.pool.address,
                req.pool.nonce,
            )
            .with_params(req.nft_deposit_id.clone())
            .input_coin(
                &ctx.payment_address,
                CoinBalance::rune(req.rune_id, req.send_rune_amount),
            )
            .output_coin(&ctx.payment_address, CoinBalance::btc(RUNE_CARRIER_VALUE))]
        },
    )
}
