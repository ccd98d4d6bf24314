//! Claim runes back from an ordi pool after being outbid.

use super::{ActionContext, BuiltAction, Completion, PoolInfo};
use crate::{
    constants::{ORDI_EXCHANGE_ID, RUNE_CARRIER_VALUE},
    error::BuilderError,
    intention::{ActionType, CoinBalance, Intention, IntentionDetail},
    rune::RuneId,
    runestone::RuneLedger,
    utxo_info::UnspentOutput,
};

#[derive(Clone, Debug)]
pub struct ClaimBidRequest {
    pub pool: PoolInfo,
    pub pool_rune_utxo: UnspentOutput,
    pub rune_id: RuneId,
    pub receive_rune_amount: u128,
    pub inscription_id: String,
    pub nft_deposit_id: String,
}

/// Outputs: OP_RETURN (0), user receives the claim (1), pool rune change (2) when any remains,
/// change.
pub fn build_claim_bid(
    ctx: &ActionContext<'_>,
    req: &ClaimBidRequest,
) -> Result<BuiltAction, BuilderError> {
    let mut builder = ctx.builder()?;

    builder.add_input(req.pool_rune_utxo.clone())?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, req.receive_rune_amount, 1)?;
    let pool_keeps = ledger.has_remaining();
    ledger.route_remaining_to(2)?;

    let transfers = ctx.add_runestone(&mut builder, ledger)?;
    builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    if pool_keeps {
        builder.add_output(&req.pool.address, RUNE_CARRIER_VALUE)?;
    }

    ctx.complete(
        builder,
        Completion {
            action: ActionType::ClaimBid,
            pool: &req.pool,
            transfers,
            also_signs: None,
            largest_first: false,
            detail: IntentionDetail::ClaimBid {
                rune_id: req.rune_id,
                inscription_id: req.inscription_id.clone(),
                nft_deposit_id: req.nft_deposit_id.clone(),
                receive_rune_amount: req.receive_rune_amount,
            },
        },
        |_| {
            vec![Intention::new(
                ORDI_EXCHANGE_ID,
                ActionType::ClaimBid,
                &req.pool.address,
                req.pool.nonce,
            )
            .with_params(req.nft_deposit_id.clone())
            .output_coin(
                &ctx.payment_address,
                CoinBalance::rune(req.rune_id, req.receive_rune_amount),
            )]
        },
    )
}
