//! Deposit an inscription into an ordi pool in exchange for runes.

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
pub struct DepositNftRequest {
    pub pool: PoolInfo,
    pub pool_rune_utxo: UnspentOutput,
    /// UTXO holding the inscription, owned by one of the user's addresses.
    pub nft_utxo: UnspentOutput,
    pub inscription_id: String,
    pub rune_id: RuneId,
    pub receive_rune_amount: u128,
}

/// Inputs: the inscription (0) so it lands on the first output it can, the pool rune UTXO (1),
/// then user sats.
/// Outputs: OP_RETURN (0), pool receives the inscription (1), user receives runes (2), pool
/// rune change (3), change.
pub fn build_deposit_nft(
    ctx: &ActionContext<'_>,
    req: &DepositNftRequest,
) -> Result<BuiltAction, BuilderError> {
    req.pool_rune_utxo.require_rune(&req.rune_id)?;

    let mut builder = ctx.builder()?;

    builder.add_input(req.nft_utxo.clone())?;
    builder.add_input(req.pool_rune_utxo.clone())?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, req.receive_rune_amount, 2)?;
    ledger.route_remaining_to(3)?;

    let transfers = ctx.add_runestone(&mut builder, ledger)?;
    builder.add_output(&req.pool.address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&req.pool.address, RUNE_CARRIER_VALUE)?;

    ctx.complete(
        builder,
        Completion {
            action: ActionType::DepositNft,
            pool: &req.pool,
            transfers,
            also_signs: ctx.other_owner([&req.nft_utxo]),
            largest_first: false,
            detail: IntentionDetail::DepositNft {
                rune_id: req.rune_id,
                inscription_id: req.inscription_id.clone(),
                receive_rune_amount: req.receive_rune_amount,
            },
        },
        |_| {
            vec![Intention::new(
                ORDI_EXCHANGE_ID,
                ActionType::DepositNft,
                &req.pool.address,
                req.pool.nonce,
            )
            .with_params(req.inscription_id.clone())
            .input_coin(&ctx.payment_address, CoinBalance::btc(RUNE_CARRIER_VALUE))
            .output_coin(
                &ctx.payment_address,
                CoinBalance::rune(req.rune_id, req.receive_rune_amount),
            )]
        },
    )
}
