//! Settle a finished auction: the NFT goes to the winning bidder and the revenue above the
//! starting price is shared between the depositor and the fee collector.

use ree_safe_math::{percent_of, safe_sub};

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
pub struct SettleBidRequest {
    pub pool: PoolInfo,
    pub pool_inscription_utxo: UnspentOutput,
    pub pool_rune_utxo: UnspentOutput,
    pub rune_id: RuneId,
    pub inscription_id: String,
    pub nft_deposit_id: String,
    pub start_price: u128,
    pub final_price: u128,
    pub depositor_address: String,
    /// Percent of the revenue.
    pub depositor_share: u8,
    pub fee_collector_address: String,
    /// Percent of the revenue.
    pub fee_collector_share: u8,
}

impl SettleBidRequest {
    /// Rune amounts owed to the depositor and the fee collector.
    pub fn shares(&self) -> Result<(u128, u128), BuilderError> {
        let revenue = safe_sub(self.final_price, self.start_price)?;
        Ok((
            percent_of(revenue, self.depositor_share)?,
            percent_of(revenue, self.fee_collector_share)?,
        ))
    }
}

/// Inputs: the pool inscription UTXO (0), the pool rune UTXO (1), then user sats largest first.
/// Outputs: OP_RETURN (0), bidder receives the inscription (1), depositor (2), fee collector (3),
/// pool rune change (4), change.
pub fn build_settle_bid(
    ctx: &ActionContext<'_>,
    req: &SettleBidRequest,
) -> Result<BuiltAction, BuilderError> {
    req.pool_rune_utxo.require_rune(&req.rune_id)?;
    let (depositor_amount, collector_amount) = req.shares()?;

    let mut builder = ctx.builder()?;

    builder.add_input(req.pool_inscription_utxo.clone())?;
    builder.add_input(req.pool_rune_utxo.clone())?;

    let mut ledger = RuneLedger::from_inputs(builder.inputs())?;
    ledger.route(req.rune_id, depositor_amount, 2)?;
    ledger.route(req.rune_id, collector_amount, 3)?;
    ledger.route_remaining_to(4)?;

    let transfers = ctx.add_runestone(&mut builder, ledger)?;
    builder.add_output(&ctx.payment_address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&req.depositor_address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&req.fee_collector_address, RUNE_CARRIER_VALUE)?;
    builder.add_output(&req.pool.address, RUNE_CARRIER_VALUE)?;

    ctx.complete(
        builder,
        Completion {
            action: ActionType::SettleBid,
            pool: &req.pool,
            transfers,
            also_signs: None,
            largest_first: true,
            detail: IntentionDetail::SettleBid {
                rune_id: req.rune_id,
                inscription_id: req.inscription_id.clone(),
                nft_deposit_id: req.nft_deposit_id.clone(),
                final_price: req.final_price,
            },
        },
        |_| {
            let mut intention = Intention::new(
                ORDI_EXCHANGE_ID,
                ActionType::SettleBid,
                &req.pool.address,
                req.pool.nonce,
            )
            .with_params(req.nft_deposit_id.clone())
            .output_coin(&ctx.payment_address, CoinBalance::btc(RUNE_CARRIER_VALUE));

            if req.final_price > req.start_price {
                intention = intention
                    .output_coin(
                        &req.depositor_address,
                        CoinBalance::rune(req.rune_id, depositor_amount),
                    )
                    .output_coin(
                        &req.fee_collector_address,
                        CoinBalance::rune(req.rune_id, collector_amount),
                    );
            }

            vec![intention]
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions::test_support::*, runestone::RuneTransfer, test_utils::*};

    fn request(start_price: u128, final_price: u128) -> SettleBidRequest {
        SettleBidRequest {
            pool: pool(&pool_p2tr(), 12),
            pool_inscription_utxo: btc_utxo(2, 546, &pool_p2tr(), 9),
            pool_rune_utxo: pool_rune_utxo(1, 10_000),
            rune_id: RUNE,
            inscription_id: "abcdi0".into(),
            nft_deposit_id: "deposit-9".into(),
            start_price,
            final_price,
            depositor_address: p2tr_address(3).to_string(),
            depositor_share: 80,
            fee_collector_address: p2tr_address(4).to_string(),
            fee_collector_share: 5,
        }
    }

    fn fixtures(ctx: &ActionContext<'_>, req: &SettleBidRequest) -> Vec<UnspentOutput> {
        let mut fixtures = ctx.user_btc_utxos.clone();
        fixtures.push(req.pool_inscription_utxo.clone());
        fixtures.push(req.pool_rune_utxo.clone());
        fixtures
    }

    #[test]
    fn splits_revenue() {
        let req = request(1_000, 3_000);
        let ctx = context(&TestCodec, 2, &[20_000]);

        let built = build_settle_bid(&ctx, &req).unwrap();

        let outputs = &built.unsigned_tx.output;
        assert!(outputs[0].script_pubkey.is_op_return());
        assert_eq!(outputs[1].script_pubkey, user_p2tr().script_pubkey());
        assert_eq!(outputs[2].script_pubkey, p2tr_address(3).script_pubkey());
        assert_eq!(outputs[3].script_pubkey, p2tr_address(4).script_pubkey());
        assert_eq!(outputs[4].script_pubkey, pool_p2tr().script_pubkey());
        assert_eq!(
            transfers(&built, &TestCodec),
            vec![
                RuneTransfer::new(RUNE, 1_600, 2),
                RuneTransfer::new(RUNE, 100, 3),
                RuneTransfer::new(RUNE, 8_300, 4)
            ]
        );
        assert_conserves(&built, &TestCodec, &fixtures(&ctx, &req));

        let intention = &built.intention_set.intentions[0];
        assert_eq!(intention.output_coins.len(), 3);
        assert_eq!(intention.output_coins[1].coin, CoinBalance::rune(RUNE, 1_600));
        assert!(built.to_sign.iter().all(|descriptor| descriptor.index >= 2));
    }

    #[test]
    fn no_revenue_keeps_runes_in_pool() {
        let req = request(2_000, 2_000);
        let ctx = context(&TestCodec, 2, &[20_000]);

        let built = build_settle_bid(&ctx, &req).unwrap();

        assert_eq!(
            transfers(&built, &TestCodec),
            vec![RuneTransfer::new(RUNE, 10_000, 4)]
        );
        assert_eq!(
            built.intention_set.intentions[0].output_coins,
            vec![crate::intention::OutputCoin {
                to: user_p2tr().to_string(),
                coin: CoinBalance::btc(546),
            }]
        );
        assert_conserves(&built, &TestCodec, &fixtures(&ctx, &req));
    }

    #[test]
    fn funds_with_largest_utxo_first() {
        let req = request(1_000, 3_000);
        let ctx = context(&TestCodec, 2, &[3_000, 50_000, 4_000]);

        let built = build_settle_bid(&ctx, &req).unwrap();

        assert_eq!(built.unsigned_tx.input.len(), 3);
        assert_eq!(
            built.unsigned_tx.input[2].previous_output,
            ctx.user_btc_utxos[1].outpoint()
        );
    }

    #[test]
    fn final_price_below_start_is_rejected() {
        let ctx = context(&TestCodec, 2, &[20_000]);
        assert_eq!(
            build_settle_bid(&ctx, &request(3_000, 1_000)).unwrap_err(),
            BuilderError::CalcOverflow
        );
    }
}
