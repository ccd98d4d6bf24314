//! Settlement-facing intentions and the local activity record.
//!
//! The settlement service checks each [`Intention`] against the named pool before co-signing
//! the pool inputs. Coin values and nonces travel as decimal strings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::BuilderError, fee_rate::FeeRate, rune::RuneId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinBalance {
    pub id: RuneId,
    #[serde(
        serialize_with = "crate::serde::serialize_u128",
        deserialize_with = "crate::serde::deserialize_u128"
    )]
    pub value: u128,
}

impl CoinBalance {
    pub fn btc(sats: u64) -> Self {
        Self {
            id: RuneId::BTC,
            value: sats as u128,
        }
    }

    pub fn rune(id: RuneId, value: u128) -> Self {
        Self { id, value }
    }
}

/// Coin taken from `from` by the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCoin {
    pub from: String,
    pub coin: CoinBalance,
}

/// Coin the pool hands to `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCoin {
    pub to: String,
    pub coin: CoinBalance,
}

/// Pool actions this crate builds transactions for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Register,
    Withdraw,
    AddLiquidity,
    DepositNft,
    Auction,
    ClaimBid,
    SettleBid,
    ReclaimNft,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Register => "register",
            ActionType::Withdraw => "withdraw",
            ActionType::AddLiquidity => "add_liquidity",
            ActionType::DepositNft => "deposit_nft",
            ActionType::Auction => "auction",
            ActionType::ClaimBid => "claim_bid",
            ActionType::SettleBid => "settle_bid",
            ActionType::ReclaimNft => "reclaim_nft",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a settlement: what a single pool is expected to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intention {
    pub exchange_id: String,
    pub action: String,
    pub action_params: String,
    pub pool_address: String,
    /// Pool nonce read right before building. Settlement fails if the pool has moved on.
    #[serde(
        serialize_with = "crate::serde::serialize_u64",
        deserialize_with = "crate::serde::deserialize_u64"
    )]
    pub nonce: u64,
    pub pool_utxo_spent: Vec<String>,
    pub pool_utxo_received: Vec<String>,
    pub input_coins: Vec<InputCoin>,
    pub output_coins: Vec<OutputCoin>,
}

impl Intention {
    pub fn new(exchange_id: &str, action: ActionType, pool_address: &str, nonce: u64) -> Self {
        Self {
            exchange_id: exchange_id.to_string(),
            action: action.as_str().to_string(),
            action_params: String::new(),
            pool_address: pool_address.to_string(),
            nonce,
            pool_utxo_spent: Vec::new(),
            pool_utxo_received: Vec::new(),
            input_coins: Vec::new(),
            output_coins: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.action_params = params.into();
        self
    }

    pub fn input_coin(mut self, from: &str, coin: CoinBalance) -> Self {
        self.input_coins.push(InputCoin {
            from: from.to_string(),
            coin,
        });
        self
    }

    pub fn output_coin(mut self, to: &str, coin: CoinBalance) -> Self {
        self.output_coins.push(OutputCoin {
            to: to.to_string(),
            coin,
        });
        self
    }

    pub fn spends(mut self, outpoint: impl ToString) -> Self {
        self.pool_utxo_spent.push(outpoint.to_string());
        self
    }

    pub fn receives(mut self, outpoint: impl ToString) -> Self {
        self.pool_utxo_received.push(outpoint.to_string());
        self
    }
}

/// Every intention enacted by one transaction, plus who pays for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentionSet {
    pub initiator_address: String,
    #[serde(
        serialize_with = "crate::serde::serialize_u64",
        deserialize_with = "crate::serde::deserialize_u64"
    )]
    pub tx_fee_in_sats: u64,
    pub intentions: Vec<Intention>,
}

impl IntentionSet {
    pub fn new(initiator_address: &str, tx_fee_in_sats: u64) -> Self {
        Self {
            initiator_address: initiator_address.to_string(),
            tx_fee_in_sats,
            intentions: Vec::new(),
        }
    }

    /// Adds the leg of one pool. A pool takes part at most once per set.
    pub fn push(&mut self, intention: Intention) -> Result<(), BuilderError> {
        if self
            .intentions
            .iter()
            .any(|existing| existing.pool_address == intention.pool_address)
        {
            return Err(BuilderError::DuplicatePoolIntention(intention.pool_address));
        }
        self.intentions.push(intention);
        Ok(())
    }

    /// Nonce expected for `pool_address`, if that pool is part of the set.
    pub fn nonce_of(&self, pool_address: &str) -> Option<u64> {
        self.intentions
            .iter()
            .find(|intention| intention.pool_address == pool_address)
            .map(|intention| intention.nonce)
    }
}

/// Payload of the settlement call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeArgs {
    pub psbt_hex: String,
    pub intention_set: IntentionSet,
    #[serde(default)]
    pub initiator_utxo_proof: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Broadcasted,
    Confirming,
    Finalized,
    Rejected(String),
    Failed(String),
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Finalized
                | TransactionStatus::Rejected(_)
                | TransactionStatus::Failed(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBasic {
    pub name: String,
    pub address: String,
}

/// Action-specific fields shown in the activity list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentionDetail {
    Register {
        register_fee: u64,
    },
    Withdraw {
        rune_id: RuneId,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        amount: u128,
    },
    AddLiquidity {
        rune_id: RuneId,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        rune_amount: u128,
        btc_amount: u64,
        game_id: u64,
    },
    DepositNft {
        rune_id: RuneId,
        inscription_id: String,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        receive_rune_amount: u128,
    },
    Auction {
        rune_id: RuneId,
        inscription_id: String,
        nft_deposit_id: String,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        send_rune_amount: u128,
    },
    ClaimBid {
        rune_id: RuneId,
        inscription_id: String,
        nft_deposit_id: String,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        receive_rune_amount: u128,
    },
    SettleBid {
        rune_id: RuneId,
        inscription_id: String,
        nft_deposit_id: String,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        final_price: u128,
    },
    ReclaimNft {
        rune_id: RuneId,
        inscription_id: String,
        nft_deposit_id: String,
        #[serde(
            serialize_with = "crate::serde::serialize_u128",
            deserialize_with = "crate::serde::deserialize_u128"
        )]
        send_rune_amount: u128,
    },
}

/// Local activity-ledger entry for one built action, used for status polling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentionRecord {
    pub action_type: ActionType,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub pool: PoolBasic,
    pub txid: String,
    pub invoke_action: String,
    #[serde(
        serialize_with = "crate::serde::serialize_u64",
        deserialize_with = "crate::serde::deserialize_u64"
    )]
    pub fee: u64,
    pub fee_rate: FeeRate,
    pub initiator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_block_height: Option<u32>,
    pub detail: IntentionDetail,
}

impl IntentionRecord {
    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RUNE;

    fn withdraw_intention() -> Intention {
        Intention::new("cookie", ActionType::Withdraw, "pool", 5)
            .output_coin("user", CoinBalance::rune(RUNE, 1_000))
    }

    mod intention_set {
        use super::*;

        #[test]
        fn rejects_second_leg_for_same_pool() {
            let mut set = IntentionSet::new("user", 300);
            set.push(withdraw_intention()).unwrap();

            assert_eq!(
                set.push(withdraw_intention()),
                Err(BuilderError::DuplicatePoolIntention("pool".into()))
            );
            assert_eq!(set.intentions.len(), 1);
            assert_eq!(set.nonce_of("pool"), Some(5));
            assert_eq!(set.nonce_of("other"), None);
        }

        #[test]
        fn serializes_numbers_as_strings() {
            let mut set = IntentionSet::new("user", 300);
            set.push(
                withdraw_intention()
                    .input_coin("user", CoinBalance::btc(546))
                    .spends("aa:0"),
            )
            .unwrap();

            let json = serde_json::to_value(&set).unwrap();
            assert_eq!(json["tx_fee_in_sats"], "300");

            let intention = &json["intentions"][0];
            assert_eq!(intention["action"], "withdraw");
            assert_eq!(intention["nonce"], "5");
            assert_eq!(intention["pool_utxo_spent"][0], "aa:0");
            assert_eq!(intention["output_coins"][0]["coin"]["id"], "840000:1");
            assert_eq!(intention["output_coins"][0]["coin"]["value"], "1000");
            assert_eq!(intention["input_coins"][0]["coin"]["id"], "0:0");

            let back: IntentionSet = serde_json::from_value(json).unwrap();
            assert_eq!(back, set);
        }
    }

    mod records {
        use super::*;

        #[test]
        fn record_round_trips_through_json() {
            let mut record = IntentionRecord {
                action_type: ActionType::SettleBid,
                status: TransactionStatus::Pending,
                timestamp: Utc::now(),
                pool: PoolBasic {
                    name: "ordi".into(),
                    address: "pool".into(),
                },
                txid: "ab".repeat(32),
                invoke_action: ActionType::SettleBid.to_string(),
                fee: 1_200,
                fee_rate: FeeRate::try_from(3.5).unwrap(),
                initiator: "user".into(),
                included_block_height: None,
                detail: IntentionDetail::SettleBid {
                    rune_id: RUNE,
                    inscription_id: "i0".into(),
                    nft_deposit_id: "7".into(),
                    final_price: 2_000,
                },
            };
            record.set_status(TransactionStatus::Rejected("pool state expired".into()));

            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["detail"]["kind"], "settle_bid");
            assert_eq!(json["status"]["status"], "rejected");

            let back: IntentionRecord = serde_json::from_value(json).unwrap();
            assert_eq!(back, record);
            assert!(back.status.is_terminal());
        }
    }
}
