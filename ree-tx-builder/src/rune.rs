use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::serde::{deserialize_u128, serialize_u128};

/// Identifier of a rune (`block:tx` of its etching) or, as [`RuneId::BTC`], of bitcoin itself.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuneId {
    pub block: u64,
    pub tx: u32,
}

impl RuneId {
    pub const BTC: Self = RuneId { block: 0, tx: 0 };

    pub const fn new(block: u64, tx: u32) -> Self {
        Self { block, tx }
    }

    pub fn is_btc(&self) -> bool {
        *self == Self::BTC
    }
}

impl fmt::Display for RuneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.tx)
    }
}

impl FromStr for RuneId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, tx) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid rune id {s}: expected 'block:tx'"))?;

        let block = block
            .parse::<u64>()
            .map_err(|_| format!("Invalid block number in rune id {s}"))?;
        let tx = tx
            .parse::<u32>()
            .map_err(|_| format!("Invalid transaction index in rune id {s}"))?;

        Ok(RuneId::new(block, tx))
    }
}

impl Serialize for RuneId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuneId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RuneId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuneAmount {
    pub id: RuneId,
    #[serde(serialize_with = "serialize_u128", deserialize_with = "deserialize_u128")]
    pub amount: u128,
}

impl RuneAmount {
    pub fn new(id: RuneId, amount: u128) -> Self {
        Self { id, amount }
    }
}
