use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::error::BuilderError;

/// Fee rate in sat/vB. Always finite and strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FeeRate(f64);

impl FeeRate {
    pub fn n(&self) -> f64 {
        self.0
    }

    /// Fee for `vsize` virtual bytes, rounded up.
    pub fn fee(&self, vsize: usize) -> Amount {
        Amount::from_sat((vsize as f64 * self.0).ceil() as u64)
    }

    /// Fee for `vsize` scaled by `margin_bps / 10_000`, rounded up.
    ///
    /// The vsize is scaled in integers first so whole-number rates give exact results.
    pub fn fee_with_margin(&self, vsize: usize, margin_bps: u64) -> Result<u64, BuilderError> {
        let scaled = (vsize as u64)
            .checked_mul(margin_bps)
            .ok_or(BuilderError::CalcOverflow)?;
        let fee = (scaled as f64 * self.0 / 10_000.0).ceil();

        if !fee.is_finite() || fee > u64::MAX as f64 {
            return Err(BuilderError::CalcOverflow);
        }

        Ok(fee as u64)
    }
}

impl TryFrom<f64> for FeeRate {
    type Error = BuilderError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value <= 0.0 {
            return Err(BuilderError::InvalidFeeRate);
        }
        Ok(FeeRate(value))
    }
}

impl TryFrom<u64> for FeeRate {
    type Error = BuilderError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        FeeRate::try_from(value as f64)
    }
}

impl From<FeeRate> for f64 {
    fn from(rate: FeeRate) -> Self {
        rate.0
    }
}
