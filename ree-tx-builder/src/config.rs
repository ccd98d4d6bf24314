use std::time::Duration;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_MAX_CANDIDATES, DEFAULT_SIGNER_TIMEOUT_SECS, DUST_LIMIT, FEE_SAFETY_MULTIPLIER,
        VSIZE_SAFETY_MARGIN_BPS,
    },
    error::BuilderError,
};

/// Knobs shared by every action builder. Missing JSON fields fall back to the defaults.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub network: Network,
    pub dust_limit: u64,
    pub max_candidates: usize,
    pub fee_safety_multiplier: u64,
    pub vsize_margin_bps: u64,
    pub enable_rbf: bool,
    pub signer_timeout_secs: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            dust_limit: DUST_LIMIT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            fee_safety_multiplier: FEE_SAFETY_MULTIPLIER,
            vsize_margin_bps: VSIZE_SAFETY_MARGIN_BPS,
            enable_rbf: false,
            signer_timeout_secs: DEFAULT_SIGNER_TIMEOUT_SECS,
        }
    }
}

impl BuilderConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, BuilderError> {
        let config: BuilderConfig =
            serde_json::from_str(json).map_err(|e| BuilderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.fee_safety_multiplier == 0 {
            return Err(BuilderError::InvalidConfig(
                "fee_safety_multiplier must be at least 1".into(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(BuilderError::InvalidConfig(
                "max_candidates must be at least 1".into(),
            ));
        }
        if self.vsize_margin_bps < 10_000 {
            return Err(BuilderError::InvalidConfig(
                "vsize_margin_bps can't shrink the measured size".into(),
            ));
        }
        Ok(())
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_secs(self.signer_timeout_secs)
    }
}
