//! Marginal virtual size of spending one input, per address type.
//!
//! Witness bytes weigh a quarter of non-witness bytes, hence the `/ 4.0` terms. These figures
//! only feed selection bookkeeping. Billed fees always come from
//! [`crate::calc_fee::estimate_fee`].

/// outpoint (36) + script length (1) + sequence (4)
pub const INPUT_BASE_SIZE: f64 = 41.0;

/// item count + length prefix + DER signature with sighash + length prefix + compressed key
pub const ECDSA_WITNESS_SIZE: f64 = 1.0 + 1.0 + 72.0 + 1.0 + 33.0;

/// item count + length prefix + schnorr signature
pub const SCHNORR_WITNESS_SIZE: f64 = 1.0 + 1.0 + 64.0;

/// scriptSig carrying the push of a 22 byte P2WPKH redeem script, plus its length prefix
pub const NESTED_SEGWIT_SCRIPT_SIG_SIZE: f64 = 24.0;

pub const P2WPKH_INPUT_VSIZE: f64 = INPUT_BASE_SIZE + ECDSA_WITNESS_SIZE / 4.0;
pub const P2TR_INPUT_VSIZE: f64 = INPUT_BASE_SIZE + SCHNORR_WITNESS_SIZE / 4.0;
pub const P2PKH_INPUT_VSIZE: f64 = INPUT_BASE_SIZE + ECDSA_WITNESS_SIZE;
pub const P2SH_P2WPKH_INPUT_VSIZE: f64 =
    INPUT_BASE_SIZE + NESTED_SEGWIT_SCRIPT_SIG_SIZE + ECDSA_WITNESS_SIZE / 4.0;
