use bitcoin::Sequence;

/// Minimum value of any output this crate creates, in sats.
pub const DUST_LIMIT: u64 = 546;

/// Value carried by outputs that only exist to receive runes or inscriptions.
pub const RUNE_CARRIER_VALUE: u64 = DUST_LIMIT;

/// Upper bound on user UTXOs pulled in to pay fees.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// The measured fee is multiplied by this before selection compares it against the inputs.
pub const FEE_SAFETY_MULTIPLIER: u64 = 2;

/// Headroom applied to the measured vsize to absorb ECDSA signature length variance, in basis
/// points (10_600 = x1.06).
pub const VSIZE_SAFETY_MARGIN_BPS: u64 = 10_600;

pub const RBF_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;
pub const FINAL_SEQUENCE: Sequence = Sequence::MAX;

pub const DEFAULT_SIGNER_TIMEOUT_SECS: u64 = 120;

pub const COOKIE_EXCHANGE_ID: &str = "cookie";
pub const RICHSWAP_EXCHANGE_ID: &str = "rich_swap";
pub const ORDI_EXCHANGE_ID: &str = "rich_ordi";
