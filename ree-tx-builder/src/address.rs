use std::str::FromStr;

use bitcoin::{address::AddressType as BitcoinAddressType, Address, Network};
use serde::{Deserialize, Serialize};

use crate::{error::BuilderError, input_calc};

/// Spending template of an address, which decides how its inputs are signed and what they cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressType {
    P2pkh,
    P2wpkh,
    P2wsh,
    P2tr,
    P2shP2wpkh,
    Unknown,
}

impl AddressType {
    pub fn is_taproot(&self) -> bool {
        matches!(self, AddressType::P2tr)
    }

    /// Marginal vsize of spending one input of this type, or `None` when it can't be
    /// predicted without knowing the script.
    pub fn added_virtual_size(&self) -> Option<f64> {
        match self {
            AddressType::P2wpkh => Some(input_calc::P2WPKH_INPUT_VSIZE),
            AddressType::P2tr => Some(input_calc::P2TR_INPUT_VSIZE),
            AddressType::P2pkh => Some(input_calc::P2PKH_INPUT_VSIZE),
            AddressType::P2shP2wpkh => Some(input_calc::P2SH_P2WPKH_INPUT_VSIZE),
            AddressType::P2wsh | AddressType::Unknown => None,
        }
    }
}

/// Parses `address` and checks it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, BuilderError> {
    Address::from_str(address)
        .map_err(|e| BuilderError::InvalidAddress(format!("{address}: {e}")))?
        .require_network(network)
        .map_err(|e| BuilderError::InvalidAddress(format!("{address}: {e}")))
}

/// Maps an address to its [`AddressType`].
///
/// Base58 script-hash addresses are assumed to wrap a P2WPKH program, which is the only
/// nested form wallets hand out for payments.
pub fn classify(address: &str, network: Network) -> Result<AddressType, BuilderError> {
    let address = parse_address(address, network)?;
    Ok(classify_parsed(&address))
}

pub fn classify_parsed(address: &Address) -> AddressType {
    match address.address_type() {
        Some(BitcoinAddressType::P2pkh) => AddressType::P2pkh,
        Some(BitcoinAddressType::P2sh) => AddressType::P2shP2wpkh,
        Some(BitcoinAddressType::P2wpkh) => AddressType::P2wpkh,
        Some(BitcoinAddressType::P2wsh) => AddressType::P2wsh,
        Some(BitcoinAddressType::P2tr) => AddressType::P2tr,
        _ => AddressType::Unknown,
    }
}

/// Shorthand for `classify(address)?.added_virtual_size()`.
pub fn added_virtual_size(address: &str, network: Network) -> Result<Option<f64>, BuilderError> {
    Ok(classify(address, network)?.added_virtual_size())
}

#[cfg(test)]
mod tests {
    use bitcoin::{KnownHrp, WitnessProgram, WitnessVersion};

    use super::*;

    const MAINNET_P2TR: &str =
        "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr";
    const MAINNET_P2WPKH: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const MAINNET_P2WSH: &str =
        "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3";
    const MAINNET_P2PKH: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
    const MAINNET_P2SH: &str = "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy";

    #[test]
    fn classifies_every_supported_type() {
        let net = Network::Bitcoin;
        assert_eq!(classify(MAINNET_P2TR, net), Ok(AddressType::P2tr));
        assert_eq!(classify(MAINNET_P2WPKH, net), Ok(AddressType::P2wpkh));
        assert_eq!(classify(MAINNET_P2WSH, net), Ok(AddressType::P2wsh));
        assert_eq!(classify(MAINNET_P2PKH, net), Ok(AddressType::P2pkh));
        assert_eq!(classify(MAINNET_P2SH, net), Ok(AddressType::P2shP2wpkh));
    }

    #[test]
    fn rejects_garbage_and_wrong_network() {
        assert!(matches!(
            classify("not-an-address", Network::Bitcoin),
            Err(BuilderError::InvalidAddress(_))
        ));
        assert!(matches!(
            classify(MAINNET_P2TR, Network::Regtest),
            Err(BuilderError::InvalidAddress(_))
        ));
    }

    #[test]
    fn future_witness_versions_are_unknown() {
        let program = WitnessProgram::new(WitnessVersion::V2, &[7u8; 32]).unwrap();
        let address = Address::from_witness_program(program, KnownHrp::Regtest);

        assert_eq!(classify_parsed(&address), AddressType::Unknown);
        assert_eq!(
            classify(&address.to_string(), Network::Regtest),
            Ok(AddressType::Unknown)
        );
        assert_eq!(AddressType::Unknown.added_virtual_size(), None);
    }

    #[test]
    fn added_size_follows_type() {
        assert_eq!(
            added_virtual_size(MAINNET_P2TR, Network::Bitcoin),
            Ok(Some(57.5))
        );
        assert_eq!(
            added_virtual_size(MAINNET_P2PKH, Network::Bitcoin),
            Ok(Some(149.0))
        );
        assert_eq!(
            added_virtual_size(MAINNET_P2WSH, Network::Bitcoin),
            Ok(None)
        );
    }
}
