//! Which inputs the user's wallet signs, and how.
//!
//! Pool inputs are co-signed by the settlement service and never appear here.

use serde::{Deserialize, Serialize};

use crate::{error::BuilderError, utxo_info::UnspentOutput, TransactionBuilder};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SigningMethod {
    /// Taproot key spend. The wallet derives and tweaks the key from the address.
    #[serde(rename_all = "camelCase")]
    ByAddress {
        address: String,
        disable_tweak_signer: bool,
    },
    /// Every other input type, signed with the untweaked key.
    #[serde(rename_all = "camelCase")]
    ByPublicKey {
        public_key: String,
        disable_tweak_signer: bool,
    },
}

/// One input the wallet must sign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDescriptor {
    pub index: usize,
    #[serde(flatten)]
    pub method: SigningMethod,
}

impl SigningDescriptor {
    fn for_input(index: usize, utxo: &UnspentOutput) -> Result<Self, BuilderError> {
        let method = if utxo.address_type.is_taproot() {
            SigningMethod::ByAddress {
                address: utxo.address.clone(),
                disable_tweak_signer: false,
            }
        } else {
            let public_key = utxo
                .public_key
                .ok_or(BuilderError::MissingPublicKey(index))?;
            SigningMethod::ByPublicKey {
                public_key: public_key.to_string(),
                disable_tweak_signer: true,
            }
        };

        Ok(Self { index, method })
    }
}

/// Descriptors for every input of `builder` owned by `initiating_address`.
pub fn classify_signing_inputs(
    builder: &TransactionBuilder,
    initiating_address: &str,
) -> Result<Vec<SigningDescriptor>, BuilderError> {
    classify_signing_inputs_for(builder, &[initiating_address])
}

/// Like [`classify_signing_inputs`], for a user who owns several addresses, such as a payment
/// address plus an ordinals address holding inscriptions.
pub fn classify_signing_inputs_for(
    builder: &TransactionBuilder,
    owned_addresses: &[&str],
) -> Result<Vec<SigningDescriptor>, BuilderError> {
    builder
        .inputs()
        .iter()
        .enumerate()
        .filter(|(_, input)| owned_addresses.contains(&input.utxo.address.as_str()))
        .map(|(index, input)| SigningDescriptor::for_input(index, &input.utxo))
        .collect()
}

/// UTXOs of `owned_addresses` spent by `builder`, in input order.
pub fn spent_user_utxos(builder: &TransactionBuilder, owned_addresses: &[&str]) -> Vec<UnspentOutput> {
    builder
        .inputs()
        .iter()
        .filter(|input| owned_addresses.contains(&input.utxo.address.as_str()))
        .map(|input| input.utxo.clone())
        .collect()
}
