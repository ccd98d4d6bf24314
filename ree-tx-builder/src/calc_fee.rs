//! Fee measurement by signing a throwaway copy of the transaction.
//!
//! Size estimates from templates drift whenever an input type or script length changes, so the
//! fee is taken from a real signature instead: every input of the scratch copy is re-pointed to
//! a synthetic output of the same address type, owned by a scratch key, signed and finalized.
//! The resulting vsize is exactly what a wallet-signed transaction weighs, give or take the
//! length variance of DER signatures that [`crate::constants::VSIZE_SAFETY_MARGIN_BPS`] absorbs.

use bitcoin::{
    consensus::encode::serialize,
    ecdsa,
    hashes::{sha256, Hash},
    key::{Keypair, Secp256k1, TapTweak},
    script::{Builder as ScriptBuilder, PushBytesBuf},
    secp256k1::{All, Message, SecretKey},
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    taproot, Amount, CompressedPublicKey, PublicKey, ScriptBuf, Transaction, TxOut, Witness,
};
use tracing::{debug, error};

use crate::{address::AddressType, error::BuilderError, TransactionBuilder};

/// Measured fee of `builder`'s transaction, in sats.
///
/// `ceil(vsize * margin * fee_rate)`. The builder itself is left untouched.
pub fn estimate_fee(builder: &TransactionBuilder) -> Result<u64, BuilderError> {
    let fee_rate = builder.fee_rate()?;
    let vsize = estimate_vsize(builder)?;
    let fee = fee_rate.fee_with_margin(vsize, builder.config().vsize_margin_bps)?;

    debug!(vsize, fee_rate = fee_rate.n(), fee, "estimated fee");

    Ok(fee)
}

/// Vsize of the scratch copy of `builder`'s transaction once every input is signed.
pub fn estimate_vsize(builder: &TransactionBuilder) -> Result<usize, BuilderError> {
    let signed = sign_scratch_copy(builder).map_err(|e| {
        error!(error = %e, "failed to sign the fee estimation copy");
        e
    })?;

    Ok(signed.vsize())
}

fn sign_scratch_copy(builder: &TransactionBuilder) -> Result<Transaction, BuilderError> {
    let secp = Secp256k1::new();
    let mut tx = builder.unsigned_transaction();
    let keys = ScratchKeys::derive(&secp, &tx)?;

    let address_types: Vec<AddressType> = builder
        .inputs()
        .iter()
        .map(|input| input.utxo.address_type)
        .collect();

    let prevouts = address_types
        .iter()
        .zip(builder.inputs())
        .map(|(address_type, input)| {
            Ok(TxOut {
                value: input.witness_utxo.value,
                script_pubkey: keys.script_pubkey(&secp, *address_type)?,
            })
        })
        .collect::<Result<Vec<_>, BuilderError>>()?;

    let mut signed_inputs = Vec::with_capacity(prevouts.len());
    {
        let mut cache = SighashCache::new(&tx);
        for (index, address_type) in address_types.iter().enumerate() {
            signed_inputs.push(keys.sign_input(&secp, &mut cache, index, *address_type, &prevouts)?);
        }
    }

    for (tx_in, (script_sig, witness)) in tx.input.iter_mut().zip(signed_inputs) {
        tx_in.script_sig = script_sig;
        tx_in.witness = witness;
    }

    Ok(tx)
}

struct ScratchKeys {
    keypair: Keypair,
    public_key: PublicKey,
    compressed: CompressedPublicKey,
}

impl ScratchKeys {
    /// The key is derived from the unsigned transaction, so two estimates of the same
    /// transaction sign with the same key and produce the same signatures.
    fn derive(secp: &Secp256k1<All>, tx: &Transaction) -> Result<Self, BuilderError> {
        let seed = sha256::Hash::hash(&serialize(tx));
        let secret_key = SecretKey::from_slice(seed.as_byte_array())
            .map_err(|e| BuilderError::FeeEstimationFailed(e.to_string()))?;

        let keypair = Keypair::from_secret_key(secp, &secret_key);
        let public_key = PublicKey::new(keypair.public_key());

        Ok(Self {
            keypair,
            public_key,
            compressed: CompressedPublicKey(keypair.public_key()),
        })
    }

    fn wpkh_program(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&self.compressed.wpubkey_hash())
    }

    fn script_pubkey(
        &self,
        secp: &Secp256k1<All>,
        address_type: AddressType,
    ) -> Result<ScriptBuf, BuilderError> {
        match address_type {
            AddressType::P2wpkh => Ok(self.wpkh_program()),
            AddressType::P2shP2wpkh => Ok(ScriptBuf::new_p2sh(&self.wpkh_program().script_hash())),
            AddressType::P2pkh => Ok(ScriptBuf::new_p2pkh(&self.public_key.pubkey_hash())),
            AddressType::P2tr => {
                let (internal_key, _) = self.keypair.x_only_public_key();
                Ok(ScriptBuf::new_p2tr(secp, internal_key, None))
            }
            AddressType::P2wsh | AddressType::Unknown => Err(BuilderError::FeeEstimationFailed(
                format!("can't sign a {address_type:?} input with a single key"),
            )),
        }
    }

    fn sign_ecdsa(&self, secp: &Secp256k1<All>, digest: [u8; 32]) -> ecdsa::Signature {
        let message = Message::from_digest(digest);
        ecdsa::Signature {
            signature: secp.sign_ecdsa_low_r(&message, &self.keypair.secret_key()),
            sighash_type: EcdsaSighashType::All,
        }
    }

    /// Returns the scriptSig and witness that finalize input `index`.
    fn sign_input(
        &self,
        secp: &Secp256k1<All>,
        cache: &mut SighashCache<&Transaction>,
        index: usize,
        address_type: AddressType,
        prevouts: &[TxOut],
    ) -> Result<(ScriptBuf, Witness), BuilderError> {
        let failed = |e: String| BuilderError::FeeEstimationFailed(format!("input {index}: {e}"));
        let value: Amount = prevouts[index].value;

        match address_type {
            AddressType::P2wpkh => {
                let sighash = cache
                    .p2wpkh_signature_hash(
                        index,
                        &prevouts[index].script_pubkey,
                        value,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| failed(e.to_string()))?;
                let signature = self.sign_ecdsa(secp, sighash.to_byte_array());

                Ok((
                    ScriptBuf::new(),
                    Witness::p2wpkh(&signature, &self.keypair.public_key()),
                ))
            }
            AddressType::P2shP2wpkh => {
                let redeem_script = self.wpkh_program();
                let sighash = cache
                    .p2wpkh_signature_hash(index, &redeem_script, value, EcdsaSighashType::All)
                    .map_err(|e| failed(e.to_string()))?;
                let signature = self.sign_ecdsa(secp, sighash.to_byte_array());

                let push = PushBytesBuf::try_from(redeem_script.to_bytes())
                    .map_err(|e| failed(e.to_string()))?;
                let script_sig = ScriptBuilder::new().push_slice(push).into_script();

                Ok((
                    script_sig,
                    Witness::p2wpkh(&signature, &self.keypair.public_key()),
                ))
            }
            AddressType::P2pkh => {
                let sighash = cache
                    .legacy_signature_hash(
                        index,
                        &prevouts[index].script_pubkey,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map_err(|e| failed(e.to_string()))?;
                let signature = self.sign_ecdsa(secp, sighash.to_byte_array());

                let push =
                    PushBytesBuf::try_from(signature.to_vec()).map_err(|e| failed(e.to_string()))?;
                let script_sig = ScriptBuilder::new()
                    .push_slice(push)
                    .push_key(&self.public_key)
                    .into_script();

                Ok((script_sig, Witness::new()))
            }
            AddressType::P2tr => {
                let sighash = cache
                    .taproot_key_spend_signature_hash(
                        index,
                        &Prevouts::All(prevouts),
                        TapSighashType::Default,
                    )
                    .map_err(|e| failed(e.to_string()))?;

                let tweaked = self.keypair.tap_tweak(secp, None).to_inner();
                let message = Message::from_digest(sighash.to_byte_array());
                let signature = taproot::Signature {
                    signature: secp.sign_schnorr_no_aux_rand(&message, &tweaked),
                    sighash_type: TapSighashType::Default,
                };

                Ok((ScriptBuf::new(), Witness::p2tr_key_spend(&signature)))
            }
            AddressType::P2wsh | AddressType::Unknown => Err(failed(format!(
                "unsupported input type {address_type:?}"
            ))),
        }
    }
}
