//! Deterministic regtest fixtures shared by the unit tests.

use bitcoin::{
    hashes::Hash,
    key::{Keypair, Secp256k1},
    script::{Instruction, PushBytesBuf},
    Address, CompressedPublicKey, Network, OutPoint, PublicKey, ScriptBuf, Transaction, Txid,
};

use crate::{
    config::BuilderConfig,
    error::BuilderError,
    fee_rate::FeeRate,
    rune::{RuneAmount, RuneId},
    runestone::{RuneCodec, RuneTransfer},
    utxo_info::UnspentOutput,
    TransactionBuilder,
};

pub const NETWORK: Network = Network::Regtest;
pub const RUNE: RuneId = RuneId::new(840_000, 1);

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_seckey_slice(&Secp256k1::new(), &[seed; 32]).unwrap()
}

pub fn public_key(seed: u8) -> PublicKey {
    PublicKey::new(keypair(seed).public_key())
}

pub fn p2tr_address(seed: u8) -> Address {
    let (xonly, _) = keypair(seed).x_only_public_key();
    Address::p2tr(&Secp256k1::new(), xonly, None, NETWORK)
}

pub fn p2wpkh_address(seed: u8) -> Address {
    Address::p2wpkh(&CompressedPublicKey(keypair(seed).public_key()), NETWORK)
}

pub fn p2sh_p2wpkh_address(seed: u8) -> Address {
    Address::p2shwpkh(&CompressedPublicKey(keypair(seed).public_key()), NETWORK)
}

pub fn p2pkh_address(seed: u8) -> Address {
    Address::p2pkh(public_key(seed).pubkey_hash(), NETWORK)
}

pub fn p2wsh_address() -> Address {
    Address::p2wsh(&ScriptBuf::from_bytes(vec![0x51]), NETWORK)
}

pub fn user_p2tr() -> Address {
    p2tr_address(1)
}

pub fn pool_p2tr() -> Address {
    p2tr_address(9)
}

pub fn outpoint(n: u8, vout: u32) -> OutPoint {
    OutPoint::new(Txid::from_byte_array([n; 32]), vout)
}

pub fn config() -> BuilderConfig {
    BuilderConfig::for_network(NETWORK)
}

pub fn builder(fee_rate: u64) -> TransactionBuilder {
    let mut builder = TransactionBuilder::new(config());
    builder.set_fee_rate(FeeRate::try_from(fee_rate).unwrap());
    builder
}

/// A sats-only UTXO owned by `address`, with its key attached when `seed` is known.
pub fn btc_utxo(n: u8, value: u64, address: &Address, seed: u8) -> UnspentOutput {
    UnspentOutput::from_address(outpoint(n, 0), value, address).with_public_key(public_key(seed))
}

pub fn user_btc_utxo(n: u8, value: u64) -> UnspentOutput {
    btc_utxo(n, value, &user_p2tr(), 1)
}

pub fn rune_utxo(n: u8, address: &Address, seed: u8, amount: u128) -> UnspentOutput {
    btc_utxo(n, 546, address, seed).with_runes(vec![RuneAmount::new(RUNE, amount)])
}

pub fn pool_rune_utxo(n: u8, amount: u128) -> UnspentOutput {
    rune_utxo(n, &pool_p2tr(), 9, amount)
}

/// Fixed-width codec so tests can read transfers back without the runestone format.
///
/// Each transfer is `block (8) | tx (4) | amount (16) | output (4)`, little endian, in a single
/// OP_RETURN push.
pub struct TestCodec;

impl RuneCodec for TestCodec {
    fn encode(&self, transfers: &[RuneTransfer]) -> Result<ScriptBuf, BuilderError> {
        let mut bytes = Vec::with_capacity(transfers.len() * 32);
        for transfer in transfers {
            if transfer.amount == 0 {
                return Err(BuilderError::RuneEncoding("zero amount".into()));
            }
            bytes.extend_from_slice(&transfer.id.block.to_le_bytes());
            bytes.extend_from_slice(&transfer.id.tx.to_le_bytes());
            bytes.extend_from_slice(&transfer.amount.to_le_bytes());
            bytes.extend_from_slice(&transfer.output.to_le_bytes());
        }
        let push = PushBytesBuf::try_from(bytes)
            .map_err(|e| BuilderError::RuneEncoding(e.to_string()))?;
        Ok(ScriptBuf::new_op_return(push))
    }

    fn decode(&self, tx: &Transaction) -> Option<Vec<RuneTransfer>> {
        let script = &tx
            .output
            .iter()
            .find(|output| output.script_pubkey.is_op_return())?
            .script_pubkey;

        let bytes = script
            .instructions()
            .filter_map(Result::ok)
            .find_map(|instruction| match instruction {
                Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
                Instruction::Op(_) => None,
            })?;

        bytes
            .chunks(32)
            .map(|chunk| {
                Some(RuneTransfer::new(
                    RuneId::new(
                        u64::from_le_bytes(chunk.get(0..8)?.try_into().ok()?),
                        u32::from_le_bytes(chunk.get(8..12)?.try_into().ok()?),
                    ),
                    u128::from_le_bytes(chunk.get(12..28)?.try_into().ok()?),
                    u32::from_le_bytes(chunk.get(28..32)?.try_into().ok()?),
                ))
            })
            .collect()
    }
}
