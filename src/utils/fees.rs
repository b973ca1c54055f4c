use bitcoin::consensus::encode;
use bitcoin::{Script, Witness};

use super::constants::{CONTROL_BLOCK_SIZE, SCHNORR_SIGNATURE_SIZE};

/// Serialized size of the reveal witness stack `[signature, leaf_script,
/// control_block]`, measured with zeroed placeholders for the signature and
/// the control block. The real items have exactly these sizes, so the
/// estimate is byte-accurate.
pub fn reveal_witness_size(leaf_script: &Script) -> i64 {
    let mut witness = Witness::new();
    witness.push([0u8; SCHNORR_SIGNATURE_SIZE]);
    witness.push(leaf_script.as_bytes());
    witness.push([0u8; CONTROL_BLOCK_SIZE]);

    encode::serialize(&witness).len() as i64
}

/// Fee contribution of the reveal witness at the given rate: the witness is
/// discounted by the scale factor of 4, with +2 for the segwit marker and
/// flag bytes and +3 to take the ceiling of the division.
pub fn reveal_witness_fee(leaf_script: &Script, fee_rate: i64) -> i64 {
    (reveal_witness_size(leaf_script) + 2 + 3) / 4 * fee_rate
}
