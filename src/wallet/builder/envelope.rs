use bitcoin::key::UntweakedKeypair;
use bitcoin::opcodes;
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::taproot::{ControlBlock, LeafVersion, TaprootBuilder};
use bitcoin::{Address, Network, PrivateKey, ScriptBuf, XOnlyPublicKey};

use crate::utils::bytes_to_push_bytes;
use crate::utils::constants::{MAX_CHUNK_SIZE, PROTOCOL_ID};
use crate::wallet::builder::InscriptionData;
use crate::{InscribeError, InscribeResult};

/// Taproot commitment for one inscription: the tapscript leaf carrying the
/// payload, the P2TR address committing to it, and the control block needed
/// to spend it on the script path.
#[derive(Debug, Clone)]
pub struct InscriptionEnvelope {
    pub keypair: UntweakedKeypair,
    pub leaf_script: ScriptBuf,
    pub address: Address,
    pub control_block: ControlBlock,
}

impl InscriptionEnvelope {
    /// Build the envelope for a single inscription payload. The same reveal
    /// key is used as both the leaf signer and the taproot internal key, so
    /// the single-leaf tree needs no merkle path in its control block.
    pub fn build(
        secp: &Secp256k1<All>,
        reveal_key: &PrivateKey,
        inscription: &InscriptionData,
        network: Network,
    ) -> InscribeResult<Self> {
        let keypair = UntweakedKeypair::from_secret_key(secp, &reveal_key.inner);
        let (x_public_key, _) = keypair.x_only_public_key();

        let leaf_script =
            build_envelope_script(&x_public_key, &inscription.content_type, &inscription.body)?;
        debug!("leaf script: {leaf_script}");

        let taproot_spend_info = TaprootBuilder::new()
            .add_leaf(0, leaf_script.clone())?
            .finalize(secp, x_public_key)
            .ok()
            .ok_or(InscribeError::TaprootCompute)?;

        let address = Address::p2tr_tweaked(taproot_spend_info.output_key(), network);
        let control_block = taproot_spend_info
            .control_block(&(leaf_script.clone(), LeafVersion::TapScript))
            .ok_or(InscribeError::TaprootCompute)?;

        Ok(Self {
            keypair,
            leaf_script,
            address,
            control_block,
        })
    }
}

/// Assemble the tapscript leaf:
///
/// ```text
/// <x-only pubkey> OP_CHECKSIG
/// OP_FALSE OP_IF
///   "ord" 0x01 0x01 <content_type> OP_0
///   <body chunk> ...
/// OP_ENDIF
/// ```
///
/// The body is split into pushes of at most 520 bytes; taproot imposes no
/// overall script size limit, so arbitrarily large payloads reduce to more
/// chunks. `OP_ENDIF` is appended to the serialized script directly.
fn build_envelope_script(
    pubkey: &XOnlyPublicKey,
    content_type: &[u8],
    body: &[u8],
) -> InscribeResult<ScriptBuf> {
    let mut builder = ScriptBuilder::new()
        .push_slice(pubkey.serialize())
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .push_opcode(opcodes::OP_FALSE)
        .push_opcode(opcodes::all::OP_IF)
        .push_slice(PROTOCOL_ID)
        .push_opcode(opcodes::all::OP_PUSHBYTES_1)
        .push_opcode(opcodes::all::OP_PUSHBYTES_1)
        .push_slice(bytes_to_push_bytes(content_type)?)
        .push_opcode(opcodes::OP_0);

    for chunk in body.chunks(MAX_CHUNK_SIZE) {
        builder = builder.push_slice(bytes_to_push_bytes(chunk)?);
    }

    let mut script = builder.into_script().into_bytes();
    script.push(opcodes::all::OP_ENDIF.to_u8());

    Ok(ScriptBuf::from_bytes(script))
}
