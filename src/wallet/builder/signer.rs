use bitcoin::hashes::Hash as _;
use bitcoin::key::{TapTweak, UntweakedKeypair};
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::secp256k1::{self, All, Secp256k1};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::{
    ecdsa, taproot, EcdsaSighashType, PrivateKey, Script, ScriptBuf, TapSighashType, Transaction,
    TxOut, WPubkeyHash, Witness,
};

use crate::utils::bytes_to_push_bytes;
use crate::{InscribeError, InscribeResult};

/// The supported funding scriptPubKey shapes, derived once per input. A P2SH
/// prevout is assumed to wrap a P2WPKH witness program; anything else is
/// rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    P2tr,
    P2pkh,
    P2wpkh,
    P2shP2wpkh,
}

impl ScriptKind {
    pub fn classify(script: &Script) -> InscribeResult<Self> {
        if script.is_p2tr() {
            Ok(Self::P2tr)
        } else if script.is_p2pkh() {
            Ok(Self::P2pkh)
        } else if script.is_p2wpkh() {
            Ok(Self::P2wpkh)
        } else if script.is_p2sh() {
            Ok(Self::P2shP2wpkh)
        } else {
            Err(InscribeError::UnsupportedScriptType)
        }
    }
}

/// Signs every input of a commit transaction against its prevout, keyed by
/// input position. Also used for the fee-estimation dry pass, where the keys
/// may be throwaways: only the signature sizes matter there.
pub struct CommitSigner<'a> {
    pub secp: &'a Secp256k1<All>,
    pub prevouts: &'a [TxOut],
    pub keys: &'a [PrivateKey],
}

impl CommitSigner<'_> {
    pub fn sign(&self, transaction: Transaction) -> InscribeResult<Transaction> {
        if transaction.input.len() != self.prevouts.len() || self.keys.len() != self.prevouts.len()
        {
            return Err(InscribeError::InvalidInputs);
        }

        let mut cache = SighashCache::new(transaction);
        let mut script_sigs: Vec<Option<ScriptBuf>> = vec![None; self.prevouts.len()];

        for index in 0..self.prevouts.len() {
            self.sign_input(&mut cache, index, &mut script_sigs)?;
        }

        let mut transaction = cache.into_transaction();
        for (index, script_sig) in script_sigs.into_iter().enumerate() {
            if let Some(script_sig) = script_sig {
                transaction.input[index].script_sig = script_sig;
            }
        }

        Ok(transaction)
    }

    fn sign_input(
        &self,
        cache: &mut SighashCache<Transaction>,
        index: usize,
        script_sigs: &mut [Option<ScriptBuf>],
    ) -> InscribeResult<()> {
        let prevout = &self.prevouts[index];
        let key = &self.keys[index];

        match ScriptKind::classify(&prevout.script_pubkey)? {
            ScriptKind::P2tr => {
                let sighash = cache.taproot_key_spend_signature_hash(
                    index,
                    &Prevouts::All(self.prevouts),
                    TapSighashType::Default,
                )?;
                // key-path spends sign with the output key: tweak with an
                // empty merkle root
                let keypair = UntweakedKeypair::from_secret_key(self.secp, &key.inner)
                    .tap_tweak(self.secp, None)
                    .to_inner();
                let msg = secp256k1::Message::from_digest(sighash.to_byte_array());
                let signature = taproot::Signature {
                    sig: self.secp.sign_schnorr_no_aux_rand(&msg, &keypair),
                    hash_ty: TapSighashType::Default,
                };

                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                *cache
                    .witness_mut(index)
                    .ok_or(InscribeError::InputNotFound(index))? = witness;
            }
            ScriptKind::P2pkh => {
                let sighash = cache.legacy_signature_hash(
                    index,
                    &prevout.script_pubkey,
                    EcdsaSighashType::All.to_u32(),
                )?;
                let signature = self.sign_ecdsa(sighash.to_byte_array(), key);
                let pubkey = key.public_key(self.secp);

                script_sigs[index] = Some(
                    ScriptBuilder::new()
                        .push_slice(bytes_to_push_bytes(&signature.to_vec())?)
                        .push_slice(bytes_to_push_bytes(&pubkey.to_bytes())?)
                        .into_script(),
                );
            }
            ScriptKind::P2wpkh => {
                let sighash = cache.p2wpkh_signature_hash(
                    index,
                    &prevout.script_pubkey,
                    prevout.value,
                    EcdsaSighashType::All,
                )?;
                let signature = self.sign_ecdsa(sighash.to_byte_array(), key);
                let pubkey = key.public_key(self.secp);

                *cache
                    .witness_mut(index)
                    .ok_or(InscribeError::InputNotFound(index))? =
                    Witness::p2wpkh(&signature, &pubkey.inner);
            }
            ScriptKind::P2shP2wpkh => {
                let pubkey = key.public_key(self.secp);
                let redeem_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey.to_bytes()));

                let sighash = cache.p2wpkh_signature_hash(
                    index,
                    &redeem_script,
                    prevout.value,
                    EcdsaSighashType::All,
                )?;
                let signature = self.sign_ecdsa(sighash.to_byte_array(), key);

                *cache
                    .witness_mut(index)
                    .ok_or(InscribeError::InputNotFound(index))? =
                    Witness::p2wpkh(&signature, &pubkey.inner);
                script_sigs[index] = Some(
                    ScriptBuilder::new()
                        .push_slice(bytes_to_push_bytes(redeem_script.as_bytes())?)
                        .into_script(),
                );
            }
        }

        Ok(())
    }

    fn sign_ecdsa(&self, digest: [u8; 32], key: &PrivateKey) -> ecdsa::Signature {
        let msg = secp256k1::Message::from_digest(digest);
        ecdsa::Signature::sighash_all(self.secp.sign_ecdsa(&msg, &key.inner))
    }
}
