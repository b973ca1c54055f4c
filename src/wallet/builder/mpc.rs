//! Externally-signed-commit flow: the commit sighashes leave the process,
//! ECDSA signatures come back and are spliced into the transaction.
//!
//! The unsigned/signed txid pair exists because signing legacy (P2PKH)
//! inputs rewrites the scriptSig and therefore the txid; with segwit-only
//! inputs the two coincide. [`inscribe_for_mpc_signed`] always re-runs the
//! unsigned flow with the post-signing txid so the reveal transactions spend
//! the commit transaction as it will actually be broadcast.

use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::script::Builder as ScriptBuilder;
use bitcoin::secp256k1::{self, SecretKey};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::{
    EcdsaSighashType, Network, PrivateKey, ScriptBuf, TapSighashType, Transaction, Txid,
    WPubkeyHash, Witness,
};

use super::signer::ScriptKind;
use super::{InscriptionBuilder, InscriptionRequest};
use crate::utils::bytes_to_push_bytes;
use crate::{InscribeError, InscribeResult};

/// [`super::InscribeTxs`] plus the digests the external signer must produce,
/// one per commit input. `sig_hash_list` is `None` once the signatures have
/// been spliced in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MpcInscribeTxs {
    pub sig_hash_list: Option<Vec<String>>,
    pub commit_tx: String,
    pub reveal_txs: Vec<String>,
    pub commit_tx_fee: i64,
    pub reveal_tx_fees: Vec<i64>,
    pub commit_addrs: Vec<String>,
}

/// Build the transaction pair without signing the commit: the response
/// carries the unsigned commit hex, the per-input sighash digests, and
/// reveal transactions already Schnorr-signed with the inscription key.
///
/// The reveal prevout txid is `signed_commit_hash` when given, else
/// `unsigned_commit_hash`, else the txid of the commit built here.
pub fn inscribe_for_mpc_unsigned(
    network: Network,
    request: &InscriptionRequest,
    unsigned_commit_hash: Option<Txid>,
    signed_commit_hash: Option<Txid>,
) -> InscribeResult<MpcInscribeTxs> {
    let mut builder = InscriptionBuilder::new(network, request)?;

    // the dry-sign pass only measures signature sizes; a throwaway key keeps
    // real signatures out of the unsigned transaction
    let throwaway = PrivateKey::new(SecretKey::new(&mut rand::thread_rng()), network);
    let dry_sign_keys = vec![throwaway; builder.commit_priv_keys.len()];
    builder.build_commit(request, &dry_sign_keys)?;

    let sig_hash_list = builder.prepare_commit_sighashes(request)?;

    let commit_txid = signed_commit_hash
        .or(unsigned_commit_hash)
        .unwrap_or_else(|| builder.commit_tx.txid());
    builder.complete_reveal(commit_txid)?;

    Ok(builder.into_mpc_txs(Some(sig_hash_list)))
}

/// Splice externally-produced ECDSA signatures into an unsigned commit
/// transaction, then rebuild the bundle against the signed commit txid.
///
/// Each signature is the 128-hex-char compact `r ‖ s` form; it is DER-encoded
/// with a `SIGHASH_ALL` byte and placed in the slot seeded by
/// [`inscribe_for_mpc_unsigned`]: an empty witness means a legacy input whose
/// scriptSig holds the raw public key, otherwise the witness leads with it.
pub fn inscribe_for_mpc_signed(
    network: Network,
    request: &InscriptionRequest,
    commit_tx_hex: &str,
    signatures: &[String],
) -> InscribeResult<MpcInscribeTxs> {
    let mut commit_tx: Transaction = encode::deserialize(&hex::decode(commit_tx_hex)?)?;
    if signatures.len() != commit_tx.input.len() {
        return Err(InscribeError::InvalidInputs);
    }
    let unsigned_commit_hash = commit_tx.txid();

    for (input, signature_hex) in commit_tx.input.iter_mut().zip(signatures) {
        let signature = parse_compact_signature(signature_hex)?;

        if input.witness.is_empty() {
            let pubkey = input.script_sig.as_bytes().to_vec();
            input.script_sig = ScriptBuilder::new()
                .push_slice(bytes_to_push_bytes(&signature)?)
                .push_slice(bytes_to_push_bytes(&pubkey)?)
                .into_script();
        } else {
            let pubkey = input
                .witness
                .nth(0)
                .ok_or(InscribeError::InvalidInputs)?
                .to_vec();
            let mut witness = Witness::new();
            witness.push(&signature);
            witness.push(&pubkey);
            input.witness = witness;
        }
    }

    let signed_commit_hash = commit_tx.txid();
    let signed_commit_hex = encode::serialize_hex(&commit_tx);

    let mut res = inscribe_for_mpc_unsigned(
        network,
        request,
        Some(unsigned_commit_hash),
        Some(signed_commit_hash),
    )?;
    res.sig_hash_list = None;
    res.commit_tx = signed_commit_hex;
    Ok(res)
}

fn parse_compact_signature(signature_hex: &str) -> InscribeResult<Vec<u8>> {
    if signature_hex.len() != 128 {
        return Err(InscribeError::InvalidSignatureHex(
            signature_hex.to_string(),
        ));
    }
    let compact = hex::decode(signature_hex)
        .map_err(|_| InscribeError::InvalidSignatureHex(signature_hex.to_string()))?;
    let signature = secp256k1::ecdsa::Signature::from_compact(&compact)
        .map_err(|_| InscribeError::InvalidSignatureHex(signature_hex.to_string()))?;

    let mut bytes = signature.serialize_der().to_vec();
    bytes.push(EcdsaSighashType::All.to_u32() as u8);
    Ok(bytes)
}

impl InscriptionBuilder {
    /// Compute the digest the external signer must sign for every commit
    /// input, seeding each input with the public key material the signature
    /// splice later relies on. The supplied `public_key` field is treated as
    /// opaque bytes, exactly as the external signer presented it.
    pub(crate) fn prepare_commit_sighashes(
        &mut self,
        request: &InscriptionRequest,
    ) -> InscribeResult<Vec<String>> {
        let mut cache = SighashCache::new(self.commit_tx.clone());
        let mut sig_hash_list = Vec::with_capacity(self.commit_tx.input.len());

        for (index, prevout) in self.commit_prevouts.iter().enumerate() {
            let pubkey_bytes = hex::decode(&request.commit_tx_prev_output_list[index].public_key)?;

            let sig_hash = match ScriptKind::classify(&prevout.script_pubkey)? {
                ScriptKind::P2tr => cache
                    .taproot_key_spend_signature_hash(
                        index,
                        &Prevouts::All(&self.commit_prevouts),
                        TapSighashType::Default,
                    )?
                    .to_byte_array()
                    .to_vec(),
                ScriptKind::P2pkh => {
                    let sig_hash = cache
                        .legacy_signature_hash(
                            index,
                            &prevout.script_pubkey,
                            EcdsaSighashType::All.to_u32(),
                        )?
                        .to_byte_array()
                        .to_vec();

                    self.commit_tx.input[index].script_sig = ScriptBuf::from_bytes(pubkey_bytes);
                    sig_hash
                }
                kind @ (ScriptKind::P2wpkh | ScriptKind::P2shP2wpkh) => {
                    let redeem_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey_bytes));
                    let sig_hash = cache
                        .p2wpkh_signature_hash(
                            index,
                            &redeem_script,
                            prevout.value,
                            EcdsaSighashType::All,
                        )?
                        .to_byte_array()
                        .to_vec();

                    let mut witness = Witness::new();
                    witness.push(&pubkey_bytes);
                    self.commit_tx.input[index].witness = witness;
                    if kind == ScriptKind::P2shP2wpkh {
                        self.commit_tx.input[index].script_sig = ScriptBuilder::new()
                            .push_slice(bytes_to_push_bytes(redeem_script.as_bytes())?)
                            .into_script();
                    }
                    sig_hash
                }
            };

            sig_hash_list.push(hex::encode(sig_hash));
        }

        Ok(sig_hash_list)
    }

    pub(crate) fn into_mpc_txs(self, sig_hash_list: Option<Vec<String>>) -> MpcInscribeTxs {
        let (commit_tx_fee, reveal_tx_fees) = self.calculate_fee();

        MpcInscribeTxs {
            sig_hash_list,
            commit_tx: encode::serialize_hex(&self.commit_tx),
            reveal_txs: self
                .reveal_txs
                .iter()
                .map(|reveal_tx| encode::serialize_hex(reveal_tx))
                .collect(),
            commit_tx_fee,
            reveal_tx_fees,
            commit_addrs: self.commit_addresses,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bitcoin::consensus::encode::deserialize;
    use bitcoin::secp256k1::{All, Message, Secp256k1};
    use bitcoin::{ecdsa, Address, PublicKey};

    use super::*;
    use crate::wallet::builder::{InscriptionData, PrevOutput};

    const WIF: &str = "cVkWbHmoCx6jS8AyPNQqvFr8V9r2qzDHJLaxGDQgDJfxT73w6fuU";
    const FUNDING_TXID: &str = "791b415dc6946d864d368a0e5ec5c09ee2ad39cf298bc6e3f9aec293732cfda7";

    fn key_and_secp() -> (PrivateKey, Secp256k1<All>) {
        (PrivateKey::from_wif(WIF).unwrap(), Secp256k1::new())
    }

    fn prev_output(address: String, pubkey: &PublicKey, amount: i64) -> PrevOutput {
        PrevOutput {
            tx_id: FUNDING_TXID.to_string(),
            v_out: 1,
            amount,
            address,
            private_key: WIF.to_string(),
            public_key: hex::encode(pubkey.to_bytes()),
        }
    }

    fn request(prev_outputs: Vec<PrevOutput>) -> InscriptionRequest {
        let (key, secp) = key_and_secp();
        let change = Address::p2wpkh(&key.public_key(&secp), Network::Testnet)
            .unwrap()
            .to_string();

        InscriptionRequest {
            commit_tx_prev_output_list: prev_outputs,
            commit_fee_rate: 1,
            reveal_fee_rate: 1,
            inscription_data_list: vec![InscriptionData {
                content_type: b"text/plain;charset=utf-8".to_vec(),
                body: b"Hello".to_vec(),
                reveal_addr: "tb1qax89amll2uas5k92tmuc8rdccmqddqw94vrr86".to_string(),
            }],
            reveal_out_value: None,
            change_address: change,
            min_change_value: None,
        }
    }

    fn mixed_request() -> InscriptionRequest {
        let (key, secp) = key_and_secp();
        let pubkey = key.public_key(&secp);
        request(vec![
            prev_output(
                Address::p2wpkh(&pubkey, Network::Testnet)
                    .unwrap()
                    .to_string(),
                &pubkey,
                50_000,
            ),
            prev_output(
                Address::p2pkh(&pubkey, Network::Testnet).to_string(),
                &pubkey,
                50_000,
            ),
            prev_output(
                Address::p2shwpkh(&pubkey, Network::Testnet)
                    .unwrap()
                    .to_string(),
                &pubkey,
                50_000,
            ),
        ])
    }

    fn decode_tx(tx_hex: &str) -> Transaction {
        deserialize(&hex::decode(tx_hex).unwrap()).unwrap()
    }

    #[test]
    fn test_should_prepare_unsigned_commit_with_seeded_inputs() {
        let (key, secp) = key_and_secp();
        let pubkey = key.public_key(&secp);
        let req = mixed_request();

        let res = inscribe_for_mpc_unsigned(Network::Testnet, &req, None, None).unwrap();
        let sig_hash_list = res.sig_hash_list.as_ref().unwrap();
        assert_eq!(sig_hash_list.len(), 3);
        assert!(sig_hash_list.iter().all(|digest| digest.len() == 64));

        let commit = decode_tx(&res.commit_tx);

        // p2wpkh: witness seeded with the raw public key
        assert_eq!(commit.input[0].witness.to_vec(), vec![pubkey.to_bytes()]);
        assert!(commit.input[0].script_sig.is_empty());

        // p2pkh: scriptSig holds the raw public key bytes
        assert_eq!(commit.input[1].script_sig.as_bytes(), pubkey.to_bytes());
        assert!(commit.input[1].witness.is_empty());

        // p2sh-p2wpkh: witness seeded, scriptSig pushes the redeem script
        assert_eq!(commit.input[2].witness.to_vec(), vec![pubkey.to_bytes()]);
        let redeem_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey.to_bytes()));
        let script_sig = commit.input[2].script_sig.as_bytes();
        assert_eq!(script_sig[0] as usize, redeem_script.len());
        assert_eq!(&script_sig[1..], redeem_script.as_bytes());

        // without signed/unsigned overrides the reveals spend the unsigned txid
        let reveal = decode_tx(&res.reveal_txs[0]);
        assert_eq!(reveal.input[0].previous_output.txid, commit.txid());
    }

    #[test]
    fn test_should_emit_key_spend_sighash_for_p2tr_funding() {
        let (key, secp) = key_and_secp();
        let pubkey = key.public_key(&secp);
        let xonly = bitcoin::key::UntweakedKeypair::from_secret_key(&secp, &key.inner)
            .x_only_public_key()
            .0;
        let address = Address::p2tr(&secp, xonly, None, Network::Testnet);
        let req = request(vec![prev_output(address.to_string(), &pubkey, 100_000)]);

        let res = inscribe_for_mpc_unsigned(Network::Testnet, &req, None, None).unwrap();
        let commit = decode_tx(&res.commit_tx);

        // taproot inputs are not seeded
        assert!(commit.input[0].witness.is_empty());
        assert!(commit.input[0].script_sig.is_empty());

        let prevouts = [bitcoin::TxOut {
            value: bitcoin::Amount::from_sat(100_000),
            script_pubkey: address.script_pubkey(),
        }];
        let mut cache = SighashCache::new(commit);
        let expected = cache
            .taproot_key_spend_signature_hash(
                0,
                &Prevouts::All(&prevouts),
                TapSighashType::Default,
            )
            .unwrap();
        assert_eq!(
            res.sig_hash_list.unwrap()[0],
            hex::encode(expected.to_byte_array())
        );
    }

    #[test]
    fn test_should_splice_external_signatures_and_rebase_reveals() {
        let (key, secp) = key_and_secp();
        let pubkey = key.public_key(&secp);
        let req = mixed_request();

        let unsigned = inscribe_for_mpc_unsigned(Network::Testnet, &req, None, None).unwrap();
        let unsigned_commit = decode_tx(&unsigned.commit_tx);
        let unsigned_txid = unsigned_commit.txid();

        // play the external signer: raw ECDSA over each digest
        let signatures: Vec<String> = unsigned
            .sig_hash_list
            .as_ref()
            .unwrap()
            .iter()
            .map(|digest| {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&hex::decode(digest).unwrap());
                let signature = secp.sign_ecdsa(&Message::from_digest(bytes), &key.inner);
                hex::encode(signature.serialize_compact())
            })
            .collect();

        let signed =
            inscribe_for_mpc_signed(Network::Testnet, &req, &unsigned.commit_tx, &signatures)
                .unwrap();
        assert!(signed.sig_hash_list.is_none());

        let signed_commit = decode_tx(&signed.commit_tx);
        let signed_txid = signed_commit.txid();
        // the legacy input makes the txid change on signing
        assert_ne!(signed_txid, unsigned_txid);

        // reveals must spend the commit as it will be broadcast
        for reveal_hex in &signed.reveal_txs {
            let reveal = decode_tx(reveal_hex);
            assert_eq!(reveal.input[0].previous_output.txid, signed_txid);
        }

        // p2wpkh witness is [der_sig+hashtype, pubkey] and the signature
        // verifies against the BIP-143 digest
        let witness = signed_commit.input[0].witness.to_vec();
        assert_eq!(witness.len(), 2);
        assert_eq!(witness[1], pubkey.to_bytes());

        let redeem_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey.to_bytes()));
        let mut cache = SighashCache::new(signed_commit.clone());
        let sighash = cache
            .p2wpkh_signature_hash(
                0,
                &redeem_script,
                bitcoin::Amount::from_sat(50_000),
                EcdsaSighashType::All,
            )
            .unwrap();
        let signature = ecdsa::Signature::from_slice(&witness[0]).unwrap();
        secp.verify_ecdsa(
            &Message::from_digest(sighash.to_byte_array()),
            &signature.sig,
            &pubkey.inner,
        )
        .unwrap();

        // legacy scriptSig carries <sig> <pubkey> and verifies too
        let pushes: Vec<Vec<u8>> = signed_commit.input[1]
            .script_sig
            .instructions()
            .map(|instruction| match instruction.unwrap() {
                bitcoin::script::Instruction::PushBytes(push) => push.as_bytes().to_vec(),
                other => panic!("unexpected instruction {other:?}"),
            })
            .collect();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1], pubkey.to_bytes());
        let prevout_script = Address::p2pkh(&pubkey, Network::Testnet).script_pubkey();
        let legacy_sighash = cache
            .legacy_signature_hash(1, &prevout_script, EcdsaSighashType::All.to_u32())
            .unwrap();
        let signature = ecdsa::Signature::from_slice(&pushes[0]).unwrap();
        secp.verify_ecdsa(
            &Message::from_digest(legacy_sighash.to_byte_array()),
            &signature.sig,
            &pubkey.inner,
        )
        .unwrap();

        // fee accounting is preserved across the re-run
        let output_sum: i64 = signed_commit
            .output
            .iter()
            .map(|output| output.value.to_sat() as i64)
            .sum();
        assert_eq!(150_000, output_sum + signed.commit_tx_fee);
    }

    #[test]
    fn test_should_rebase_reveals_on_provided_signed_hash() {
        let req = mixed_request();
        let signed_hash =
            Txid::from_str("c769750df54ee38fe2bae876dbf1632c779c3af780958a19cee1ca0497c78e80")
                .unwrap();

        let res =
            inscribe_for_mpc_unsigned(Network::Testnet, &req, None, Some(signed_hash)).unwrap();
        let reveal = decode_tx(&res.reveal_txs[0]);
        assert_eq!(reveal.input[0].previous_output.txid, signed_hash);
    }

    #[test]
    fn test_should_reject_malformed_signatures() {
        let req = mixed_request();
        let unsigned = inscribe_for_mpc_unsigned(Network::Testnet, &req, None, None).unwrap();

        // wrong count
        assert!(matches!(
            inscribe_for_mpc_signed(
                Network::Testnet,
                &req,
                &unsigned.commit_tx,
                &["00".repeat(64)]
            ),
            Err(InscribeError::InvalidInputs)
        ));

        // wrong length
        let short = vec!["ab".repeat(10), "ab".repeat(64), "ab".repeat(64)];
        assert!(matches!(
            inscribe_for_mpc_signed(Network::Testnet, &req, &unsigned.commit_tx, &short),
            Err(InscribeError::InvalidSignatureHex(_))
        ));

        // not hex at all
        let garbage = vec!["zz".repeat(64), "ab".repeat(64), "ab".repeat(64)];
        assert!(matches!(
            inscribe_for_mpc_signed(Network::Testnet, &req, &unsigned.commit_tx, &garbage),
            Err(InscribeError::InvalidSignatureHex(_))
        ));
    }
}
