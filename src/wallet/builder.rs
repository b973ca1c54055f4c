use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{self, All, Secp256k1};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::LeafVersion;
use bitcoin::transaction::Version;
use bitcoin::{
    taproot, Amount, Network, OutPoint, PrivateKey, ScriptBuf, TapLeafHash, TapSighashType,
    Transaction, TxIn, TxOut, Txid, Witness,
};

use self::envelope::InscriptionEnvelope;
use self::signer::CommitSigner;
use crate::utils::constants::{
    DEFAULT_MIN_CHANGE_VALUE, DEFAULT_REVEAL_OUT_VALUE, DEFAULT_SEQUENCE, MAX_STANDARD_TX_WEIGHT,
};
use crate::utils::{addr_to_pk_script, reveal_witness_fee};
use crate::{InscribeError, InscribeResult};

pub mod envelope;
pub mod mpc;
pub mod signer;

/// A funding output spent by the commit transaction.
///
/// `address` must resolve to one of the supported scriptPubKey kinds (P2TR,
/// P2PKH, P2WPKH, P2SH-wrapped P2WPKH). `public_key` is only consulted by the
/// MPC flow; local signing derives it from the WIF key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrevOutput {
    pub tx_id: String,
    pub v_out: u32,
    pub amount: i64,
    pub address: String,
    pub private_key: String,
    pub public_key: String,
}

/// One inscription payload and the address its reveal output pays to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscriptionData {
    pub content_type: Vec<u8>,
    pub body: Vec<u8>,
    pub reveal_addr: String,
}

/// Top-level build request.
///
/// The reveal key for *every* envelope is decoded from the first prev
/// output's WIF, so multi-inscription requests share a single reveal
/// identity. Fee rates are integer satoshis per virtual byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscriptionRequest {
    pub commit_tx_prev_output_list: Vec<PrevOutput>,
    pub commit_fee_rate: i64,
    pub reveal_fee_rate: i64,
    pub inscription_data_list: Vec<InscriptionData>,
    #[serde(default)]
    pub reveal_out_value: Option<i64>,
    pub change_address: String,
    #[serde(default)]
    pub min_change_value: Option<i64>,
}

impl InscriptionRequest {
    fn reveal_out_value_or_default(&self) -> i64 {
        self.reveal_out_value
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_REVEAL_OUT_VALUE)
    }

    fn min_change_value_or_default(&self) -> i64 {
        self.min_change_value
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MIN_CHANGE_VALUE)
    }
}

/// Build result. On insufficient balance the same shape is returned with
/// empty `commit_tx`/`reveal_txs` and the fee fields carrying the amounts the
/// request *would* have needed, so callers can report the exact shortfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscribeTxs {
    pub commit_tx: String,
    pub reveal_txs: Vec<String>,
    pub commit_tx_fee: i64,
    pub reveal_tx_fees: Vec<i64>,
    pub commit_addrs: Vec<String>,
}

/// Per-inscription derived state: the taproot envelope plus the commit
/// output that will fund the reveal, fixed during pre-sizing.
#[derive(Debug, Clone)]
pub(crate) struct InscriptionContext {
    pub envelope: InscriptionEnvelope,
    pub reveal_prevout: TxOut,
}

/// Assembles the commit/reveal transaction pair for one request.
///
/// Construction runs the envelope builder and the reveal pre-sizer, so a
/// freshly created builder already knows every commit address and the exact
/// funding each reveal needs; the commit transaction itself is produced by
/// the subsequent build/sign/complete steps.
pub struct InscriptionBuilder {
    network: Network,
    secp: Secp256k1<All>,
    pub(crate) commit_priv_keys: Vec<PrivateKey>,
    pub(crate) contexts: Vec<InscriptionContext>,
    pub(crate) reveal_txs: Vec<Transaction>,
    pub(crate) commit_tx: Transaction,
    pub(crate) commit_prevouts: Vec<TxOut>,
    total_reveal_in_value: i64,
    must_commit_fee: i64,
    must_reveal_fees: Vec<i64>,
    pub(crate) commit_addresses: Vec<String>,
}

impl InscriptionBuilder {
    /// Decode the funding keys, build one envelope per inscription and
    /// pre-size the reveal transactions.
    pub fn new(network: Network, request: &InscriptionRequest) -> InscribeResult<Self> {
        let secp = Secp256k1::new();

        let mut commit_priv_keys = Vec::with_capacity(request.commit_tx_prev_output_list.len());
        for prev_output in &request.commit_tx_prev_output_list {
            commit_priv_keys.push(PrivateKey::from_wif(&prev_output.private_key)?);
        }
        let reveal_key = *commit_priv_keys.first().ok_or(InscribeError::NoInputs)?;

        let reveal_out_value = request.reveal_out_value_or_default();

        let total = request.inscription_data_list.len();
        let mut contexts = Vec::with_capacity(total);
        let mut reveal_txs = Vec::with_capacity(total);
        let mut must_reveal_fees = Vec::with_capacity(total);
        let mut commit_addresses = Vec::with_capacity(total);
        let mut total_reveal_in_value = 0;

        for (index, inscription) in request.inscription_data_list.iter().enumerate() {
            let envelope = InscriptionEnvelope::build(&secp, &reveal_key, inscription, network)?;

            // skeletal reveal: the prevout txid stays zeroed until the commit
            // txid is known
            let reveal_tx = Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: vec![TxIn {
                    previous_output: OutPoint {
                        txid: Txid::all_zeros(),
                        vout: index as u32,
                    },
                    script_sig: ScriptBuf::new(),
                    sequence: DEFAULT_SEQUENCE,
                    witness: Witness::new(),
                }],
                output: vec![TxOut {
                    value: Amount::from_sat(reveal_out_value as u64),
                    script_pubkey: addr_to_pk_script(&inscription.reveal_addr, network)?,
                }],
            };

            let reveal_fee = reveal_tx.base_size() as i64 * request.reveal_fee_rate
                + reveal_witness_fee(&envelope.leaf_script, request.reveal_fee_rate);
            let reveal_in_value = reveal_out_value + reveal_fee;
            debug!("reveal {index}: fee {reveal_fee} sat, funding {reveal_in_value} sat");

            total_reveal_in_value += reveal_in_value;
            commit_addresses.push(envelope.address.to_string());
            must_reveal_fees.push(reveal_fee);
            reveal_txs.push(reveal_tx);
            contexts.push(InscriptionContext {
                reveal_prevout: TxOut {
                    value: Amount::from_sat(reveal_in_value as u64),
                    script_pubkey: envelope.address.script_pubkey(),
                },
                envelope,
            });
        }

        Ok(Self {
            network,
            secp,
            commit_priv_keys,
            contexts,
            reveal_txs,
            commit_tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: vec![],
                output: vec![],
            },
            commit_prevouts: vec![],
            total_reveal_in_value,
            must_commit_fee: 0,
            must_reveal_fees,
            commit_addresses,
        })
    }

    /// P2TR commit addresses, one per inscription, in request order.
    pub fn commit_addresses(&self) -> &[String] {
        &self.commit_addresses
    }

    pub(crate) fn run(&mut self, request: &InscriptionRequest) -> InscribeResult<()> {
        let dry_sign_keys = self.commit_priv_keys.clone();
        self.build_commit(request, &dry_sign_keys)?;
        self.sign_commit()?;
        self.complete_reveal(self.commit_tx.txid())
    }

    /// Assemble the commit transaction: every prev output as an input, one
    /// output per inscription sized by the pre-sizer, and a trailing change
    /// output. The fee comes from a dry-sign pass over a copy so that the
    /// estimate sees final-size signatures; change below the minimum is
    /// dropped and, when non-negative, silently left to the miner.
    pub(crate) fn build_commit(
        &mut self,
        request: &InscriptionRequest,
        dry_sign_keys: &[PrivateKey],
    ) -> InscribeResult<()> {
        let min_change_value = request.min_change_value_or_default();
        let change_pk_script = addr_to_pk_script(&request.change_address, self.network)?;

        let mut input = Vec::with_capacity(request.commit_tx_prev_output_list.len());
        let mut commit_prevouts = Vec::with_capacity(request.commit_tx_prev_output_list.len());
        let mut total_sender_amount = 0;
        for prev_output in &request.commit_tx_prev_output_list {
            let txid = Txid::from_str(&prev_output.tx_id)
                .map_err(|err| InscribeError::MalformedTxid(err.to_string()))?;
            input.push(TxIn {
                previous_output: OutPoint {
                    txid,
                    vout: prev_output.v_out,
                },
                script_sig: ScriptBuf::new(),
                sequence: DEFAULT_SEQUENCE,
                witness: Witness::new(),
            });
            commit_prevouts.push(TxOut {
                value: Amount::from_sat(prev_output.amount as u64),
                script_pubkey: addr_to_pk_script(&prev_output.address, self.network)?,
            });
            total_sender_amount += prev_output.amount;
        }

        let mut output: Vec<TxOut> = self
            .contexts
            .iter()
            .map(|ctx| ctx.reveal_prevout.clone())
            .collect();
        output.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: change_pk_script,
        });

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let signer = CommitSigner {
            secp: &self.secp,
            prevouts: &commit_prevouts,
            keys: dry_sign_keys,
        };
        let mut estimate_tx = signer.sign(tx.clone())?;

        let fee = estimate_tx.vsize() as i64 * request.commit_fee_rate;
        let change_amount = total_sender_amount - self.total_reveal_in_value - fee;
        debug!("commit fee estimate {fee} sat, change {change_amount} sat");

        if change_amount >= min_change_value {
            let last = tx.output.len() - 1;
            tx.output[last].value = Amount::from_sat(change_amount as u64);
        } else {
            tx.output.pop();
            if change_amount < 0 {
                estimate_tx.output.pop();
                let fee_without_change = estimate_tx.vsize() as i64 * request.commit_fee_rate;
                if total_sender_amount - self.total_reveal_in_value - fee_without_change < 0 {
                    self.must_commit_fee = fee;
                    return Err(InscribeError::InsufficientBalance {
                        available: total_sender_amount,
                        required: self.total_reveal_in_value + fee_without_change,
                    });
                }
            }
        }

        self.commit_prevouts = commit_prevouts;
        self.commit_tx = tx;
        Ok(())
    }

    pub(crate) fn sign_commit(&mut self) -> InscribeResult<()> {
        let signer = CommitSigner {
            secp: &self.secp,
            prevouts: &self.commit_prevouts,
            keys: &self.commit_priv_keys,
        };
        self.commit_tx = signer.sign(self.commit_tx.clone())?;
        Ok(())
    }

    /// Point every reveal at its commit output, sign the tapscript spend and
    /// enforce the standard weight limit.
    pub(crate) fn complete_reveal(&mut self, commit_txid: Txid) -> InscribeResult<()> {
        for index in 0..self.contexts.len() {
            let ctx = &self.contexts[index];
            let reveal_tx = &mut self.reveal_txs[index];
            reveal_tx.input[0].previous_output = OutPoint {
                txid: commit_txid,
                vout: index as u32,
            };

            let prevouts = [ctx.reveal_prevout.clone()];
            let mut cache = SighashCache::new(reveal_tx.clone());
            let sighash = cache.taproot_script_spend_signature_hash(
                0,
                &Prevouts::All(&prevouts),
                TapLeafHash::from_script(&ctx.envelope.leaf_script, LeafVersion::TapScript),
                TapSighashType::Default,
            )?;

            let msg = secp256k1::Message::from_digest(sighash.to_byte_array());
            let sig = self.secp.sign_schnorr_no_aux_rand(&msg, &ctx.envelope.keypair);
            self.secp
                .verify_schnorr(&sig, &msg, &ctx.envelope.keypair.x_only_public_key().0)?;
            let signature = taproot::Signature {
                sig,
                hash_ty: TapSighashType::Default,
            };

            let mut witness = Witness::new();
            witness.push(signature.to_vec());
            witness.push(ctx.envelope.leaf_script.as_bytes());
            witness.push(ctx.envelope.control_block.serialize());
            reveal_tx.input[0].witness = witness;
        }

        for (index, reveal_tx) in self.reveal_txs.iter().enumerate() {
            let weight = reveal_tx.weight().to_wu();
            if weight > MAX_STANDARD_TX_WEIGHT {
                return Err(InscribeError::RevealTooHeavy { index, weight });
            }
        }

        Ok(())
    }

    /// Actual fees once the transactions are final: commit fee from the
    /// prevout table, one reveal fee per reveal transaction.
    pub(crate) fn calculate_fee(&self) -> (i64, Vec<i64>) {
        let input_value: i64 = self
            .commit_prevouts
            .iter()
            .map(|prevout| prevout.value.to_sat() as i64)
            .sum();
        let output_value: i64 = self
            .commit_tx
            .output
            .iter()
            .map(|output| output.value.to_sat() as i64)
            .sum();

        let reveal_fees = self
            .contexts
            .iter()
            .zip(&self.reveal_txs)
            .map(|(ctx, reveal_tx)| {
                ctx.reveal_prevout.value.to_sat() as i64
                    - reveal_tx.output[0].value.to_sat() as i64
            })
            .collect();

        (input_value - output_value, reveal_fees)
    }

    fn fee_summary(&self) -> InscribeTxs {
        InscribeTxs {
            commit_tx: String::new(),
            reveal_txs: vec![],
            commit_tx_fee: self.must_commit_fee,
            reveal_tx_fees: self.must_reveal_fees.clone(),
            commit_addrs: self.commit_addresses.clone(),
        }
    }

    fn into_txs(self) -> InscribeTxs {
        let (commit_tx_fee, reveal_tx_fees) = self.calculate_fee();

        InscribeTxs {
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

/// Build and sign the commit/reveal pair for `request`.
///
/// Insufficient balance is reported as a successful response carrying only
/// the fee requirements and commit addresses; any other failure is an error.
pub fn inscribe(network: Network, request: &InscriptionRequest) -> InscribeResult<InscribeTxs> {
    let mut builder = InscriptionBuilder::new(network, request)?;
    match builder.run(request) {
        Ok(()) => Ok(builder.into_txs()),
        Err(InscribeError::InsufficientBalance {
            available,
            required,
        }) => {
            debug!("insufficient balance: {available} available, {required} required");
            Ok(builder.fee_summary())
        }
        Err(err) => Err(err),
    }
}
