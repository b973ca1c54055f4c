use thiserror::Error;

/// Inscription transaction handling error types
#[derive(Error, Debug)]
pub enum InscribeError {
    #[error("malformed private key: {0}")]
    MalformedKey(#[from] bitcoin::key::Error),
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    #[error("malformed txid: {0}")]
    MalformedTxid(String),
    #[error("Bitcoin script error: {0}")]
    PushBytes(#[from] bitcoin::script::PushBytesError),
    #[error("Taproot builder error: {0}")]
    TaprootBuilder(#[from] bitcoin::taproot::TaprootBuilderError),
    #[error("Taproot compute error")]
    TaprootCompute,
    #[error("Bitcoin sighash error: {0}")]
    SigHash(#[from] bitcoin::sighash::Error),
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    #[error("insufficient balance: available {available} sat, required {required} sat")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("unsupported script type")]
    UnsupportedScriptType,
    #[error("reveal transaction {index} weight {weight} exceeds the standard limit of 400000")]
    RevealTooHeavy { index: usize, weight: u64 },
    #[error("invalid signature hex: {0}")]
    InvalidSignatureHex(String),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("transaction codec error: {0}")]
    Codec(#[from] bitcoin::consensus::encode::Error),
    #[error("bad transaction input: {0}")]
    InputNotFound(usize),
    #[error("transaction input count mismatch")]
    InvalidInputs,
    #[error("no transaction inputs")]
    NoInputs,
}
