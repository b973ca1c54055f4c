use bitcoin::Sequence;

/// Envelope protocol marker pushed right after `OP_FALSE OP_IF`.
pub const PROTOCOL_ID: [u8; 3] = *b"ord";
/// Maximum bytes of a single body data push inside the envelope.
pub const MAX_CHUNK_SIZE: usize = 520;
/// Opt-in RBF, no locktime.
pub const DEFAULT_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;
/// Dust floor carried by each reveal output unless the request overrides it.
pub const DEFAULT_REVEAL_OUT_VALUE: i64 = 546;
/// Smallest change output worth keeping; anything below is left to the miner.
pub const DEFAULT_MIN_CHANGE_VALUE: i64 = 546;
/// Consensus limit enforced on every reveal transaction.
pub const MAX_STANDARD_TX_WEIGHT: u64 = 4_000_000 / 10;
/// Size of a Schnorr signature witness item under `SIGHASH_DEFAULT`.
pub const SCHNORR_SIGNATURE_SIZE: usize = 64;
/// Size of a single-leaf control block.
pub const CONTROL_BLOCK_SIZE: usize = 33;
