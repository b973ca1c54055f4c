//! # ord-inscriber
//!
//! Builder for Ordinals-style inscription transaction pairs. Given a set of
//! fundable prior outputs and a list of inscription payloads, it assembles a
//! **commit** transaction paying one P2TR output per inscription and one
//! **reveal** transaction per inscription spending the matching output via the
//! script path, with the payload embedded in the witness.
//!
//! The commit transaction can either be signed locally ([`inscribe`]) or
//! prepared for an out-of-process signer through the MPC entry points
//! ([`inscribe_for_mpc_unsigned`] / [`inscribe_for_mpc_signed`]), which emit
//! per-input sighash digests and later splice the produced ECDSA signatures
//! back in.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod error;
mod result;
mod utils;

pub mod wallet;

pub use bitcoin;
pub use error::InscribeError;
pub use result::InscribeResult;
pub use wallet::builder::mpc::{
    inscribe_for_mpc_signed, inscribe_for_mpc_unsigned, MpcInscribeTxs,
};
pub use wallet::builder::{
    inscribe, InscribeTxs, InscriptionData, InscriptionRequest, PrevOutput,
};
