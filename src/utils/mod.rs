mod address;
pub mod constants;
mod fees;
mod push_bytes;

pub use address::addr_to_pk_script;
pub use fees::{reveal_witness_fee, reveal_witness_size};
pub use push_bytes::bytes_to_push_bytes;
