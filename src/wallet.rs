pub mod builder;

pub use builder::{
    inscribe, InscribeTxs, InscriptionBuilder, InscriptionData, InscriptionRequest, PrevOutput,
};
