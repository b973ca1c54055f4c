use crate::InscribeError;

pub type InscribeResult<T> = std::result::Result<T, InscribeError>;
