//! Errors raised while constructing or validating core types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid public key: {0}")]
    InvalidPubkey(String),

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(String),
}
