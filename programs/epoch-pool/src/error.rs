//! Error types for the epoch pool interface

use thiserror::Error;

/// Errors raised while decoding on-chain data emitted by the epoch pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EpochPoolError {
    #[error("unknown event tag {0:02x?}")]
    UnknownEventTag([u8; 8]),

    #[error("malformed event payload: {0}")]
    WireFormatInvalid(String),

    #[error("unsupported legacy event version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed account data: {0}")]
    InvalidAccountData(String),
}
