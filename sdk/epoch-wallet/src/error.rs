//! Wallet error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("Seed must be exactly 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("Invalid shielded address")]
    InvalidAddress,

    #[error("Unsupported Poseidon width {0}")]
    UnsupportedWidth(usize),

    #[error("Value is not a canonical BN254 field element")]
    NotInField,

    #[error("Epoch {0} tree is full")]
    EpochFull(u64),

    #[error("Epoch {0} is not accepting insertions")]
    EpochNotActive(u64),

    #[error("Unknown epoch {0}")]
    UnknownEpoch(u64),

    #[error("Insufficient shielded balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("Not enough spendable notes: have {have}, need {need}")]
    InsufficientNoteCount { have: usize, need: usize },

    #[error("Note is missing its epoch or leaf index")]
    NoteMissingEpochOrIndex,

    #[error("Epoch {0} has expired")]
    ExpiredEpoch(u64),

    #[error("Nullifier already marked spent on-chain")]
    DoubleSpend,

    #[error("Transfer does not balance: inputs {inputs}, outputs {outputs}")]
    ValueBalanceMismatch { inputs: u64, outputs: u64 },

    #[error("Note decryption failed")]
    DecryptFailed,

    #[error("Note store is corrupt")]
    StoreCorrupt,

    #[error("Timed out waiting for the note store lock")]
    LockTimeout,

    #[error("Note store was written with a different key")]
    WrongEncryptionKey,

    #[error("Circuit artifacts unavailable: {0}")]
    ArtifactsUnavailable(String),

    #[error("Prover failed: {0}")]
    ProverFailed(String),

    #[error("Malformed event record: {0}")]
    WireFormatInvalid(String),

    #[error("Leaf chunk {chunk} of epoch {epoch} is truncated")]
    CorruptChunk { epoch: u64, chunk: u32 },

    #[error("Prover public inputs disagree with local recomputation: {0}")]
    PublicInputMismatch(String),

    #[error("Chain read failed: {0}")]
    Chain(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WalletResult<T> = Result<T, WalletError>;

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}

impl From<yacoin_epoch_pool::EpochPoolError> for WalletError {
    fn from(e: yacoin_epoch_pool::EpochPoolError) -> Self {
        WalletError::WireFormatInvalid(e.to_string())
    }
}
