//! YaCoin Epoch Pool Interface
//!
//! Client-facing interface for the epoch-scoped shielded pool program.
//! The pool segments deposits into bounded epochs (4096 notes each),
//! finalizes every epoch's Merkle root after a delay, and reclaims
//! expired epoch storage. Spending is authorized by Groth16 proofs over
//! BN254 with Poseidon commitments and nullifiers.
//!
//! This crate holds everything a client needs to talk to the program:
//! - account layouts read during sync ([`state`])
//! - tagged event records ([`events`])
//! - request payloads ([`request`])
//! - deterministic account addressing ([`address`])
//!
//! Program execution lives on-chain; nothing here verifies proofs.

#![forbid(unsafe_code)]

pub mod address;
pub mod error;
pub mod events;
pub mod request;
pub mod state;

pub use error::EpochPoolError;
pub use events::{PoolEvent, EVENT_TAG_LEN};
pub use request::{PoolRequest, ProofData, PROOF_SIZE, PUBLIC_INPUT_SIZE};
pub use state::{
    EpochPhase, EpochTreeAccount, LeafChunkAccount, PoolConfigAccount, EPOCH_CAPACITY,
    LEAF_CHUNK_CAPACITY, TREE_DEPTH,
};

/// Program ID for the epoch pool
pub mod id {
    use solana_pubkey::Pubkey;

    /// The program ID for the YaCoin epoch pool
    pub const ID: Pubkey = Pubkey::new_from_array([
        0x45, 0x70, 0x6f, 0x63, 0x68, 0x50, 0x6f, 0x6f, // "EpochPoo"
        0x6c, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, // "l1111111"
        0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, // "11111111"
        0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, // "11111111"
    ]);

    pub fn id() -> Pubkey {
        ID
    }

    pub fn check_id(id: &Pubkey) -> bool {
        *id == ID
    }
}
