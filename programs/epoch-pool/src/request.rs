//! Request payloads submitted to the epoch pool program
//!
//! Every spending request carries the 256-byte Groth16 proof and the
//! circuit's public inputs exactly as the prover emitted them, followed
//! by the per-circuit trailing fields the program needs to route the
//! request (amounts, epochs, leaf indices, encrypted outputs).

use borsh::{BorshDeserialize, BorshSerialize};

/// Size of a serialized Groth16 proof over BN254
///
/// Layout: `pi_a (64) || pi_b (128, G2 limb pairs written y,x) || pi_c (64)`.
pub const PROOF_SIZE: usize = 256;

/// Size of one public input field element
pub const PUBLIC_INPUT_SIZE: usize = 32;

/// Proof bytes plus the verifier-facing public inputs
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProofData {
    /// Serialized Groth16 proof
    pub proof: [u8; PROOF_SIZE],
    /// Public inputs, 32 bytes each, in circuit order
    pub public_inputs: Vec<[u8; 32]>,
}

impl ProofData {
    /// An all-zero proof with the given public inputs (mock proving only)
    pub fn zeroed(public_inputs: Vec<[u8; 32]>) -> Self {
        Self {
            proof: [0u8; PROOF_SIZE],
            public_inputs,
        }
    }
}

/// A request bound for the pool program
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PoolRequest {
    /// Shield transparent funds into a fresh note.
    /// No proof; the program verifies the accompanying transparent transfer.
    Deposit {
        amount: u64,
        commitment: [u8; 32],
        encrypted_note: Vec<u8>,
    },

    /// Spend one note to a transparent recipient
    Withdraw {
        proof: ProofData,
        amount: u64,
        epoch: u64,
        leaf_index: u32,
        recipient: [u8; 32],
    },

    /// Spend up to two notes into two fresh notes in the current epoch
    Transfer {
        proof: ProofData,
        input_epochs: [u64; 2],
        input_leaf_indices: [u32; 2],
        encrypted_notes: Vec<Vec<u8>>,
    },

    /// Migrate one note from `old_epoch` into `new_epoch`, value unchanged
    Renew {
        proof: ProofData,
        old_epoch: u64,
        new_epoch: u64,
        leaf_index: u32,
        encrypted_note: Vec<u8>,
    },
}

impl PoolRequest {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            PoolRequest::Deposit { .. } => "deposit",
            PoolRequest::Withdraw { .. } => "withdraw",
            PoolRequest::Transfer { .. } => "transfer",
            PoolRequest::Renew { .. } => "renew",
        }
    }

    /// The proof attached to this request, if the kind carries one
    pub fn proof(&self) -> Option<&ProofData> {
        match self {
            PoolRequest::Deposit { .. } => None,
            PoolRequest::Withdraw { proof, .. } => Some(proof),
            PoolRequest::Transfer { proof, .. } => Some(proof),
            PoolRequest::Renew { proof, .. } => Some(proof),
        }
    }
}
