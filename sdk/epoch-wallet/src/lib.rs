//! YaCoin Epoch Wallet SDK
//!
//! Client engine for the epoch-scoped shielded pool:
//! - Key derivation (seed -> spending / viewing / nullifier keys and
//!   the shielded address)
//! - Note lifecycle: creation, commitment, encryption, scanning,
//!   selection, expiry tracking, spending
//! - The per-epoch sparse Merkle forest, rebuilt from chunked on-chain
//!   leaf storage
//! - Poseidon hashing over BN254 for commitments, nullifiers, and tree
//!   nodes
//! - Witness assembly and request building for the withdraw, transfer,
//!   and renew circuits
//! - An encrypted, atomically updated note store
//!
//! Everything that leaves the process — chain reads, proving,
//! submission, persistence — goes through a capability trait
//! ([`ChainReader`], [`Prover`], [`Submitter`], [`NoteStore`]) supplied
//! by the embedding application. [`ShieldedPoolClient`] wires the
//! pieces together and sequences the spending flows.

#![forbid(unsafe_code)]

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod forest;
pub mod keys;
pub mod manager;
pub mod note;
pub mod note_crypto;
pub mod poseidon;
pub mod prover;
pub mod request;
pub mod scanner;
pub mod store;
pub mod witness;

pub use chain::{ChainReader, InMemoryChain, Submitter};
pub use client::{FlowResult, ShieldedPoolClient};
pub use config::ClientConfig;
pub use error::{WalletError, WalletResult};
pub use field::FieldElement;
pub use forest::{EpochForest, EpochTree, MerkleProof};
pub use keys::{KeyManager, ShieldedAddress};
pub use manager::{BalanceInfo, NoteManager};
pub use note::{compute_commitment, compute_nullifier, AssetId, Note};
pub use note_crypto::{decrypt_note, encrypt_note, NoteOpening};
pub use poseidon::{hash_nodes, poseidon_hash_bytes, ZERO_HASHES};
pub use prover::{CircuitArtifacts, CircuitKind, MockProver, ProofBundle, Prover};
pub use request::{PreparedRequest, RequestBuilder, RequestRouting};
pub use scanner::{ScanSummary, Scanner};
pub use store::{EncryptedFileStore, InMemoryStore, NoteStore, NoteStoreSnapshot};
pub use witness::{CircuitWitness, MerkleOrder, MerkleOrientation, WitnessBuilder};

// The pool interface this SDK targets
pub use yacoin_epoch_pool as pool;
