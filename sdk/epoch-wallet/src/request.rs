//! Request assembly
//!
//! Turns a proof bundle and its notes into the on-chain-bound payload
//! plus the routing addresses the program will touch: the epoch tree of
//! every involved epoch, one nullifier marker per input, and the leaf
//! chunk each output lands in.
//!
//! Requests fail early — before any proof is paid for — when an input
//! epoch has expired, an input nullifier is already marked on-chain, or
//! a note lacks its confirmed position.

use solana_pubkey::Pubkey;
use tracing::debug;
use yacoin_epoch_pool::{address, PoolRequest, ProofData, LEAF_CHUNK_CAPACITY};

use crate::chain::ChainReader;
use crate::error::{WalletError, WalletResult};
use crate::note::Note;
use crate::prover::{CircuitKind, ProofBundle};

/// Accounts a request will touch, grouped by role
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestRouting {
    pub pool: Pubkey,
    /// `(epoch, tree header address)` for every involved epoch
    pub epoch_trees: Vec<(u64, Pubkey)>,
    /// One marker address per input nullifier
    pub nullifier_markers: Vec<Pubkey>,
    /// One chunk address per output leaf
    pub leaf_chunks: Vec<Pubkey>,
}

/// A fully assembled request, ready for a `Submitter`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    pub circuit: Option<CircuitKind>,
    pub payload: PoolRequest,
    pub routing: RequestRouting,
}

/// Builds requests and runs the deterministic preflight
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    program_id: Pubkey,
    pool: Pubkey,
}

impl RequestBuilder {
    pub fn new(program_id: Pubkey, pool: Pubkey) -> Self {
        Self { program_id, pool }
    }

    fn epoch_tree(&self, epoch: u64) -> Pubkey {
        address::epoch_tree_address(&self.program_id, &self.pool, epoch)
    }

    fn marker(&self, epoch: u64, nullifier: &[u8; 32]) -> Pubkey {
        address::nullifier_marker_address(&self.program_id, &self.pool, epoch, nullifier)
    }

    fn chunk(&self, epoch: u64, leaf_index: u32) -> Pubkey {
        address::leaf_chunk_address(
            &self.program_id,
            &self.pool,
            epoch,
            leaf_index / LEAF_CHUNK_CAPACITY,
        )
    }

    /// Validate one spend input against local and on-chain state.
    ///
    /// Order matters: a note without a position can never prove, an
    /// expired epoch can never verify, and an existing marker means the
    /// spend would be rejected as a double-spend.
    pub async fn preflight_input(
        &self,
        chain: &dyn ChainReader,
        note: &Note,
        current_epoch: u64,
        expiry_epochs: u64,
    ) -> WalletResult<(u64, u32, [u8; 32])> {
        let (Some(epoch), Some(leaf_index), Some(nullifier)) =
            (note.epoch, note.leaf_index, note.nullifier)
        else {
            return Err(WalletError::NoteMissingEpochOrIndex);
        };

        if current_epoch.saturating_sub(epoch) >= expiry_epochs {
            return Err(WalletError::ExpiredEpoch(epoch));
        }

        let marker = self.marker(epoch, &nullifier);
        if chain.account_exists(&marker).await? {
            debug!(epoch, "nullifier marker already exists");
            return Err(WalletError::DoubleSpend);
        }

        Ok((epoch, leaf_index, nullifier))
    }

    /// Deposit request: no proof, one output in the active epoch
    pub fn build_deposit(
        &self,
        note: &Note,
        encrypted_note: Vec<u8>,
        active_epoch: u64,
        next_leaf_index: u32,
    ) -> PreparedRequest {
        PreparedRequest {
            circuit: None,
            payload: PoolRequest::Deposit {
                amount: note.value,
                commitment: note.commitment,
                encrypted_note,
            },
            routing: RequestRouting {
                pool: self.pool,
                epoch_trees: vec![(active_epoch, self.epoch_tree(active_epoch))],
                nullifier_markers: Vec::new(),
                leaf_chunks: vec![self.chunk(active_epoch, next_leaf_index)],
            },
        }
    }

    /// Withdraw request: one input, no outputs
    pub async fn build_withdraw(
        &self,
        chain: &dyn ChainReader,
        note: &Note,
        bundle: &ProofBundle,
        recipient: [u8; 32],
        current_epoch: u64,
        expiry_epochs: u64,
    ) -> WalletResult<PreparedRequest> {
        let (epoch, leaf_index, nullifier) = self
            .preflight_input(chain, note, current_epoch, expiry_epochs)
            .await?;

        Ok(PreparedRequest {
            circuit: Some(CircuitKind::Withdraw),
            payload: PoolRequest::Withdraw {
                proof: ProofData {
                    proof: bundle.proof,
                    public_inputs: bundle.public_inputs.clone(),
                },
                amount: note.value,
                epoch,
                leaf_index,
                recipient,
            },
            routing: RequestRouting {
                pool: self.pool,
                epoch_trees: vec![(epoch, self.epoch_tree(epoch))],
                nullifier_markers: vec![self.marker(epoch, &nullifier)],
                leaf_chunks: Vec::new(),
            },
        })
    }

    /// Transfer request: 1–2 inputs, outputs land in `output_epoch`
    /// starting at `next_leaf_index`
    pub async fn build_transfer(
        &self,
        chain: &dyn ChainReader,
        inputs: &[Note],
        encrypted_notes: Vec<Vec<u8>>,
        bundle: &ProofBundle,
        output_epoch: u64,
        next_leaf_index: u32,
        current_epoch: u64,
        expiry_epochs: u64,
    ) -> WalletResult<PreparedRequest> {
        if inputs.is_empty() || inputs.len() > 2 {
            return Err(WalletError::InsufficientNoteCount {
                have: inputs.len(),
                need: 1,
            });
        }

        let mut epochs = [0u64; 2];
        let mut leaf_indices = [0u32; 2];
        let mut markers = Vec::new();
        let mut epoch_trees = Vec::new();

        for (slot, note) in inputs.iter().enumerate() {
            let (epoch, leaf_index, nullifier) = self
                .preflight_input(chain, note, current_epoch, expiry_epochs)
                .await?;
            epochs[slot] = epoch;
            leaf_indices[slot] = leaf_index;
            markers.push(self.marker(epoch, &nullifier));
            if !epoch_trees.iter().any(|(e, _)| *e == epoch) {
                epoch_trees.push((epoch, self.epoch_tree(epoch)));
            }
        }
        // a lone input mirrors into the dummy slot
        if inputs.len() == 1 {
            epochs[1] = epochs[0];
            leaf_indices[1] = leaf_indices[0];
        }

        if !epoch_trees.iter().any(|(e, _)| *e == output_epoch) {
            epoch_trees.push((output_epoch, self.epoch_tree(output_epoch)));
        }

        let leaf_chunks = (0..encrypted_notes.len() as u32)
            .map(|offset| self.chunk(output_epoch, next_leaf_index + offset))
            .collect();

        Ok(PreparedRequest {
            circuit: Some(CircuitKind::Transfer),
            payload: PoolRequest::Transfer {
                proof: ProofData {
                    proof: bundle.proof,
                    public_inputs: bundle.public_inputs.clone(),
                },
                input_epochs: epochs,
                input_leaf_indices: leaf_indices,
                encrypted_notes,
            },
            routing: RequestRouting {
                pool: self.pool,
                epoch_trees,
                nullifier_markers: markers,
                leaf_chunks,
            },
        })
    }

    /// Renew request: one input in `old_epoch`, one output in `new_epoch`
    #[allow(clippy::too_many_arguments)]
    pub async fn build_renew(
        &self,
        chain: &dyn ChainReader,
        note: &Note,
        encrypted_note: Vec<u8>,
        bundle: &ProofBundle,
        new_epoch: u64,
        next_leaf_index: u32,
        current_epoch: u64,
        expiry_epochs: u64,
    ) -> WalletResult<PreparedRequest> {
        let (old_epoch, leaf_index, nullifier) = self
            .preflight_input(chain, note, current_epoch, expiry_epochs)
            .await?;

        Ok(PreparedRequest {
            circuit: Some(CircuitKind::Renew),
            payload: PoolRequest::Renew {
                proof: ProofData {
                    proof: bundle.proof,
                    public_inputs: bundle.public_inputs.clone(),
                },
                old_epoch,
                new_epoch,
                leaf_index,
                encrypted_note,
            },
            routing: RequestRouting {
                pool: self.pool,
                // renew touches both the old and new epoch handles
                epoch_trees: vec![
                    (old_epoch, self.epoch_tree(old_epoch)),
                    (new_epoch, self.epoch_tree(new_epoch)),
                ],
                nullifier_markers: vec![self.marker(old_epoch, &nullifier)],
                leaf_chunks: vec![self.chunk(new_epoch, next_leaf_index)],
            },
        })
    }
}
