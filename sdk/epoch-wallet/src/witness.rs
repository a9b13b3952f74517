//! Witness assembly for the three spending circuits
//!
//! Builds the named signal tables the circuits consume and the public
//! input vectors the verifier sees. Public-input ordering is normative
//! per circuit and must never be reordered:
//!
//! - withdraw: `merkle_root, nullifier, amount, epoch, tx_anchor,
//!   pool_id, chain_id`
//! - transfer: `merkle_root, nullifier_1, nullifier_2,
//!   output_commitment_1, output_commitment_2, tx_anchor, pool_id,
//!   chain_id`
//! - renew: `old_root, nullifier, new_commitment, old_epoch, new_epoch,
//!   tx_anchor, pool_id, chain_id`
//!
//! Merkle paths default to bottom-up ordering (index 0 = leaf's
//! sibling) with bit 0 meaning "left child"; `ZK_MERKLE_ORDER` and
//! `ZK_MERKLE_LEFT_IS_ONE` flip those conventions for alternative
//! circuit builds.

use std::collections::BTreeMap;

use yacoin_epoch_pool::TREE_DEPTH;

use crate::error::{WalletError, WalletResult};
use crate::field::FieldElement;
use crate::forest::MerkleProof;
use crate::note::{compute_commitment, compute_nullifier, Note};
use crate::prover::CircuitKind;

/// Sibling ordering inside `pathElements`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MerkleOrder {
    #[default]
    BottomUp,
    TopDown,
}

/// Path conventions a circuit build was compiled with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MerkleOrientation {
    pub order: MerkleOrder,
    /// When set, a 1 bit in `pathIndices` means "node is left child"
    pub left_is_one: bool,
}

impl MerkleOrientation {
    /// Read `ZK_MERKLE_ORDER` / `ZK_MERKLE_LEFT_IS_ONE`
    pub fn from_env() -> Self {
        let order = match std::env::var("ZK_MERKLE_ORDER").as_deref() {
            Ok("top-down") => MerkleOrder::TopDown,
            _ => MerkleOrder::BottomUp,
        };
        let left_is_one = matches!(std::env::var("ZK_MERKLE_LEFT_IS_ONE").as_deref(), Ok("1"));
        Self { order, left_is_one }
    }
}

/// One named circuit input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Field(FieldElement),
    Fields(Vec<FieldElement>),
}

/// Named signals keyed the way the circuit's R1CS names them
pub type SignalTable = BTreeMap<String, Signal>;

/// Everything the prover needs for one proof, plus the locally
/// recomputed public inputs used to cross-check the prover's output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitWitness {
    pub circuit: CircuitKind,
    pub signals: SignalTable,
    pub public_inputs: Vec<[u8; 32]>,
}

/// Assembles witnesses from notes and Merkle proofs
#[derive(Clone, Debug)]
pub struct WitnessBuilder {
    orientation: MerkleOrientation,
    nullifier_key: [u8; 32],
    pool_id: [u8; 32],
    chain_id: [u8; 32],
}

impl WitnessBuilder {
    pub fn new(nullifier_key: [u8; 32], pool_id: [u8; 32]) -> Self {
        Self {
            orientation: MerkleOrientation::default(),
            nullifier_key,
            pool_id,
            chain_id: [0u8; 32],
        }
    }

    pub fn with_orientation(mut self, orientation: MerkleOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_chain_id(mut self, chain_id: [u8; 32]) -> Self {
        self.chain_id = chain_id;
        self
    }

    fn pool_id_field(&self) -> WalletResult<FieldElement> {
        FieldElement::from_be_bytes_reduced(&self.pool_id)
    }

    fn chain_id_field(&self) -> WalletResult<FieldElement> {
        FieldElement::from_be_bytes_reduced(&self.chain_id)
    }

    /// Siblings as field elements, ordered per the orientation
    fn path_elements(&self, proof: &MerkleProof) -> WalletResult<Vec<FieldElement>> {
        let mut elements = Vec::with_capacity(TREE_DEPTH);
        for sibling in &proof.siblings {
            elements.push(FieldElement::from_be_bytes_reduced(sibling)?);
        }
        if self.orientation.order == MerkleOrder::TopDown {
            elements.reverse();
        }
        Ok(elements)
    }

    /// Direction bits, ordered and flipped per the orientation
    fn path_indices(&self, leaf_index: u32) -> Vec<FieldElement> {
        let mut bits: Vec<FieldElement> = (0..TREE_DEPTH)
            .map(|level| {
                let mut bit = (leaf_index >> level) & 1;
                if self.orientation.left_is_one {
                    bit ^= 1;
                }
                FieldElement::from_u64(bit as u64)
            })
            .collect();
        if self.orientation.order == MerkleOrder::TopDown {
            bits.reverse();
        }
        bits
    }

    fn confirmed_position(note: &Note) -> WalletResult<(u64, u32)> {
        match (note.epoch, note.leaf_index) {
            (Some(epoch), Some(leaf_index)) => Ok((epoch, leaf_index)),
            _ => Err(WalletError::NoteMissingEpochOrIndex),
        }
    }

    /// Witness for the withdraw circuit (one input, no outputs)
    pub fn build_withdraw(
        &self,
        note: &Note,
        proof: &MerkleProof,
        recipient: &[u8; 32],
        amount: u64,
        tx_anchor: [u8; 32],
    ) -> WalletResult<CircuitWitness> {
        let (epoch, leaf_index) = Self::confirmed_position(note)?;
        let nullifier =
            compute_nullifier(&note.commitment, &self.nullifier_key, epoch, leaf_index)?;

        let mut signals = SignalTable::new();
        signals.insert("value".into(), Signal::Field(FieldElement::from_u64(note.value)));
        signals.insert(
            "recipient".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(recipient)?),
        );
        signals.insert(
            "owner".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&note.owner.to_bytes())?),
        );
        signals.insert(
            "randomness".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&note.randomness)?),
        );
        signals.insert(
            "nullifierKey".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&self.nullifier_key)?),
        );
        signals.insert(
            "leafIndex".into(),
            Signal::Field(FieldElement::from_u64(leaf_index as u64)),
        );
        signals.insert("pathElements".into(), Signal::Fields(self.path_elements(proof)?));
        signals.insert("pathIndices".into(), Signal::Fields(self.path_indices(leaf_index)));

        let public_inputs = vec![
            FieldElement::from_be_bytes_reduced(&proof.root)?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&nullifier)?.to_be_bytes(),
            FieldElement::from_u64(amount).to_be_bytes(),
            FieldElement::from_u64(epoch).to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&tx_anchor)?.to_be_bytes(),
            self.pool_id_field()?.to_be_bytes(),
            self.chain_id_field()?.to_be_bytes(),
        ];

        Ok(CircuitWitness {
            circuit: CircuitKind::Withdraw,
            signals,
            public_inputs,
        })
    }

    /// Witness for the transfer circuit (two inputs, two outputs).
    ///
    /// Missing input or output slots are filled with the canonical
    /// dummy (`value = 0`, all-zero owner and randomness); the circuit's
    /// `isDummy` path waives the Merkle check for dummy inputs. The
    /// balance `in_1 + in_2 == out_1 + out_2` must already hold.
    pub fn build_transfer(
        &self,
        inputs: &[(Note, MerkleProof)],
        outputs: &[Note],
        tx_anchor: [u8; 32],
    ) -> WalletResult<CircuitWitness> {
        if inputs.is_empty() || inputs.len() > 2 || outputs.is_empty() || outputs.len() > 2 {
            return Err(WalletError::InsufficientNoteCount {
                have: inputs.len(),
                need: 1,
            });
        }

        let in_sum: u64 = inputs.iter().map(|(n, _)| n.value).sum();
        let out_sum: u64 = outputs.iter().map(|n| n.value).sum();
        if in_sum != out_sum {
            return Err(WalletError::ValueBalanceMismatch {
                inputs: in_sum,
                outputs: out_sum,
            });
        }

        let mut in_values = Vec::new();
        let mut in_owners = Vec::new();
        let mut in_randomness = Vec::new();
        let mut in_leaf_indices = Vec::new();
        let mut in_is_dummy = Vec::new();
        let mut in_roots = Vec::new();
        let mut in_path_elements = Vec::new();
        let mut in_path_indices = Vec::new();
        let mut nullifiers = Vec::new();

        let anchor_root = inputs[0].1.root;

        for slot in 0..2 {
            if let Some((note, proof)) = inputs.get(slot) {
                let (epoch, leaf_index) = Self::confirmed_position(note)?;
                let nullifier =
                    compute_nullifier(&note.commitment, &self.nullifier_key, epoch, leaf_index)?;

                in_values.push(FieldElement::from_u64(note.value));
                in_owners.push(FieldElement::from_be_bytes_reduced(&note.owner.to_bytes())?);
                in_randomness.push(FieldElement::from_be_bytes_reduced(&note.randomness)?);
                in_leaf_indices.push(FieldElement::from_u64(leaf_index as u64));
                in_is_dummy.push(FieldElement::zero());
                in_roots.push(FieldElement::from_be_bytes_reduced(&proof.root)?);
                in_path_elements.extend(self.path_elements(proof)?);
                in_path_indices.extend(self.path_indices(leaf_index));
                nullifiers.push(nullifier);
            } else {
                let dummy = dummy_input(&self.nullifier_key)?;
                in_values.push(FieldElement::zero());
                in_owners.push(FieldElement::zero());
                in_randomness.push(FieldElement::zero());
                in_leaf_indices.push(FieldElement::zero());
                in_is_dummy.push(FieldElement::from_u64(1));
                in_roots.push(FieldElement::from_be_bytes_reduced(&anchor_root)?);
                in_path_elements.extend(vec![FieldElement::zero(); TREE_DEPTH]);
                in_path_indices.extend(vec![FieldElement::zero(); TREE_DEPTH]);
                nullifiers.push(dummy.nullifier);
            }
        }

        let mut out_values = Vec::new();
        let mut out_owners = Vec::new();
        let mut out_randomness = Vec::new();
        let mut out_commitments = Vec::new();

        for slot in 0..2 {
            if let Some(note) = outputs.get(slot) {
                out_values.push(FieldElement::from_u64(note.value));
                out_owners.push(FieldElement::from_be_bytes_reduced(&note.owner.to_bytes())?);
                out_randomness.push(FieldElement::from_be_bytes_reduced(&note.randomness)?);
                out_commitments.push(note.commitment);
            } else {
                let dummy = dummy_input(&self.nullifier_key)?;
                out_values.push(FieldElement::zero());
                out_owners.push(FieldElement::zero());
                out_randomness.push(FieldElement::zero());
                out_commitments.push(dummy.commitment);
            }
        }

        let mut signals = SignalTable::new();
        signals.insert("inValue".into(), Signal::Fields(in_values));
        signals.insert("inOwner".into(), Signal::Fields(in_owners));
        signals.insert("inRandomness".into(), Signal::Fields(in_randomness));
        signals.insert("inLeafIndex".into(), Signal::Fields(in_leaf_indices));
        signals.insert("inIsDummy".into(), Signal::Fields(in_is_dummy));
        signals.insert("inRoot".into(), Signal::Fields(in_roots));
        signals.insert("inPathElements".into(), Signal::Fields(in_path_elements));
        signals.insert("inPathIndices".into(), Signal::Fields(in_path_indices));
        signals.insert(
            "nullifierKey".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&self.nullifier_key)?),
        );
        signals.insert("outValue".into(), Signal::Fields(out_values));
        signals.insert("outOwner".into(), Signal::Fields(out_owners));
        signals.insert("outRandomness".into(), Signal::Fields(out_randomness));

        let public_inputs = vec![
            FieldElement::from_be_bytes_reduced(&anchor_root)?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&nullifiers[0])?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&nullifiers[1])?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&out_commitments[0])?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&out_commitments[1])?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&tx_anchor)?.to_be_bytes(),
            self.pool_id_field()?.to_be_bytes(),
            self.chain_id_field()?.to_be_bytes(),
        ];

        Ok(CircuitWitness {
            circuit: CircuitKind::Transfer,
            signals,
            public_inputs,
        })
    }

    /// Witness for the renew circuit: same value, fresh randomness,
    /// new epoch
    pub fn build_renew(
        &self,
        note: &Note,
        proof: &MerkleProof,
        new_randomness: &[u8; 32],
        new_epoch: u64,
        tx_anchor: [u8; 32],
    ) -> WalletResult<CircuitWitness> {
        let (old_epoch, leaf_index) = Self::confirmed_position(note)?;
        let nullifier =
            compute_nullifier(&note.commitment, &self.nullifier_key, old_epoch, leaf_index)?;
        let new_commitment =
            compute_commitment(note.value, &note.owner.to_bytes(), new_randomness)?;

        let mut signals = SignalTable::new();
        signals.insert("value".into(), Signal::Field(FieldElement::from_u64(note.value)));
        signals.insert(
            "owner".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&note.owner.to_bytes())?),
        );
        signals.insert(
            "oldRandomness".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&note.randomness)?),
        );
        signals.insert(
            "newRandomness".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(new_randomness)?),
        );
        signals.insert(
            "nullifierKey".into(),
            Signal::Field(FieldElement::from_be_bytes_reduced(&self.nullifier_key)?),
        );
        signals.insert(
            "leafIndex".into(),
            Signal::Field(FieldElement::from_u64(leaf_index as u64)),
        );
        signals.insert("pathElements".into(), Signal::Fields(self.path_elements(proof)?));
        signals.insert("pathIndices".into(), Signal::Fields(self.path_indices(leaf_index)));

        let public_inputs = vec![
            FieldElement::from_be_bytes_reduced(&proof.root)?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&nullifier)?.to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&new_commitment)?.to_be_bytes(),
            FieldElement::from_u64(old_epoch).to_be_bytes(),
            FieldElement::from_u64(new_epoch).to_be_bytes(),
            FieldElement::from_be_bytes_reduced(&tx_anchor)?.to_be_bytes(),
            self.pool_id_field()?.to_be_bytes(),
            self.chain_id_field()?.to_be_bytes(),
        ];

        Ok(CircuitWitness {
            circuit: CircuitKind::Renew,
            signals,
            public_inputs,
        })
    }
}

struct DummyInput {
    commitment: [u8; 32],
    nullifier: [u8; 32],
}

/// The canonical dummy note: zero value, zero owner, zero randomness.
/// Its nullifier is derived like any other, pinned at epoch 0, index 0;
/// the program ignores nullifiers on dummy slots.
fn dummy_input(nullifier_key: &[u8; 32]) -> WalletResult<DummyInput> {
    let commitment = compute_commitment(0, &[0u8; 32], &[0u8; 32])?;
    let nullifier = compute_nullifier(&commitment, nullifier_key, 0, 0)?;
    Ok(DummyInput {
        commitment,
        nullifier,
    })
}
