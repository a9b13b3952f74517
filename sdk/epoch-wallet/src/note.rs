//! Shielded notes
//!
//! A note is a hidden unit of value: `(value, token, owner, randomness)`
//! bound by a Poseidon commitment that becomes a Merkle leaf. The
//! nullifier additionally binds the note's position — epoch and leaf
//! index — so it can only be derived once the note is confirmed.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::error::WalletResult;
use crate::field::FieldElement;
use crate::keys::ShieldedAddress;
use crate::poseidon::poseidon_hash_fields;

/// 32-byte asset identifier
pub type AssetId = [u8; 32];

/// A shielded note and its lifecycle state
///
/// `value`, `token`, `owner`, `randomness`, `blinding`, and `memo` are
/// fixed at creation; `epoch`, `leaf_index`, and `nullifier` are filled
/// in when a chain event confirms the note. Invariants:
/// - `epoch` set implies `leaf_index` set
/// - `nullifier` is either absent or consistent with `(epoch, leaf_index)`
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Value in atomic units
    #[serde_as(as = "DisplayFromStr")]
    pub value: u64,
    /// Asset held by this note
    #[serde_as(as = "serde_with::hex::Hex")]
    pub token: AssetId,
    /// Owner's shielded address
    pub owner: ShieldedAddress,
    /// Commitment randomness
    #[serde_as(as = "serde_with::hex::Hex")]
    pub randomness: [u8; 32],
    /// Blinding factor; aliases `randomness` for current notes but is
    /// stored separately to round-trip older records
    #[serde_as(as = "serde_with::hex::Hex")]
    pub blinding: [u8; 32],
    /// Optional plaintext memo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,

    /// Poseidon commitment over `(value, owner, randomness)`
    #[serde_as(as = "serde_with::hex::Hex")]
    pub commitment: [u8; 32],
    /// Epoch the note was confirmed into
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    /// Position within the epoch tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_index: Option<u32>,
    /// Spend tag; valid only once `epoch` and `leaf_index` are known
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullifier: Option<[u8; 32]>,

    /// Whether a spend of this note has been observed
    #[serde(default)]
    pub spent: bool,
    /// Whether the note's epoch has passed its expiry window
    #[serde(default)]
    pub expired: bool,
}

impl Note {
    /// Assemble a note and compute its commitment
    pub fn new(
        value: u64,
        token: AssetId,
        owner: ShieldedAddress,
        randomness: [u8; 32],
        memo: Option<String>,
    ) -> WalletResult<Self> {
        let commitment = compute_commitment(value, &owner.to_bytes(), &randomness)?;

        Ok(Self {
            value,
            token,
            owner,
            randomness,
            blinding: randomness,
            memo,
            commitment,
            epoch: None,
            leaf_index: None,
            nullifier: None,
            spent: false,
            expired: false,
        })
    }

    /// Whether the note is anchored in an epoch tree
    pub fn is_confirmed(&self) -> bool {
        self.epoch.is_some() && self.leaf_index.is_some()
    }

    /// Record the confirmed position and refresh the nullifier
    pub fn confirm(
        &mut self,
        epoch: u64,
        leaf_index: u32,
        nullifier_key: &[u8; 32],
    ) -> WalletResult<()> {
        self.epoch = Some(epoch);
        self.leaf_index = Some(leaf_index);
        self.nullifier = Some(compute_nullifier(
            &self.commitment,
            nullifier_key,
            epoch,
            leaf_index,
        )?);
        Ok(())
    }
}

/// `commitment = Poseidon(value, owner, randomness)`
pub fn compute_commitment(
    value: u64,
    owner: &[u8; 32],
    randomness: &[u8; 32],
) -> WalletResult<[u8; 32]> {
    let inputs = [
        FieldElement::from_u64(value),
        FieldElement::from_be_bytes_reduced(owner)?,
        FieldElement::from_be_bytes_reduced(randomness)?,
    ];
    Ok(poseidon_hash_fields(&inputs)?.to_be_bytes())
}

/// `nullifier = Poseidon(commitment, nullifier_key, epoch, leaf_index)`
///
/// Epoch and leaf index enter as plain field values. The encoding is
/// circuit-fixed; changing it invalidates every deployed proof.
pub fn compute_nullifier(
    commitment: &[u8; 32],
    nullifier_key: &[u8; 32],
    epoch: u64,
    leaf_index: u32,
) -> WalletResult<[u8; 32]> {
    let inputs = [
        FieldElement::from_be_bytes_reduced(commitment)?,
        FieldElement::from_be_bytes_reduced(nullifier_key)?,
        FieldElement::from_u64(epoch),
        FieldElement::from_u64(leaf_index as u64),
    ];
    Ok(poseidon_hash_fields(&inputs)?.to_be_bytes())
}
