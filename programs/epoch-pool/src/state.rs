//! Account layouts the client reads while syncing pool state
//!
//! Three account kinds matter to a wallet:
//! - the pool config (asset, epoch timing, current epoch)
//! - one epoch tree header per epoch (phase, fill level, roots)
//! - the chunked leaf storage backing each epoch tree
//!
//! All accounts are borsh-encoded; integers are little-endian on the wire.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::EpochPoolError;

/// Depth of every epoch tree
pub const TREE_DEPTH: usize = 12;

/// Leaves per epoch (2^12)
pub const EPOCH_CAPACITY: u32 = 1 << TREE_DEPTH;

/// Leaves stored per chunk account
pub const LEAF_CHUNK_CAPACITY: u32 = 256;

/// Lifecycle phase of an epoch
///
/// Phases only move forward: `Active` -> `Frozen` -> `Finalized`.
/// Insertion is allowed only while `Active`; once `Finalized` the
/// header's `final_root` is authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub enum EpochPhase {
    #[default]
    Active,
    Frozen,
    Finalized,
}

/// Pool configuration account
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PoolConfigAccount {
    /// Pool authority (32-byte pubkey)
    pub authority: [u8; 32],
    /// Asset held by this pool
    pub asset_id: [u8; 32],
    /// Epoch currently accepting deposits
    pub current_epoch: u64,
    /// Slots per epoch
    pub epoch_duration_slots: u64,
    /// Slots after which a note's epoch storage may be reclaimed
    pub expiry_slots: u64,
}

/// Epoch tree header account
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EpochTreeAccount {
    /// The epoch this tree belongs to
    pub epoch: u64,
    /// Lifecycle phase
    pub phase: EpochPhase,
    /// Next free leaf slot (also the number of leaves inserted)
    pub next_index: u32,
    /// Root after the most recent insertion
    pub root: [u8; 32],
    /// Root frozen at finalization; set only in `Finalized`
    pub final_root: Option<[u8; 32]>,
}

/// One chunk of epoch tree leaves
///
/// Leaves for epoch `e` are split across `ceil(next_index / 256)`
/// chunk accounts; chunk `c` holds leaves `[256c, 256c + count)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LeafChunkAccount {
    /// The epoch this chunk belongs to
    pub epoch: u64,
    /// Position of this chunk within the epoch
    pub chunk_index: u32,
    /// Number of occupied slots in `leaves`
    pub count: u32,
    /// Stored leaves, in insertion order
    pub leaves: Vec<[u8; 32]>,
}

impl PoolConfigAccount {
    pub fn try_from_bytes(data: &[u8]) -> Result<Self, EpochPoolError> {
        borsh::from_slice(data).map_err(|e| EpochPoolError::InvalidAccountData(e.to_string()))
    }
}

impl EpochTreeAccount {
    pub fn try_from_bytes(data: &[u8]) -> Result<Self, EpochPoolError> {
        borsh::from_slice(data).map_err(|e| EpochPoolError::InvalidAccountData(e.to_string()))
    }

    /// Number of leaf chunks this epoch occupies
    pub fn chunk_count(&self) -> u32 {
        self.next_index.div_ceil(LEAF_CHUNK_CAPACITY)
    }
}

impl LeafChunkAccount {
    pub fn try_from_bytes(data: &[u8]) -> Result<Self, EpochPoolError> {
        borsh::from_slice(data).map_err(|e| EpochPoolError::InvalidAccountData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(EpochPhase::Active < EpochPhase::Frozen);
        assert!(EpochPhase::Frozen < EpochPhase::Finalized);
    }

    #[test]
    fn test_epoch_tree_roundtrip() {
        let account = EpochTreeAccount {
            epoch: 7,
            phase: EpochPhase::Finalized,
            next_index: 513,
            root: [3u8; 32],
            final_root: Some([4u8; 32]),
        };

        let bytes = borsh::to_vec(&account).unwrap();
        let restored = EpochTreeAccount::try_from_bytes(&bytes).unwrap();
        assert_eq!(account, restored);
        assert_eq!(restored.chunk_count(), 3);
    }

    #[test]
    fn test_chunk_count_boundaries() {
        let mut account = EpochTreeAccount::default();
        assert_eq!(account.chunk_count(), 0);
        account.next_index = 1;
        assert_eq!(account.chunk_count(), 1);
        account.next_index = 256;
        assert_eq!(account.chunk_count(), 1);
        account.next_index = 257;
        assert_eq!(account.chunk_count(), 2);
        account.next_index = EPOCH_CAPACITY;
        assert_eq!(account.chunk_count(), 16);
    }

    #[test]
    fn test_leaf_chunk_roundtrip() {
        let chunk = LeafChunkAccount {
            epoch: 2,
            chunk_index: 1,
            count: 2,
            leaves: vec![[1u8; 32], [2u8; 32]],
        };

        let bytes = borsh::to_vec(&chunk).unwrap();
        assert_eq!(LeafChunkAccount::try_from_bytes(&bytes).unwrap(), chunk);
    }

    #[test]
    fn test_truncated_account_rejected() {
        let account = PoolConfigAccount::default();
        let bytes = borsh::to_vec(&account).unwrap();
        assert!(PoolConfigAccount::try_from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
