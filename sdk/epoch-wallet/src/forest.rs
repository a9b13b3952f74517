//! Epoch-segmented sparse Merkle forest
//!
//! Every epoch owns a depth-12 sparse Merkle tree of note commitments;
//! empty positions take the pre-computed zero-hash chain. Trees are
//! rebuilt client-side from the pool's chunked leaf storage (256 leaves
//! per chunk account) and carry the header's phase and finalized root.
//!
//! Only `Active` trees accept insertions. Once a tree is `Finalized`,
//! its `final_root` overrides anything computed locally.

use std::collections::BTreeMap;

use solana_pubkey::Pubkey;
use tracing::{debug, warn};
use yacoin_epoch_pool::{
    address, EpochPhase, EpochTreeAccount, LeafChunkAccount, EPOCH_CAPACITY, LEAF_CHUNK_CAPACITY,
    TREE_DEPTH,
};

use crate::chain::ChainReader;
use crate::error::{WalletError, WalletResult};
use crate::poseidon::{hash_nodes, zero_hash};

/// How many epochs behind the active one `sync` refreshes
pub const SYNC_LOOKBACK_EPOCHS: u64 = 5;

/// Membership proof for one leaf of one epoch tree
///
/// Siblings are ordered bottom-up: index 0 is the leaf's immediate
/// sibling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: [u8; 32],
    pub leaf_index: u32,
    pub epoch: u64,
    pub siblings: [[u8; 32]; TREE_DEPTH],
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Recompute the root from the leaf and siblings; at level `i`,
    /// bit `i` of the index decides which side the current node is on.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (level, sibling) in self.siblings.iter().enumerate() {
            let is_right = (self.leaf_index >> level) & 1 == 1;
            current = if is_right {
                hash_nodes(sibling, &current)
            } else {
                hash_nodes(&current, sibling)
            };
        }
        current == self.root
    }
}

/// One epoch's sparse commitment tree
#[derive(Clone, Debug)]
pub struct EpochTree {
    epoch: u64,
    phase: EpochPhase,
    next_index: u32,
    leaves: BTreeMap<u32, [u8; 32]>,
    root_history: Vec<[u8; 32]>,
    final_root: Option<[u8; 32]>,
}

impl EpochTree {
    /// An empty, active tree
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            phase: EpochPhase::Active,
            next_index: 0,
            leaves: BTreeMap::new(),
            root_history: Vec::new(),
            final_root: None,
        }
    }

    /// Rebuild a tree from persisted chunk leaves and its header
    pub fn from_snapshot(
        epoch: u64,
        leaves: Vec<[u8; 32]>,
        phase: EpochPhase,
        final_root: Option<[u8; 32]>,
    ) -> Self {
        let mut tree = Self::new(epoch);
        for (index, leaf) in leaves.into_iter().enumerate() {
            tree.leaves.insert(index as u32, leaf);
        }
        tree.next_index = tree.leaves.len() as u32;
        tree.phase = phase;
        tree.final_root = final_root;
        let root = tree.current_root();
        tree.root_history.push(root);
        tree
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn final_root(&self) -> Option<[u8; 32]> {
        self.final_root
    }

    /// Move the tree's lifecycle forward; phases never regress
    pub fn set_phase(&mut self, phase: EpochPhase) {
        if phase >= self.phase {
            self.phase = phase;
        }
    }

    /// Freeze the tree's root permanently
    pub fn finalize(&mut self, final_root: [u8; 32]) {
        self.phase = EpochPhase::Finalized;
        self.final_root = Some(final_root);
    }

    /// Append one leaf; only valid while `Active` and below capacity.
    /// Returns the assigned index and the new root.
    pub fn insert(&mut self, leaf: [u8; 32]) -> WalletResult<(u32, [u8; 32])> {
        if self.phase != EpochPhase::Active {
            return Err(WalletError::EpochNotActive(self.epoch));
        }
        if self.next_index >= EPOCH_CAPACITY {
            return Err(WalletError::EpochFull(self.epoch));
        }

        let index = self.next_index;
        self.leaves.insert(index, leaf);
        self.next_index += 1;

        let root = self.compute_root();
        self.root_history.push(root);
        Ok((index, root))
    }

    /// Append a batch, recomputing the root once at the end
    pub fn insert_many(&mut self, leaves: &[[u8; 32]]) -> WalletResult<()> {
        if leaves.is_empty() {
            return Ok(());
        }
        if self.phase != EpochPhase::Active {
            return Err(WalletError::EpochNotActive(self.epoch));
        }
        if self.next_index as usize + leaves.len() > EPOCH_CAPACITY as usize {
            return Err(WalletError::EpochFull(self.epoch));
        }

        for leaf in leaves {
            self.leaves.insert(self.next_index, *leaf);
            self.next_index += 1;
        }

        let root = self.compute_root();
        self.root_history.push(root);
        Ok(())
    }

    /// Bottom-up root over the stored leaves, zero-hash filling gaps
    pub fn compute_root(&self) -> [u8; 32] {
        let mut level: BTreeMap<u32, [u8; 32]> = self.leaves.clone();

        for depth in 0..TREE_DEPTH {
            let mut parents = BTreeMap::new();
            for (&index, node) in &level {
                if index % 2 == 1 && level.contains_key(&(index - 1)) {
                    continue; // handled by its left sibling
                }
                let (left, right) = if index % 2 == 0 {
                    (*node, level.get(&(index + 1)).copied().unwrap_or_else(|| zero_hash(depth)))
                } else {
                    // right node with absent left sibling
                    (zero_hash(depth), *node)
                };
                parents.insert(index / 2, hash_nodes(&left, &right));
            }
            level = parents;
        }

        level
            .get(&0)
            .copied()
            .unwrap_or_else(|| zero_hash(TREE_DEPTH))
    }

    /// The authoritative root: `final_root` once finalized, else computed
    pub fn current_root(&self) -> [u8; 32] {
        self.final_root.unwrap_or_else(|| self.compute_root())
    }

    /// Membership proof for the leaf at `leaf_index`
    pub fn get_proof(&self, leaf_index: u32) -> WalletResult<MerkleProof> {
        let leaf = *self
            .leaves
            .get(&leaf_index)
            .ok_or(WalletError::NoteMissingEpochOrIndex)?;

        let mut level = self.leaves.clone();
        let mut siblings = [[0u8; 32]; TREE_DEPTH];
        let mut position = leaf_index;

        for depth in 0..TREE_DEPTH {
            let sibling_index = position ^ 1;
            siblings[depth] = level
                .get(&sibling_index)
                .copied()
                .unwrap_or_else(|| zero_hash(depth));

            // collapse to the parent level
            let mut parents = BTreeMap::new();
            for (&index, node) in &level {
                if index % 2 == 1 && level.contains_key(&(index - 1)) {
                    continue;
                }
                let (left, right) = if index % 2 == 0 {
                    (*node, level.get(&(index + 1)).copied().unwrap_or_else(|| zero_hash(depth)))
                } else {
                    (zero_hash(depth), *node)
                };
                parents.insert(index / 2, hash_nodes(&left, &right));
            }
            level = parents;
            position /= 2;
        }

        Ok(MerkleProof {
            leaf,
            leaf_index,
            epoch: self.epoch,
            siblings,
            root: self.current_root(),
        })
    }

    /// True if `root` is the finalized root or appeared after any insertion
    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        self.final_root.as_ref() == Some(root) || self.root_history.iter().any(|r| r == root)
    }

    /// Linear scan for a commitment's position
    pub fn find_leaf(&self, commitment: &[u8; 32]) -> Option<u32> {
        self.leaves
            .iter()
            .find(|(_, leaf)| *leaf == commitment)
            .map(|(index, _)| *index)
    }
}

/// All epoch trees the wallet tracks, plus the deposit epoch
#[derive(Debug)]
pub struct EpochForest {
    program_id: Pubkey,
    pool: Pubkey,
    trees: BTreeMap<u64, EpochTree>,
    active_epoch: u64,
}

impl EpochForest {
    pub fn new(program_id: Pubkey, pool: Pubkey) -> Self {
        Self {
            program_id,
            pool,
            trees: BTreeMap::new(),
            active_epoch: 0,
        }
    }

    pub fn active_epoch(&self) -> u64 {
        self.active_epoch
    }

    pub fn set_active_epoch(&mut self, epoch: u64) {
        self.active_epoch = epoch;
        self.get_or_create(epoch);
    }

    pub fn tree(&self, epoch: u64) -> Option<&EpochTree> {
        self.trees.get(&epoch)
    }

    pub fn get_or_create(&mut self, epoch: u64) -> &mut EpochTree {
        self.trees.entry(epoch).or_insert_with(|| EpochTree::new(epoch))
    }

    /// Apply a lifecycle transition observed from events
    pub fn apply_transition(&mut self, epoch: u64, phase: EpochPhase, final_root: Option<[u8; 32]>) {
        match phase {
            EpochPhase::Active => {
                self.set_active_epoch(epoch);
            }
            EpochPhase::Frozen => {
                self.get_or_create(epoch).set_phase(EpochPhase::Frozen);
            }
            EpochPhase::Finalized => {
                let tree = self.get_or_create(epoch);
                match final_root {
                    Some(root) => tree.finalize(root),
                    None => tree.set_phase(EpochPhase::Finalized),
                }
            }
        }
    }

    /// Search every tracked tree for a commitment
    pub fn find_commitment(&self, commitment: &[u8; 32]) -> Option<(u64, u32)> {
        for (epoch, tree) in &self.trees {
            if let Some(index) = tree.find_leaf(commitment) {
                return Some((*epoch, index));
            }
        }
        None
    }

    /// Membership proof against the epoch a note lives in
    pub fn prove(&self, epoch: u64, leaf_index: u32) -> WalletResult<MerkleProof> {
        self.trees
            .get(&epoch)
            .ok_or(WalletError::UnknownEpoch(epoch))?
            .get_proof(leaf_index)
    }

    /// Refresh the active epoch and the trailing lookback window
    pub async fn sync(&mut self, chain: &dyn ChainReader) -> WalletResult<()> {
        let first = self.active_epoch.saturating_sub(SYNC_LOOKBACK_EPOCHS);
        for epoch in first..=self.active_epoch {
            self.sync_epoch(chain, epoch).await?;
        }
        Ok(())
    }

    /// Rebuild exactly one epoch from its header and leaf chunks
    pub async fn sync_epoch(&mut self, chain: &dyn ChainReader, epoch: u64) -> WalletResult<()> {
        let header_address = address::epoch_tree_address(&self.program_id, &self.pool, epoch);
        let header = match chain.get_account(&header_address).await? {
            Some(data) => EpochTreeAccount::try_from_bytes(&data)?,
            None => {
                // absent epoch: an empty tree
                debug!(epoch, "epoch header absent, installing empty tree");
                self.trees.insert(epoch, EpochTree::new(epoch));
                return Ok(());
            }
        };

        let mut leaves = Vec::with_capacity(header.next_index as usize);
        for chunk_index in 0..header.chunk_count() {
            let chunk_address =
                address::leaf_chunk_address(&self.program_id, &self.pool, epoch, chunk_index);
            let data = chain
                .get_account(&chunk_address)
                .await?
                .ok_or(WalletError::CorruptChunk { epoch, chunk: chunk_index })?;
            let chunk = LeafChunkAccount::try_from_bytes(&data)?;

            if chunk.epoch != epoch
                || chunk.chunk_index != chunk_index
                || chunk.count as usize > chunk.leaves.len()
                || chunk.count > LEAF_CHUNK_CAPACITY
            {
                warn!(epoch, chunk_index, "leaf chunk failed validation");
                return Err(WalletError::CorruptChunk { epoch, chunk: chunk_index });
            }

            leaves.extend_from_slice(&chunk.leaves[..chunk.count as usize]);
        }

        if leaves.len() != header.next_index as usize {
            warn!(
                epoch,
                expected = header.next_index,
                stored = leaves.len(),
                "leaf count disagrees with epoch header"
            );
            return Err(WalletError::CorruptChunk {
                epoch,
                chunk: header.chunk_count().saturating_sub(1),
            });
        }

        let tree = EpochTree::from_snapshot(epoch, leaves, header.phase, header.final_root);
        debug!(epoch, leaves = tree.len(), phase = ?header.phase, "epoch tree rebuilt");
        self.trees.insert(epoch, tree);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::poseidon::ZERO_HASHES;

    fn leaf(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn test_empty_tree_root_is_zero_chain_top() {
        let tree = EpochTree::new(0);
        assert_eq!(tree.compute_root(), ZERO_HASHES[TREE_DEPTH]);
    }

    #[test]
    fn test_insert_assigns_sequential_indices() {
        let mut tree = EpochTree::new(0);
        for i in 0..5u8 {
            let (index, _) = tree.insert(leaf(i)).unwrap();
            assert_eq!(index, i as u32);
        }
        assert_eq!(tree.next_index(), 5);
    }

    #[test]
    fn test_insert_rejected_when_not_active() {
        let mut tree = EpochTree::new(3);
        tree.set_phase(EpochPhase::Frozen);
        assert!(matches!(
            tree.insert(leaf(1)),
            Err(WalletError::EpochNotActive(3))
        ));
    }

    #[test]
    fn test_insert_many_matches_sequential_inserts() {
        let batch: Vec<[u8; 32]> = (0..9u8).map(leaf).collect();

        let mut one_by_one = EpochTree::new(0);
        for l in &batch {
            one_by_one.insert(*l).unwrap();
        }

        let mut batched = EpochTree::new(0);
        batched.insert_many(&batch).unwrap();

        assert_eq!(one_by_one.compute_root(), batched.compute_root());
        // batched variant pushes a single root
        assert_eq!(batched.root_history.len(), 1);
        assert_eq!(one_by_one.root_history.len(), 9);
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        let mut tree = EpochTree::new(1);
        for i in 0..7u8 {
            tree.insert(leaf(i + 1)).unwrap();
        }

        let root = tree.compute_root();
        for i in 0..7u32 {
            let proof = tree.get_proof(i).unwrap();
            assert!(proof.verify(), "proof for leaf {i} failed");
            assert_eq!(proof.root, root);
            assert_eq!(proof.epoch, 1);
        }
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let mut tree = EpochTree::new(0);
        tree.insert(leaf(1)).unwrap();
        tree.insert(leaf(2)).unwrap();

        let mut proof = tree.get_proof(0).unwrap();
        proof.siblings[3][0] ^= 1;
        assert!(!proof.verify());
    }

    #[test]
    fn test_final_root_overrides_computed() {
        let mut tree = EpochTree::new(0);
        tree.insert(leaf(1)).unwrap();

        let frozen = [0xabu8; 32];
        tree.finalize(frozen);
        assert_eq!(tree.current_root(), frozen);
        assert_eq!(tree.get_proof(0).unwrap().root, frozen);
        assert!(tree.is_known_root(&frozen));
    }

    #[test]
    fn test_root_history_tracks_insertions() {
        let mut tree = EpochTree::new(0);
        let (_, first_root) = tree.insert(leaf(1)).unwrap();
        let (_, second_root) = tree.insert(leaf(2)).unwrap();

        assert!(tree.is_known_root(&first_root));
        assert!(tree.is_known_root(&second_root));
        assert!(!tree.is_known_root(&[0xffu8; 32]));
    }

    #[test]
    fn test_find_leaf() {
        let mut tree = EpochTree::new(0);
        tree.insert(leaf(7)).unwrap();
        tree.insert(leaf(9)).unwrap();

        assert_eq!(tree.find_leaf(&leaf(9)), Some(1));
        assert_eq!(tree.find_leaf(&leaf(8)), None);
    }

    #[test]
    fn test_forest_find_commitment() {
        let mut forest = EpochForest::new(Pubkey::new_from_array([1u8; 32]), Pubkey::default());
        forest.get_or_create(1).insert(leaf(5)).unwrap();
        forest.get_or_create(2).insert(leaf(6)).unwrap();

        assert_eq!(forest.find_commitment(&leaf(6)), Some((2, 0)));
        assert_eq!(forest.find_commitment(&leaf(7)), None);
    }

    #[test]
    fn test_forest_transitions() {
        let mut forest = EpochForest::new(Pubkey::new_from_array([1u8; 32]), Pubkey::default());
        forest.apply_transition(0, EpochPhase::Frozen, None);
        forest.apply_transition(1, EpochPhase::Active, None);
        forest.apply_transition(0, EpochPhase::Finalized, Some([9u8; 32]));

        assert_eq!(forest.active_epoch(), 1);
        assert_eq!(forest.tree(0).unwrap().phase(), EpochPhase::Finalized);
        assert_eq!(forest.tree(0).unwrap().final_root(), Some([9u8; 32]));

        // transitions never regress
        forest.apply_transition(0, EpochPhase::Frozen, None);
        assert_eq!(forest.tree(0).unwrap().phase(), EpochPhase::Finalized);
    }

    fn chain_with_epoch(
        program_id: &Pubkey,
        pool: &Pubkey,
        epoch: u64,
        leaves: &[[u8; 32]],
    ) -> InMemoryChain {
        let chain = InMemoryChain::new();
        let header = EpochTreeAccount {
            epoch,
            phase: EpochPhase::Active,
            next_index: leaves.len() as u32,
            root: [0u8; 32],
            final_root: None,
        };
        chain.put_account(
            address::epoch_tree_address(program_id, pool, epoch),
            borsh::to_vec(&header).unwrap(),
        );

        for (chunk_index, chunk_leaves) in leaves.chunks(LEAF_CHUNK_CAPACITY as usize).enumerate() {
            let chunk = LeafChunkAccount {
                epoch,
                chunk_index: chunk_index as u32,
                count: chunk_leaves.len() as u32,
                leaves: chunk_leaves.to_vec(),
            };
            chain.put_account(
                address::leaf_chunk_address(program_id, pool, epoch, chunk_index as u32),
                borsh::to_vec(&chunk).unwrap(),
            );
        }
        chain
    }

    #[tokio::test]
    async fn test_sync_epoch_rebuilds_tree() {
        let program_id = Pubkey::new_from_array([2u8; 32]);
        let pool = Pubkey::new_from_array([3u8; 32]);
        let leaves: Vec<[u8; 32]> = (1..=4u8).map(leaf).collect();
        let chain = chain_with_epoch(&program_id, &pool, 7, &leaves);

        let mut forest = EpochForest::new(program_id, pool);
        forest.sync_epoch(&chain, 7).await.unwrap();

        let tree = forest.tree(7).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.find_leaf(&leaf(3)), Some(2));

        // rebuilt tree must agree with a locally built one
        let mut local = EpochTree::new(7);
        local.insert_many(&leaves).unwrap();
        assert_eq!(tree.compute_root(), local.compute_root());
    }

    #[tokio::test]
    async fn test_sync_absent_epoch_installs_empty_tree() {
        let chain = InMemoryChain::new();
        let mut forest =
            EpochForest::new(Pubkey::new_from_array([2u8; 32]), Pubkey::new_from_array([3u8; 32]));
        forest.sync_epoch(&chain, 9).await.unwrap();
        assert!(forest.tree(9).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_truncated_chunk_aborts() {
        let program_id = Pubkey::new_from_array([2u8; 32]);
        let pool = Pubkey::new_from_array([3u8; 32]);
        let chain = chain_with_epoch(&program_id, &pool, 1, &[leaf(1), leaf(2)]);

        // corrupt the chunk: claim more leaves than stored
        let chunk_address = address::leaf_chunk_address(&program_id, &pool, 1, 0);
        let chunk = LeafChunkAccount {
            epoch: 1,
            chunk_index: 0,
            count: 3,
            leaves: vec![leaf(1), leaf(2)],
        };
        chain.put_account(chunk_address, borsh::to_vec(&chunk).unwrap());

        let mut forest = EpochForest::new(program_id, pool);
        assert!(matches!(
            forest.sync_epoch(&chain, 1).await,
            Err(WalletError::CorruptChunk { epoch: 1, chunk: 0 })
        ));
    }

    #[tokio::test]
    async fn test_sync_covers_lookback_window() {
        let program_id = Pubkey::new_from_array([2u8; 32]);
        let pool = Pubkey::new_from_array([3u8; 32]);
        let chain = chain_with_epoch(&program_id, &pool, 6, &[leaf(1)]);

        let mut forest = EpochForest::new(program_id, pool);
        forest.set_active_epoch(6);
        forest.sync(&chain).await.unwrap();

        // active epoch synced from chain, lookback epochs exist (empty)
        assert_eq!(forest.tree(6).unwrap().len(), 1);
        for epoch in 1..6 {
            assert!(forest.tree(epoch).is_some());
        }
        assert!(forest.tree(0).is_none());
    }
}
