//! Client configuration

use solana_pubkey::Pubkey;
use std::path::PathBuf;
use std::time::Duration;

use crate::witness::MerkleOrientation;

/// Everything the client needs to know about its pool and environment
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The epoch pool program
    pub program_id: Pubkey,
    /// The pool instance (its config account address)
    pub pool: Pubkey,
    /// Asset the pool holds
    pub asset_id: [u8; 32],
    /// Slots per epoch; refreshed from the pool config on sync
    pub epoch_duration_slots: u64,
    /// Slots after which a note's epoch expires
    pub expiry_slots: u64,
    /// Where the encrypted note store lives; `None` disables persistence
    pub store_path: Option<PathBuf>,
    /// Return zeroed proofs (`MOCK_PROOFS=1`; tests only)
    pub mock_proofs: bool,
    /// Merkle path conventions the circuit build expects
    pub orientation: MerkleOrientation,
    /// Transactions replayed by `scan_history` on wallet re-open
    pub history_scan_limit: usize,
    /// Minimum gap between debounced snapshot saves
    pub save_debounce: Duration,
}

impl ClientConfig {
    pub fn new(program_id: Pubkey, pool: Pubkey, asset_id: [u8; 32]) -> Self {
        Self {
            program_id,
            pool,
            asset_id,
            epoch_duration_slots: 432_000,
            expiry_slots: 1_296_000,
            store_path: None,
            mock_proofs: false,
            orientation: MerkleOrientation::default(),
            history_scan_limit: 100,
            save_debounce: Duration::from_millis(500),
        }
    }

    /// Overlay the recognized environment flags:
    /// `ZK_MERKLE_ORDER`, `ZK_MERKLE_LEFT_IS_ONE`, `MOCK_PROOFS`
    pub fn with_env_flags(mut self) -> Self {
        self.orientation = MerkleOrientation::from_env();
        self.mock_proofs = crate::prover::mock_proofs_enabled();
        self
    }

    /// Note lifetime in epochs
    pub fn expiry_epochs(&self) -> u64 {
        (self.expiry_slots / self.epoch_duration_slots.max(1)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_epochs() {
        let mut config =
            ClientConfig::new(Pubkey::new_from_array([1u8; 32]), Pubkey::default(), [0u8; 32]);
        assert_eq!(config.expiry_epochs(), 3);

        config.expiry_slots = 432_000;
        assert_eq!(config.expiry_epochs(), 1);

        // degenerate configs still yield a live window
        config.expiry_slots = 0;
        assert_eq!(config.expiry_epochs(), 1);
    }
}
