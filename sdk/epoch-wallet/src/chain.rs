//! Chain access capabilities
//!
//! The engine never talks to an RPC endpoint directly; the embedding
//! application hands it a [`ChainReader`] for state reads and,
//! optionally, a [`Submitter`] for sending assembled requests. Every
//! suspension point in the engine goes through one of these traits, the
//! [`crate::prover::Prover`], or the note store.

use async_trait::async_trait;
use solana_pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Mutex;
use yacoin_epoch_pool::PoolRequest;

use crate::error::WalletResult;
use crate::request::RequestRouting;

/// Read-only view of pool state on chain
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Fetch raw account data, `None` if the account does not exist
    async fn get_account(&self, address: &Pubkey) -> WalletResult<Option<Vec<u8>>>;

    /// Existence probe; used for nullifier markers
    async fn account_exists(&self, address: &Pubkey) -> WalletResult<bool> {
        Ok(self.get_account(address).await?.is_some())
    }

    /// Raw event records emitted by one confirmed transaction
    async fn transaction_records(&self, signature: &str) -> WalletResult<Vec<Vec<u8>>>;

    /// Raw event records of the most recent pool transactions,
    /// oldest first
    async fn recent_records(&self, limit: usize) -> WalletResult<Vec<Vec<u8>>>;
}

/// Sends an assembled request to the chain
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit and return the transaction signature
    async fn submit(&self, request: &PoolRequest, routing: &RequestRouting)
        -> WalletResult<String>;
}

/// In-memory [`ChainReader`] backed by hash maps
///
/// Serves tests and local tooling; `put_account` / `push_records`
/// populate the state a real chain would hold.
#[derive(Default)]
pub struct InMemoryChain {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    transactions: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    history: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.accounts.lock().unwrap().remove(address);
    }

    /// Record a transaction's event records and append them to history
    pub fn push_records(&self, signature: &str, records: Vec<Vec<u8>>) {
        self.history.lock().unwrap().extend(records.iter().cloned());
        self.transactions
            .lock()
            .unwrap()
            .insert(signature.to_string(), records);
    }
}

#[async_trait]
impl ChainReader for InMemoryChain {
    async fn get_account(&self, address: &Pubkey) -> WalletResult<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn transaction_records(&self, signature: &str) -> WalletResult<Vec<Vec<u8>>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_records(&self, limit: usize) -> WalletResult<Vec<Vec<u8>>> {
        let history = self.history.lock().unwrap();
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_roundtrip() {
        let chain = InMemoryChain::new();
        let address = Pubkey::new_from_array([1u8; 32]);

        assert!(chain.get_account(&address).await.unwrap().is_none());
        assert!(!chain.account_exists(&address).await.unwrap());

        chain.put_account(address, vec![1, 2, 3]);
        assert_eq!(chain.get_account(&address).await.unwrap(), Some(vec![1, 2, 3]));
        assert!(chain.account_exists(&address).await.unwrap());

        chain.remove_account(&address);
        assert!(!chain.account_exists(&address).await.unwrap());
    }

    #[tokio::test]
    async fn test_records_and_history() {
        let chain = InMemoryChain::new();
        chain.push_records("sig1", vec![vec![1], vec![2]]);
        chain.push_records("sig2", vec![vec![3]]);

        assert_eq!(chain.transaction_records("sig1").await.unwrap().len(), 2);
        assert!(chain.transaction_records("missing").await.unwrap().is_empty());

        let recent = chain.recent_records(2).await.unwrap();
        assert_eq!(recent, vec![vec![2], vec![3]]);
    }
}
