//! Note tables and selection
//!
//! `NoteManager` owns the confirmed and pending note tables, keyed by
//! commitment. All mutation goes through its methods so the single-writer
//! invariant holds; a dirty flag lets the client debounce persistence.
//!
//! Epoch awareness: notes age as the pool's epoch counter advances.
//! A note within [`EXPIRY_WARNING_EPOCHS`] of its expiry is "expiring"
//! and favored by selection (oldest first, to push renewal); past expiry
//! it drops out of the balance entirely.

use rand::RngCore;
use tracing::debug;

use crate::error::{WalletError, WalletResult};
use crate::keys::ShieldedAddress;
use crate::note::{compute_nullifier, AssetId, Note};

/// Epochs before expiry at which a note counts as expiring
pub const EXPIRY_WARNING_EPOCHS: u64 = 2;

/// Structured balance breakdown
///
/// Invariant: `spendable + pending + expiring == total`; expired value
/// is reported separately and excluded from `total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceInfo {
    pub total: u64,
    pub spendable: u64,
    pub pending: u64,
    pub expiring: u64,
    pub expired: u64,
    pub spendable_notes: usize,
    pub pending_notes: usize,
    pub expiring_notes: usize,
    pub expired_notes: usize,
}

/// Owns the wallet's note tables
#[derive(Debug)]
pub struct NoteManager {
    confirmed: Vec<Note>,
    pending: Vec<Note>,
    current_epoch: u64,
    expiry_epochs: u64,
    dirty: bool,
}

impl NoteManager {
    /// `expiry_epochs` is how many epochs a note stays live
    /// (`expiry_slots / epoch_duration_slots` in pool terms)
    pub fn new(expiry_epochs: u64) -> Self {
        Self {
            confirmed: Vec::new(),
            pending: Vec::new(),
            current_epoch: 0,
            expiry_epochs: expiry_epochs.max(1),
            dirty: false,
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Adopt a refreshed note lifetime (pool timing can change on sync)
    pub fn set_expiry_epochs(&mut self, expiry_epochs: u64) {
        self.expiry_epochs = expiry_epochs.max(1);
    }

    /// Advance the epoch view and refresh expiry flags
    pub fn set_current_epoch(&mut self, epoch: u64) {
        if self.current_epoch == epoch {
            return;
        }
        self.current_epoch = epoch;
        let expiry = self.expiry_epochs;
        for note in &mut self.confirmed {
            if let Some(note_epoch) = note.epoch {
                note.expired = epoch.saturating_sub(note_epoch) >= expiry;
            }
        }
        self.dirty = true;
    }

    fn age(&self, note: &Note) -> Option<u64> {
        note.epoch.map(|e| self.current_epoch.saturating_sub(e))
    }

    fn is_expired(&self, note: &Note) -> bool {
        match self.age(note) {
            Some(age) => age >= self.expiry_epochs,
            None => false,
        }
    }

    fn is_expiring(&self, note: &Note) -> bool {
        match self.age(note) {
            Some(age) => {
                age + EXPIRY_WARNING_EPOCHS >= self.expiry_epochs && age < self.expiry_epochs
            }
            None => false,
        }
    }

    /// Add or update a confirmed note; idempotent on commitment.
    /// A pending note with the same commitment is consumed.
    pub fn add_confirmed(&mut self, note: Note) {
        self.pending.retain(|p| p.commitment != note.commitment);

        if let Some(existing) = self
            .confirmed
            .iter_mut()
            .find(|n| n.commitment == note.commitment)
        {
            if existing.epoch.is_none() {
                existing.epoch = note.epoch;
            }
            if existing.leaf_index.is_none() {
                existing.leaf_index = note.leaf_index;
            }
            if existing.nullifier.is_none() {
                existing.nullifier = note.nullifier;
            }
        } else {
            self.confirmed.push(note);
        }
        self.dirty = true;
    }

    /// Track a note awaiting confirmation; idempotent on commitment
    pub fn add_pending(&mut self, note: Note) {
        let known = self.pending.iter().any(|n| n.commitment == note.commitment)
            || self.confirmed.iter().any(|n| n.commitment == note.commitment);
        if !known {
            self.pending.push(note);
            self.dirty = true;
        }
    }

    /// Promote a pending note into the confirmed table at a position
    pub fn promote_pending(
        &mut self,
        commitment: &[u8; 32],
        epoch: u64,
        leaf_index: u32,
        nullifier_key: &[u8; 32],
    ) -> WalletResult<bool> {
        let Some(position) = self.pending.iter().position(|n| &n.commitment == commitment) else {
            return Ok(false);
        };

        let mut note = self.pending.remove(position);
        note.confirm(epoch, leaf_index, nullifier_key)?;
        debug!(
            commitment = %hex::encode(commitment),
            epoch,
            leaf_index,
            "pending note confirmed"
        );
        self.add_confirmed(note);
        Ok(true)
    }

    /// Mark the note with this commitment spent
    pub fn mark_spent(&mut self, commitment: &[u8; 32]) -> bool {
        for note in &mut self.confirmed {
            if &note.commitment == commitment && !note.spent {
                note.spent = true;
                self.dirty = true;
                return true;
            }
        }
        false
    }

    /// Mark the first note carrying this nullifier spent; when `epoch`
    /// is given, only notes confirmed in that epoch are considered
    pub fn mark_spent_by_nullifier(&mut self, nullifier: &[u8; 32], epoch: Option<u64>) -> bool {
        for note in &mut self.confirmed {
            if note.nullifier.as_ref() == Some(nullifier)
                && epoch.map_or(true, |e| note.epoch == Some(e))
            {
                note.spent = true;
                self.dirty = true;
                return true;
            }
        }
        false
    }

    /// Create a fresh note to `owner` with uniform randomness.
    ///
    /// The note is tentatively tagged with the current epoch; its
    /// nullifier stays unset until confirmation assigns a leaf index
    /// and [`Self::promote_pending`] recomputes it.
    pub fn create_note(
        &self,
        value: u64,
        token: AssetId,
        owner: ShieldedAddress,
        memo: Option<String>,
    ) -> WalletResult<Note> {
        let mut randomness = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut randomness);

        let mut note = Note::new(value, token, owner, randomness, memo)?;
        note.epoch = Some(self.current_epoch);
        Ok(note)
    }

    /// Refresh a confirmed note's nullifier from its position
    pub fn recompute_nullifier(
        &mut self,
        commitment: &[u8; 32],
        nullifier_key: &[u8; 32],
    ) -> WalletResult<()> {
        let note = self
            .confirmed
            .iter_mut()
            .find(|n| &n.commitment == commitment)
            .ok_or(WalletError::NoteMissingEpochOrIndex)?;

        let (Some(epoch), Some(leaf_index)) = (note.epoch, note.leaf_index) else {
            return Err(WalletError::NoteMissingEpochOrIndex);
        };

        note.nullifier = Some(compute_nullifier(
            &note.commitment,
            nullifier_key,
            epoch,
            leaf_index,
        )?);
        self.dirty = true;
        Ok(())
    }

    /// Spendable candidates: confirmed, unspent, unexpired, deduplicated,
    /// oldest epoch first and largest value within an epoch
    fn spend_candidates(&self) -> Vec<&Note> {
        let mut seen = std::collections::HashSet::new();
        let mut candidates: Vec<&Note> = self
            .confirmed
            .iter()
            .filter(|n| !n.spent && !self.is_expired(n) && n.is_confirmed())
            .filter(|n| seen.insert(n.commitment))
            .collect();
        candidates.sort_by(|a, b| {
            a.epoch
                .cmp(&b.epoch)
                .then_with(|| b.value.cmp(&a.value))
        });
        candidates
    }

    /// All currently spendable notes, in selection order
    pub fn spendable_notes(&self) -> Vec<Note> {
        self.spend_candidates().into_iter().cloned().collect()
    }

    /// Greedy selection covering `amount` with at least `min_notes` notes
    pub fn select_for_spend(&self, amount: u64, min_notes: usize) -> WalletResult<Vec<Note>> {
        let candidates = self.spend_candidates();

        let available: u64 = candidates.iter().map(|n| n.value).sum();
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                have: available,
                need: amount,
            });
        }
        if candidates.len() < min_notes {
            return Err(WalletError::InsufficientNoteCount {
                have: candidates.len(),
                need: min_notes,
            });
        }

        let mut selected = Vec::new();
        let mut sum = 0u64;
        for note in candidates {
            if sum >= amount && selected.len() >= min_notes {
                break;
            }
            sum += note.value;
            selected.push(note.clone());
        }
        Ok(selected)
    }

    /// Expiring notes, oldest epoch first, at most `max_notes`
    pub fn select_for_renewal(&self, max_notes: usize) -> Vec<Note> {
        let mut expiring: Vec<&Note> = self
            .confirmed
            .iter()
            .filter(|n| !n.spent && n.is_confirmed() && self.is_expiring(n))
            .collect();
        expiring.sort_by_key(|n| n.epoch);
        expiring.into_iter().take(max_notes).cloned().collect()
    }

    /// Sum of confirmed, unspent, unexpired value
    pub fn balance(&self) -> u64 {
        self.confirmed
            .iter()
            .filter(|n| !n.spent && !self.is_expired(n))
            .map(|n| n.value)
            .sum()
    }

    /// Full balance breakdown
    pub fn balance_info(&self) -> BalanceInfo {
        let mut info = BalanceInfo::default();

        for note in &self.confirmed {
            if note.spent {
                continue;
            }
            if self.is_expired(note) {
                info.expired += note.value;
                info.expired_notes += 1;
            } else if self.is_expiring(note) {
                info.expiring += note.value;
                info.expiring_notes += 1;
                info.total += note.value;
            } else {
                info.spendable += note.value;
                info.spendable_notes += 1;
                info.total += note.value;
            }
        }

        for note in &self.pending {
            info.pending += note.value;
            info.pending_notes += 1;
            info.total += note.value;
        }

        info
    }

    pub fn confirmed_notes(&self) -> &[Note] {
        &self.confirmed
    }

    pub fn pending_notes(&self) -> &[Note] {
        &self.pending
    }

    /// Whether unsaved mutations exist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether unsaved mutations exist; clears the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn load_tables(&mut self, confirmed: Vec<Note>, pending: Vec<Note>, epoch: u64) {
        self.confirmed = confirmed;
        self.pending = pending;
        self.current_epoch = epoch;
        self.dirty = false;
    }
}
