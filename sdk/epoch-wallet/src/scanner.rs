//! Event scanning
//!
//! Replays the pool's tagged event stream against the note tables:
//! promotes pending notes once their commitment lands, trial-decrypts
//! incoming deposits with the viewing key, marks spends by nullifier,
//! and surfaces epoch lifecycle transitions to registered hooks.
//!
//! Processing is best-effort per record: a malformed or foreign record
//! is skipped at debug level, never fatal.

use tracing::{debug, warn};
use yacoin_epoch_pool::{EpochPhase, PoolEvent};

use crate::chain::ChainReader;
use crate::error::WalletResult;
use crate::manager::NoteManager;
use crate::note::{compute_commitment, Note};
use crate::note_crypto::decrypt_note;

/// Callback fired on epoch lifecycle changes
pub type EpochHook = Box<dyn FnMut(u64, EpochPhase, Option<[u8; 32]>) + Send>;

/// An epoch lifecycle change observed in the stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochTransition {
    pub epoch: u64,
    pub phase: EpochPhase,
    pub final_root: Option<[u8; 32]>,
}

/// What a scan pass did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// New notes decrypted and added
    pub notes_found: usize,
    /// Pending notes promoted to confirmed
    pub notes_promoted: usize,
    /// Notes marked spent
    pub notes_spent: usize,
    /// Records skipped (foreign pool, malformed, or not ours)
    pub skipped: usize,
    /// Epoch transitions, in stream order
    pub transitions: Vec<EpochTransition>,
}

/// Replays pool events into a [`NoteManager`]
pub struct Scanner {
    pool_id: [u8; 32],
    viewing_key: [u8; 32],
    nullifier_key: [u8; 32],
    hooks: Vec<EpochHook>,
}

impl Scanner {
    pub fn new(pool_id: [u8; 32], viewing_key: [u8; 32], nullifier_key: [u8; 32]) -> Self {
        Self {
            pool_id,
            viewing_key,
            nullifier_key,
            hooks: Vec::new(),
        }
    }

    /// Register a hook for epoch lifecycle changes
    pub fn on_epoch_change(&mut self, hook: EpochHook) {
        self.hooks.push(hook);
    }

    fn fire(&mut self, summary: &mut ScanSummary, transition: EpochTransition) {
        for hook in &mut self.hooks {
            hook(transition.epoch, transition.phase, transition.final_root);
        }
        summary.transitions.push(transition);
    }

    /// Replay a batch of raw records, in order
    pub fn process_records(&mut self, records: &[Vec<u8>], notes: &mut NoteManager) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for record in records {
            self.process_record(record, notes, &mut summary);
        }
        summary
    }

    /// Replay one raw record; malformed input counts as skipped
    pub fn process_record(
        &mut self,
        record: &[u8],
        notes: &mut NoteManager,
        summary: &mut ScanSummary,
    ) {
        let event = match PoolEvent::decode(record) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "skipping undecodable record");
                summary.skipped += 1;
                return;
            }
        };

        if let Some(pool_id) = event.pool_id() {
            if pool_id != &self.pool_id {
                summary.skipped += 1;
                return;
            }
        }

        self.apply(event, notes, summary);
    }

    fn apply(&mut self, event: PoolEvent, notes: &mut NoteManager, summary: &mut ScanSummary) {
        match event {
            PoolEvent::Deposit(e) => {
                self.absorb_output(
                    notes,
                    summary,
                    e.epoch,
                    e.commitment,
                    e.leaf_index,
                    Some(&e.encrypted_note),
                );
            }
            PoolEvent::Withdraw(e) => {
                if notes.mark_spent_by_nullifier(&e.nullifier, Some(e.epoch)) {
                    summary.notes_spent += 1;
                }
            }
            PoolEvent::Transfer(e) => {
                for (nullifier, input_epoch) in e.nullifiers.iter().zip(&e.input_epochs) {
                    if notes.mark_spent_by_nullifier(nullifier, Some(*input_epoch)) {
                        summary.notes_spent += 1;
                    }
                }
                for (commitment, leaf_index) in
                    e.output_commitments.iter().zip(&e.output_leaf_indices)
                {
                    self.absorb_output(
                        notes,
                        summary,
                        e.output_epoch,
                        *commitment,
                        *leaf_index,
                        None,
                    );
                }
            }
            PoolEvent::Renew(e) => {
                if notes.mark_spent_by_nullifier(&e.old_nullifier, Some(e.old_epoch)) {
                    summary.notes_spent += 1;
                }
                self.absorb_output(
                    notes,
                    summary,
                    e.new_epoch,
                    e.new_commitment,
                    e.new_leaf_index,
                    None,
                );
            }
            PoolEvent::EpochRollover(e) => {
                debug!(old = e.old_epoch, new = e.new_epoch, slot = e.slot, "epoch rollover");
                self.fire(
                    summary,
                    EpochTransition {
                        epoch: e.old_epoch,
                        phase: EpochPhase::Frozen,
                        final_root: None,
                    },
                );
                self.fire(
                    summary,
                    EpochTransition {
                        epoch: e.new_epoch,
                        phase: EpochPhase::Active,
                        final_root: None,
                    },
                );
                notes.set_current_epoch(e.new_epoch);
            }
            PoolEvent::EpochFinalized(e) => {
                self.fire(
                    summary,
                    EpochTransition {
                        epoch: e.epoch,
                        phase: EpochPhase::Finalized,
                        final_root: Some(e.final_root),
                    },
                );
            }
            // Legacy records: the pre-epoch pool kept everything in epoch 0
            PoolEvent::DepositV1(e) => {
                self.absorb_output(
                    notes,
                    summary,
                    0,
                    e.commitment,
                    e.leaf_index,
                    Some(&e.encrypted_note),
                );
            }
            PoolEvent::WithdrawV1(e) => {
                if notes.mark_spent_by_nullifier(&e.nullifier, None) {
                    summary.notes_spent += 1;
                }
            }
            PoolEvent::ShieldedTransferV1(e) => {
                for nullifier in &e.nullifiers {
                    if notes.mark_spent_by_nullifier(nullifier, None) {
                        summary.notes_spent += 1;
                    }
                }
                for (commitment, leaf_index) in
                    e.output_commitments.iter().zip(&e.output_leaf_indices)
                {
                    self.absorb_output(notes, summary, 0, *commitment, *leaf_index, None);
                }
            }
        }
    }

    /// Handle a newly placed commitment: promote a matching pending
    /// note, or trial-decrypt the ciphertext if one is attached
    fn absorb_output(
        &mut self,
        notes: &mut NoteManager,
        summary: &mut ScanSummary,
        epoch: u64,
        commitment: [u8; 32],
        leaf_index: u64,
        encrypted_note: Option<&[u8]>,
    ) {
        let Ok(leaf_index) = u32::try_from(leaf_index) else {
            warn!(leaf_index, "leaf index exceeds tree capacity, skipping record");
            summary.skipped += 1;
            return;
        };

        match notes.promote_pending(&commitment, epoch, leaf_index, &self.nullifier_key) {
            Ok(true) => {
                summary.notes_promoted += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "failed to promote pending note");
                summary.skipped += 1;
                return;
            }
        }

        let Some(sealed) = encrypted_note else {
            return;
        };

        // Trial decryption; failure just means the note is not ours.
        let Ok(opening) = decrypt_note(&self.viewing_key, sealed) else {
            return;
        };

        let expected = compute_commitment(
            opening.value,
            &opening.owner.to_bytes(),
            &opening.blinding,
        );
        match expected {
            Ok(expected) if expected == commitment => {}
            _ => {
                warn!(
                    commitment = %hex::encode(commitment),
                    "decrypted note does not match its on-chain commitment"
                );
                return;
            }
        }

        let mut note = match Note::new(
            opening.value,
            opening.token,
            opening.owner,
            opening.blinding,
            opening.memo,
        ) {
            Ok(note) => note,
            Err(e) => {
                warn!(error = %e, "failed to rebuild decrypted note");
                return;
            }
        };

        if let Err(e) = note.confirm(epoch, leaf_index, &self.nullifier_key) {
            warn!(error = %e, "failed to derive nullifier for decrypted note");
            return;
        }

        debug!(
            commitment = %hex::encode(commitment),
            epoch,
            leaf_index,
            value = note.value,
            "found incoming note"
        );
        notes.add_confirmed(note);
        summary.notes_found += 1;
    }

    /// Refetch one transaction's records and replay them; used right
    /// after submitting a request to pick up our own outputs
    pub async fn rescan(
        &mut self,
        signature: &str,
        chain: &dyn ChainReader,
        notes: &mut NoteManager,
    ) -> WalletResult<ScanSummary> {
        let records = chain.transaction_records(signature).await?;
        debug!(signature, records = records.len(), "rescanning transaction");
        Ok(self.process_records(&records, notes))
    }

    /// Replay the last `limit` pool transactions; used on wallet re-open
    pub async fn scan_history(
        &mut self,
        limit: usize,
        chain: &dyn ChainReader,
        notes: &mut NoteManager,
    ) -> WalletResult<ScanSummary> {
        let records = chain.recent_records(limit).await?;
        debug!(limit, records = records.len(), "replaying history");
        Ok(self.process_records(&records, notes))
    }
}
