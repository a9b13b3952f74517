//! High-level pool client
//!
//! Owns the forest, the note tables, and the scanner, and sequences
//! every spending flow the same way:
//! sync -> select -> witness -> prove -> assemble -> submit ->
//! rescan -> re-sync.
//!
//! The client is single-writer by construction: every operation takes
//! `&mut self`, and the only suspension points are chain reads, the
//! prover, and store I/O. Embedders running on a parallel runtime wrap
//! the whole client in a mutex or an actor; nothing here spawns tasks.
//!
//! Cancellation at any `.await` before submission is safe — no state
//! has been committed. After submission, the selected notes must not be
//! re-spent until the resulting event confirms; the post-submit rescan
//! handles that by marking them spent.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use yacoin_epoch_pool::PoolConfigAccount;

use crate::chain::{ChainReader, Submitter};
use crate::config::ClientConfig;
use crate::error::{WalletError, WalletResult};
use crate::forest::EpochForest;
use crate::keys::{KeyManager, ShieldedAddress};
use crate::manager::{BalanceInfo, NoteManager};
use crate::note::Note;
use crate::note_crypto::{encrypt_note, NoteOpening};
use crate::prover::{check_public_inputs, CircuitArtifacts, MockProver, ProofBundle, Prover};
use crate::request::{PreparedRequest, RequestBuilder};
use crate::scanner::{ScanSummary, Scanner};
use crate::store::{NoteStore, NoteStoreSnapshot};
use crate::witness::{CircuitWitness, WitnessBuilder};

/// Outcome of a spending flow: the assembled request and, when a
/// submitter is configured, the confirmed signature
#[derive(Clone, Debug)]
pub struct FlowResult {
    pub request: PreparedRequest,
    pub signature: Option<String>,
}

/// Client engine for one wallet on one pool
pub struct ShieldedPoolClient {
    config: ClientConfig,
    keys: KeyManager,
    forest: EpochForest,
    notes: NoteManager,
    scanner: Scanner,
    witness: WitnessBuilder,
    requests: RequestBuilder,
    chain: Arc<dyn ChainReader>,
    prover: Arc<dyn Prover>,
    submitter: Option<Arc<dyn Submitter>>,
    store: Option<Arc<dyn NoteStore>>,
    last_save: Option<Instant>,
}

impl ShieldedPoolClient {
    pub fn new(
        config: ClientConfig,
        keys: KeyManager,
        chain: Arc<dyn ChainReader>,
        prover: Arc<dyn Prover>,
    ) -> Self {
        let pool_bytes = config.pool.to_bytes();
        let forest = EpochForest::new(config.program_id, config.pool);
        let notes = NoteManager::new(config.expiry_epochs());
        let scanner = Scanner::new(pool_bytes, *keys.viewing_key(), *keys.nullifier_key());
        let witness = WitnessBuilder::new(*keys.nullifier_key(), pool_bytes)
            .with_orientation(config.orientation);
        let requests = RequestBuilder::new(config.program_id, config.pool);

        Self {
            config,
            keys,
            forest,
            notes,
            scanner,
            witness,
            requests,
            chain,
            prover,
            submitter: None,
            store: None,
            last_save: None,
        }
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn Submitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn NoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn address(&self) -> ShieldedAddress {
        self.keys.address()
    }

    pub fn balance(&self) -> u64 {
        self.notes.balance()
    }

    pub fn balance_info(&self) -> BalanceInfo {
        self.notes.balance_info()
    }

    pub fn notes(&self) -> &NoteManager {
        &self.notes
    }

    pub fn forest(&self) -> &EpochForest {
        &self.forest
    }

    /// Load the persisted note tables, if a store is configured
    pub async fn restore(&mut self) -> WalletResult<bool> {
        let Some(store) = self.store.clone() else {
            return Ok(false);
        };
        let Some(snapshot) = store.load().await? else {
            return Ok(false);
        };

        info!(
            notes = snapshot.notes.len(),
            pending = snapshot.pending_notes.len(),
            epoch = snapshot.current_epoch,
            "restored note store"
        );
        self.forest.set_active_epoch(snapshot.current_epoch);
        self.notes
            .load_tables(snapshot.notes, snapshot.pending_notes, snapshot.current_epoch);
        Ok(true)
    }

    /// Refresh pool timing, the current epoch, and the forest
    pub async fn sync(&mut self) -> WalletResult<()> {
        match self.chain.get_account(&self.config.pool).await? {
            Some(data) => {
                let pool = PoolConfigAccount::try_from_bytes(&data)?;
                self.config.epoch_duration_slots = pool.epoch_duration_slots;
                self.config.expiry_slots = pool.expiry_slots;
                self.notes.set_expiry_epochs(self.config.expiry_epochs());
                self.notes.set_current_epoch(pool.current_epoch);
                self.forest.set_active_epoch(pool.current_epoch);
            }
            None => warn!(pool = %self.config.pool, "pool config account missing"),
        }

        self.forest.sync(self.chain.as_ref()).await?;
        self.maybe_persist().await?;
        Ok(())
    }

    /// Replay one transaction's records (used after submitting)
    pub async fn rescan(&mut self, signature: &str) -> WalletResult<ScanSummary> {
        let summary = self
            .scanner
            .rescan(signature, self.chain.as_ref(), &mut self.notes)
            .await?;
        self.absorb_summary(&summary);
        self.maybe_persist().await?;
        Ok(summary)
    }

    /// Replay recent pool history (used on wallet re-open)
    pub async fn scan_history(&mut self) -> WalletResult<ScanSummary> {
        let limit = self.config.history_scan_limit;
        let summary = self
            .scanner
            .scan_history(limit, self.chain.as_ref(), &mut self.notes)
            .await?;
        self.absorb_summary(&summary);
        self.maybe_persist().await?;
        Ok(summary)
    }

    fn absorb_summary(&mut self, summary: &ScanSummary) {
        for transition in &summary.transitions {
            self.forest
                .apply_transition(transition.epoch, transition.phase, transition.final_root);
        }
    }

    /// Shield transparent funds: creates the note, seals it to our own
    /// viewing key, and assembles the deposit request
    pub async fn deposit(&mut self, amount: u64, memo: Option<String>) -> WalletResult<FlowResult> {
        self.sync().await?;

        let note = self
            .notes
            .create_note(amount, self.config.asset_id, self.keys.address(), memo)?;
        let sealed = encrypt_note(self.keys.viewing_key(), &NoteOpening::from_note(&note))?;

        let active = self.forest.active_epoch();
        let next_leaf = self.forest.get_or_create(active).next_index();
        let request = self.requests.build_deposit(&note, sealed, active, next_leaf);

        self.notes.add_pending(note);
        debug!(amount, epoch = active, "deposit assembled");
        self.finish(request).await
    }

    /// Spend one note to a transparent recipient.
    ///
    /// Withdrawals are whole-note: the chosen note's full value is
    /// revealed and transferred, so a note with `value >= amount` must
    /// exist. Split first with [`Self::transfer`] for exact amounts.
    pub async fn withdraw(&mut self, amount: u64, recipient: [u8; 32]) -> WalletResult<FlowResult> {
        self.sync().await?;

        let candidates = self.notes.select_for_spend(amount, 1)?;
        let note = candidates
            .iter()
            .find(|n| n.value >= amount)
            .cloned()
            .ok_or_else(|| WalletError::InsufficientBalance {
                have: candidates.iter().map(|n| n.value).max().unwrap_or(0),
                need: amount,
            })?;

        let (Some(epoch), Some(leaf_index)) = (note.epoch, note.leaf_index) else {
            return Err(WalletError::NoteMissingEpochOrIndex);
        };
        let proof = self.forest.prove(epoch, leaf_index)?;
        let witness =
            self.witness
                .build_withdraw(&note, &proof, &recipient, note.value, [0u8; 32])?;
        let bundle = self.prove_checked(&witness).await?;

        let request = self
            .requests
            .build_withdraw(
                self.chain.as_ref(),
                &note,
                &bundle,
                recipient,
                self.notes.current_epoch(),
                self.config.expiry_epochs(),
            )
            .await?;

        info!(value = note.value, epoch, "withdraw assembled");
        self.finish(request).await
    }

    /// Transfer value privately to a shielded address, with change
    /// back to ourselves
    pub async fn transfer(
        &mut self,
        amount: u64,
        to: ShieldedAddress,
        memo: Option<String>,
    ) -> WalletResult<FlowResult> {
        self.sync().await?;

        let inputs = self.select_transfer_inputs(amount)?;
        let total_in: u64 = inputs.iter().map(|n| n.value).sum();
        let change = total_in - amount;

        let mut outputs = Vec::new();
        outputs.push(
            self.notes
                .create_note(amount, self.config.asset_id, to, memo)?,
        );
        if change > 0 {
            outputs.push(self.notes.create_note(
                change,
                self.config.asset_id,
                self.keys.address(),
                None,
            )?);
        }

        let mut proved_inputs = Vec::new();
        for note in &inputs {
            let (Some(epoch), Some(leaf_index)) = (note.epoch, note.leaf_index) else {
                return Err(WalletError::NoteMissingEpochOrIndex);
            };
            let proof = self.forest.prove(epoch, leaf_index)?;
            proved_inputs.push((note.clone(), proof));
        }

        let witness = self.witness.build_transfer(&proved_inputs, &outputs, [0u8; 32])?;
        let bundle = self.prove_checked(&witness).await?;

        // Outputs are sealed under our own viewing key so the sender
        // can always recover them; recipients learn their notes out of
        // band or by sharing a viewing key.
        let mut sealed_outputs = Vec::new();
        for output in &outputs {
            sealed_outputs.push(encrypt_note(
                self.keys.viewing_key(),
                &NoteOpening::from_note(output),
            )?);
        }

        let active = self.forest.active_epoch();
        let next_leaf = self.forest.get_or_create(active).next_index();
        let request = self
            .requests
            .build_transfer(
                self.chain.as_ref(),
                &inputs,
                sealed_outputs,
                &bundle,
                active,
                next_leaf,
                self.notes.current_epoch(),
                self.config.expiry_epochs(),
            )
            .await?;

        // track our own outputs until their placement confirms
        for output in outputs {
            if output.owner == self.keys.address() {
                self.notes.add_pending(output);
            }
        }

        info!(amount, inputs = inputs.len(), "transfer assembled");
        self.finish(request).await
    }

    /// Renew every expiring note (up to `max_notes`), oldest first
    pub async fn renew(&mut self, max_notes: usize) -> WalletResult<Vec<FlowResult>> {
        self.sync().await?;

        let expiring = self.notes.select_for_renewal(max_notes);
        if expiring.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = expiring.len(), "renewing expiring notes");

        let mut results = Vec::new();
        for note in expiring {
            results.push(self.renew_one(&note).await?);
        }
        Ok(results)
    }

    async fn renew_one(&mut self, note: &Note) -> WalletResult<FlowResult> {
        let (Some(old_epoch), Some(leaf_index)) = (note.epoch, note.leaf_index) else {
            return Err(WalletError::NoteMissingEpochOrIndex);
        };

        let renewed = self
            .notes
            .create_note(note.value, note.token, note.owner, note.memo.clone())?;
        let new_epoch = self.forest.active_epoch();

        let proof = self.forest.prove(old_epoch, leaf_index)?;
        let witness =
            self.witness
                .build_renew(note, &proof, &renewed.randomness, new_epoch, [0u8; 32])?;
        let bundle = self.prove_checked(&witness).await?;

        let sealed = encrypt_note(self.keys.viewing_key(), &NoteOpening::from_note(&renewed))?;
        let next_leaf = self.forest.get_or_create(new_epoch).next_index();
        let request = self
            .requests
            .build_renew(
                self.chain.as_ref(),
                note,
                sealed,
                &bundle,
                new_epoch,
                next_leaf,
                self.notes.current_epoch(),
                self.config.expiry_epochs(),
            )
            .await?;

        self.notes.add_pending(renewed);
        debug!(old_epoch, new_epoch, value = note.value, "renew assembled");
        self.finish(request).await
    }

    /// Pick at most two inputs covering `amount`: greedy first, then
    /// the two largest when the greedy set is too fragmented
    fn select_transfer_inputs(&self, amount: u64) -> WalletResult<Vec<Note>> {
        let selected = self.notes.select_for_spend(amount, 1)?;
        if selected.len() <= 2 {
            return Ok(selected);
        }

        let mut by_value = self.notes.spendable_notes();
        by_value.sort_by(|a, b| b.value.cmp(&a.value));
        by_value.truncate(2);

        let covered: u64 = by_value.iter().map(|n| n.value).sum();
        if covered < amount {
            return Err(WalletError::InsufficientBalance {
                have: covered,
                need: amount,
            });
        }
        Ok(by_value)
    }

    /// Prove and cross-check the public signals.
    ///
    /// With `mock_proofs` set the zeroed-proof prover runs instead of
    /// the configured backend; artifact checks are skipped since no
    /// witness generator is invoked.
    async fn prove_checked(&self, witness: &CircuitWitness) -> WalletResult<ProofBundle> {
        let bundle = if self.config.mock_proofs {
            MockProver::new().prove(witness).await?
        } else {
            let artifacts = CircuitArtifacts::resolve(witness.circuit);
            artifacts.ensure_available(witness.circuit)?;
            self.prover.prove(witness).await?
        };

        check_public_inputs(witness, &bundle)?;
        Ok(bundle)
    }

    /// Submit if a submitter is configured, then pick up our own
    /// outputs and refresh the forest
    async fn finish(&mut self, request: PreparedRequest) -> WalletResult<FlowResult> {
        let signature = match self.submitter.clone() {
            Some(submitter) => {
                let signature = submitter.submit(&request.payload, &request.routing).await?;
                info!(signature, kind = request.payload.kind(), "request submitted");

                let summary = self.rescan(&signature).await?;
                if summary.notes_promoted == 0 && summary.notes_found == 0 {
                    debug!(signature, "no own outputs confirmed yet");
                }
                self.forest.sync(self.chain.as_ref()).await?;
                Some(signature)
            }
            None => None,
        };

        self.maybe_persist().await?;
        Ok(FlowResult { request, signature })
    }

    /// Debounced snapshot save; coalesces bursts of mutations
    async fn maybe_persist(&mut self) -> WalletResult<()> {
        if self.store.is_none() || !self.notes.is_dirty() {
            return Ok(());
        }
        if let Some(last) = self.last_save {
            if last.elapsed() < self.config.save_debounce {
                return Ok(());
            }
        }
        self.persist_now().await
    }

    /// Synchronous barrier: flush the note tables to the store
    pub async fn persist_now(&mut self) -> WalletResult<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };

        let snapshot = NoteStoreSnapshot::new(
            self.notes.current_epoch(),
            self.notes.confirmed_notes().to_vec(),
            self.notes.pending_notes().to_vec(),
        );
        store.save(&snapshot).await?;
        self.notes.take_dirty();
        self.last_save = Some(Instant::now());
        Ok(())
    }
}
