//! End-to-end flows against an in-memory chain

use std::sync::Arc;

use solana_pubkey::Pubkey;
use yacoin_epoch_pool::events::{DepositEvent, EpochFinalizedEvent, EpochRolloverEvent, PoolEvent};
use yacoin_epoch_pool::{
    address, EpochPhase, EpochTreeAccount, LeafChunkAccount, PoolConfigAccount, PoolRequest,
};
use yacoin_epoch_wallet::{
    ClientConfig, InMemoryChain, KeyManager, MockProver, ShieldedAddress, ShieldedPoolClient,
};

const PROGRAM: Pubkey = Pubkey::new_from_array([0x10u8; 32]);
const POOL: Pubkey = Pubkey::new_from_array([0x20u8; 32]);

fn config() -> ClientConfig {
    let mut config = ClientConfig::new(PROGRAM, POOL, [0x30u8; 32]);
    config.mock_proofs = true;
    config.epoch_duration_slots = 100;
    config.expiry_slots = 300;
    config
}

fn client(chain: Arc<InMemoryChain>, seed: u8) -> ShieldedPoolClient {
    let keys = KeyManager::from_seed(&[seed; 32]).unwrap();
    ShieldedPoolClient::new(config(), keys, chain, Arc::new(MockProver::new()))
}

fn put_pool_config(chain: &InMemoryChain, current_epoch: u64) {
    let pool = PoolConfigAccount {
        authority: [0u8; 32],
        asset_id: [0x30u8; 32],
        current_epoch,
        epoch_duration_slots: 100,
        expiry_slots: 300,
    };
    chain.put_account(POOL, borsh::to_vec(&pool).unwrap());
}

fn put_epoch(chain: &InMemoryChain, epoch: u64, phase: EpochPhase, leaves: &[[u8; 32]]) {
    let header = EpochTreeAccount {
        epoch,
        phase,
        next_index: leaves.len() as u32,
        root: [0u8; 32],
        final_root: None,
    };
    chain.put_account(
        address::epoch_tree_address(&PROGRAM, &POOL, epoch),
        borsh::to_vec(&header).unwrap(),
    );
    for (chunk_index, chunk) in leaves.chunks(256).enumerate() {
        let account = LeafChunkAccount {
            epoch,
            chunk_index: chunk_index as u32,
            count: chunk.len() as u32,
            leaves: chunk.to_vec(),
        };
        chain.put_account(
            address::leaf_chunk_address(&PROGRAM, &POOL, epoch, chunk_index as u32),
            borsh::to_vec(&account).unwrap(),
        );
    }
}

/// Deposit `value` and confirm it at the next free leaf of `epoch`
async fn deposit_and_confirm(
    client: &mut ShieldedPoolClient,
    chain: &InMemoryChain,
    leaves: &mut Vec<[u8; 32]>,
    value: u64,
    epoch: u64,
) {
    let result = client.deposit(value, None).await.unwrap();
    let commitment = match &result.request.payload {
        PoolRequest::Deposit { commitment, .. } => *commitment,
        other => panic!("unexpected payload {other:?}"),
    };

    let leaf_index = leaves.len() as u64;
    leaves.push(commitment);
    put_epoch(chain, epoch, EpochPhase::Active, leaves);

    let record = PoolEvent::Deposit(DepositEvent {
        epoch,
        pool_id: POOL.to_bytes(),
        commitment,
        leaf_index,
        new_root: [0u8; 32],
        encrypted_note: Vec::new(),
    })
    .encode();
    let signature = format!("sig-{value}-{leaf_index}");
    chain.push_records(&signature, vec![record]);

    client.rescan(&signature).await.unwrap();
    client.sync().await.unwrap();
}

#[tokio::test]
async fn full_lifecycle_deposit_transfer_withdraw() {
    let chain = Arc::new(InMemoryChain::new());
    put_pool_config(&chain, 1);
    put_epoch(&chain, 1, EpochPhase::Active, &[]);

    let mut wallet = client(chain.clone(), 0x42);
    let mut leaves = Vec::new();

    deposit_and_confirm(&mut wallet, &chain, &mut leaves, 300, 1).await;
    deposit_and_confirm(&mut wallet, &chain, &mut leaves, 200, 1).await;
    assert_eq!(wallet.balance(), 500);

    // every confirmed note has a verifying membership proof
    for note in wallet.notes().confirmed_notes() {
        let proof = wallet
            .forest()
            .prove(note.epoch.unwrap(), note.leaf_index.unwrap())
            .unwrap();
        assert!(proof.verify());
        assert_eq!(proof.leaf, note.commitment);
    }

    // a transfer of 450 needs both notes; change of 50 comes back
    let recipient = ShieldedAddress([0x77u8; 32]);
    let result = wallet.transfer(450, recipient, None).await.unwrap();
    match &result.request.payload {
        PoolRequest::Transfer { input_epochs, proof, .. } => {
            assert_eq!(*input_epochs, [1, 1]);
            assert_eq!(proof.public_inputs.len(), 8);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(wallet.notes().pending_notes().len(), 1);
    assert_eq!(wallet.notes().pending_notes()[0].value, 50);

    // whole-note withdraw of the 300 note
    let result = wallet.withdraw(250, [0xaau8; 32]).await.unwrap();
    match &result.request.payload {
        PoolRequest::Withdraw { amount, epoch, .. } => {
            assert_eq!(*amount, 300);
            assert_eq!(*epoch, 1);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn epoch_lifecycle_drives_forest_and_renewal() {
    let chain = Arc::new(InMemoryChain::new());
    put_pool_config(&chain, 1);
    put_epoch(&chain, 1, EpochPhase::Active, &[]);

    let mut wallet = client(chain.clone(), 0x43);
    let mut leaves = Vec::new();
    deposit_and_confirm(&mut wallet, &chain, &mut leaves, 500, 1).await;

    // the pool rolls over twice and finalizes epoch 1
    let final_root = wallet.forest().tree(1).unwrap().current_root();
    let records = vec![
        PoolEvent::EpochRollover(EpochRolloverEvent {
            old_epoch: 1,
            new_epoch: 2,
            slot: 200,
        })
        .encode(),
        PoolEvent::EpochRollover(EpochRolloverEvent {
            old_epoch: 2,
            new_epoch: 3,
            slot: 300,
        })
        .encode(),
        PoolEvent::EpochFinalized(EpochFinalizedEvent {
            epoch: 1,
            final_root,
            slot: 310,
        })
        .encode(),
    ];
    chain.push_records("rollovers", vec![records[0].clone()]);
    chain.push_records("more", records[1..].to_vec());
    put_pool_config(&chain, 3);
    put_epoch(&chain, 3, EpochPhase::Active, &[]);

    let summary = wallet.scan_history().await.unwrap();
    assert_eq!(summary.transitions.len(), 5);
    assert_eq!(wallet.notes().current_epoch(), 3);
    assert_eq!(wallet.forest().active_epoch(), 3);
    assert_eq!(wallet.forest().tree(1).unwrap().phase(), EpochPhase::Finalized);

    // proofs against the finalized epoch carry its frozen root
    let proof = wallet.forest().prove(1, 0).unwrap();
    assert_eq!(proof.root, final_root);
    assert!(proof.verify());

    // the epoch-1 note is now expiring; renew migrates it to epoch 3
    let info = wallet.balance_info();
    assert_eq!(info.expiring, 500);

    let results = wallet.renew(10).await.unwrap();
    assert_eq!(results.len(), 1);
    match &results[0].request.payload {
        PoolRequest::Renew { old_epoch, new_epoch, .. } => {
            assert_eq!((*old_epoch, *new_epoch), (1, 3));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(wallet.notes().pending_notes().len(), 1);
}

#[tokio::test]
async fn incoming_notes_are_discovered_by_trial_decryption() {
    let chain = Arc::new(InMemoryChain::new());
    put_pool_config(&chain, 1);
    put_epoch(&chain, 1, EpochPhase::Active, &[]);

    // the sender knows the receiver's viewing key and seals a note to it
    let receiver_keys = KeyManager::from_seed(&[0x44u8; 32]).unwrap();
    let note = yacoin_epoch_wallet::Note::new(
        750,
        [0x30u8; 32],
        receiver_keys.address(),
        [0x5au8; 32],
        Some("invoice 12".into()),
    )
    .unwrap();
    let sealed = yacoin_epoch_wallet::encrypt_note(
        receiver_keys.viewing_key(),
        &yacoin_epoch_wallet::NoteOpening::from_note(&note),
    )
    .unwrap();

    put_epoch(&chain, 1, EpochPhase::Active, &[note.commitment]);
    chain.push_records(
        "incoming",
        vec![PoolEvent::Deposit(DepositEvent {
            epoch: 1,
            pool_id: POOL.to_bytes(),
            commitment: note.commitment,
            leaf_index: 0,
            new_root: [0u8; 32],
            encrypted_note: sealed,
        })
        .encode()],
    );

    let mut receiver = client(chain.clone(), 0x44);
    receiver.sync().await.unwrap();
    let summary = receiver.scan_history().await.unwrap();

    assert_eq!(summary.notes_found, 1);
    assert_eq!(receiver.balance(), 750);
    let found = &receiver.notes().confirmed_notes()[0];
    assert_eq!(found.memo.as_deref(), Some("invoice 12"));
    assert_eq!(found.commitment, note.commitment);

    // a wallet with different keys sees nothing
    let mut stranger = client(chain, 0x45);
    stranger.sync().await.unwrap();
    let summary = stranger.scan_history().await.unwrap();
    assert_eq!(summary.notes_found, 0);
    assert_eq!(stranger.balance(), 0);
}
