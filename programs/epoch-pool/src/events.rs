//! Tagged event records emitted by the epoch pool
//!
//! Every record is `tag(8) || payload` where the tag is the first 8 bytes
//! of `SHA-256("event:" || EventName)`. Payloads are borsh-encoded:
//! integers little-endian, 32-byte fields verbatim, variable-length
//! fields with a u32-LE length prefix.
//!
//! The `*V1` variants are the pre-epoch wire format; they carry a leading
//! version byte plus explicit pool/chain ids and survive only for
//! historical replay.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::error::EpochPoolError;

/// Length of the event tag prefix
pub const EVENT_TAG_LEN: usize = 8;

/// Wire version carried by the legacy events
pub const LEGACY_EVENT_VERSION: u8 = 1;

/// Compute the 8-byte tag for an event name
pub fn event_tag(name: &str) -> [u8; EVENT_TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"event:");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut tag = [0u8; EVENT_TAG_LEN];
    tag.copy_from_slice(&digest[..EVENT_TAG_LEN]);
    tag
}

/// A note entered the pool
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DepositEvent {
    pub epoch: u64,
    pub pool_id: [u8; 32],
    pub commitment: [u8; 32],
    pub leaf_index: u64,
    pub new_root: [u8; 32],
    pub encrypted_note: Vec<u8>,
}

/// A note left the pool to a transparent account
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WithdrawEvent {
    pub epoch: u64,
    pub pool_id: [u8; 32],
    pub nullifier: [u8; 32],
    pub amount: u64,
    pub recipient: [u8; 32],
}

/// A shielded transfer: up to two inputs spent, outputs placed in `output_epoch`
///
/// `nullifiers` and `input_epochs` are index-paired, as are
/// `output_commitments` and `output_leaf_indices`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransferEvent {
    pub output_epoch: u64,
    pub pool_id: [u8; 32],
    pub nullifiers: Vec<[u8; 32]>,
    pub input_epochs: Vec<u64>,
    pub output_commitments: Vec<[u8; 32]>,
    pub output_leaf_indices: Vec<u64>,
}

/// A note migrated from an expiring epoch into a fresh one
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RenewEvent {
    pub old_epoch: u64,
    pub new_epoch: u64,
    pub pool_id: [u8; 32],
    pub old_nullifier: [u8; 32],
    pub new_commitment: [u8; 32],
    pub new_leaf_index: u64,
}

/// The pool rolled over to a new deposit epoch
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EpochRolloverEvent {
    pub old_epoch: u64,
    pub new_epoch: u64,
    pub slot: u64,
}

/// An epoch's root was frozen permanently
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EpochFinalizedEvent {
    pub epoch: u64,
    pub final_root: [u8; 32],
    pub slot: u64,
}

/// Legacy deposit record (single global tree, no epochs)
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DepositEventV1 {
    pub version: u8,
    pub pool_id: [u8; 32],
    pub chain_id: [u8; 32],
    pub commitment: [u8; 32],
    pub leaf_index: u64,
    pub new_root: [u8; 32],
    pub encrypted_note: Vec<u8>,
}

/// Legacy withdraw record
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WithdrawEventV1 {
    pub version: u8,
    pub pool_id: [u8; 32],
    pub chain_id: [u8; 32],
    pub nullifier: [u8; 32],
    pub amount: u64,
    pub recipient: [u8; 32],
}

/// Legacy shielded transfer record
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ShieldedTransferEventV1 {
    pub version: u8,
    pub pool_id: [u8; 32],
    pub chain_id: [u8; 32],
    pub nullifiers: Vec<[u8; 32]>,
    pub output_commitments: Vec<[u8; 32]>,
    pub output_leaf_indices: Vec<u64>,
}

/// Any record the pool emits
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    Deposit(DepositEvent),
    Withdraw(WithdrawEvent),
    Transfer(TransferEvent),
    Renew(RenewEvent),
    EpochRollover(EpochRolloverEvent),
    EpochFinalized(EpochFinalizedEvent),
    DepositV1(DepositEventV1),
    WithdrawV1(WithdrawEventV1),
    ShieldedTransferV1(ShieldedTransferEventV1),
}

const EVENT_NAMES: [&str; 9] = [
    "DepositEvent",
    "WithdrawEvent",
    "TransferEvent",
    "RenewEvent",
    "EpochRolloverEvent",
    "EpochFinalizedEvent",
    "DepositEventV1",
    "WithdrawEventV1",
    "ShieldedTransferEventV1",
];

fn tag_table() -> &'static [[u8; EVENT_TAG_LEN]; 9] {
    static TAGS: OnceLock<[[u8; EVENT_TAG_LEN]; 9]> = OnceLock::new();
    TAGS.get_or_init(|| {
        let mut tags = [[0u8; EVENT_TAG_LEN]; 9];
        for (slot, name) in tags.iter_mut().zip(EVENT_NAMES) {
            *slot = event_tag(name);
        }
        tags
    })
}

impl PoolEvent {
    /// Event name as emitted on the wire
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Deposit(_) => "DepositEvent",
            PoolEvent::Withdraw(_) => "WithdrawEvent",
            PoolEvent::Transfer(_) => "TransferEvent",
            PoolEvent::Renew(_) => "RenewEvent",
            PoolEvent::EpochRollover(_) => "EpochRolloverEvent",
            PoolEvent::EpochFinalized(_) => "EpochFinalizedEvent",
            PoolEvent::DepositV1(_) => "DepositEventV1",
            PoolEvent::WithdrawV1(_) => "WithdrawEventV1",
            PoolEvent::ShieldedTransferV1(_) => "ShieldedTransferEventV1",
        }
    }

    /// Serialize to `tag || payload`
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            PoolEvent::Deposit(e) => borsh::to_vec(e),
            PoolEvent::Withdraw(e) => borsh::to_vec(e),
            PoolEvent::Transfer(e) => borsh::to_vec(e),
            PoolEvent::Renew(e) => borsh::to_vec(e),
            PoolEvent::EpochRollover(e) => borsh::to_vec(e),
            PoolEvent::EpochFinalized(e) => borsh::to_vec(e),
            PoolEvent::DepositV1(e) => borsh::to_vec(e),
            PoolEvent::WithdrawV1(e) => borsh::to_vec(e),
            PoolEvent::ShieldedTransferV1(e) => borsh::to_vec(e),
        }
        .expect("borsh encoding of an owned event cannot fail");

        let mut record = Vec::with_capacity(EVENT_TAG_LEN + payload.len());
        record.extend_from_slice(&event_tag(self.name()));
        record.extend_from_slice(&payload);
        record
    }

    /// Parse a full record (`tag || payload`)
    pub fn decode(record: &[u8]) -> Result<Self, EpochPoolError> {
        if record.len() < EVENT_TAG_LEN {
            return Err(EpochPoolError::WireFormatInvalid(format!(
                "record too short: {} bytes",
                record.len()
            )));
        }

        let mut tag = [0u8; EVENT_TAG_LEN];
        tag.copy_from_slice(&record[..EVENT_TAG_LEN]);
        let payload = &record[EVENT_TAG_LEN..];

        let tags = tag_table();
        let index = tags
            .iter()
            .position(|t| *t == tag)
            .ok_or(EpochPoolError::UnknownEventTag(tag))?;

        let wire = |e: borsh::io::Error| EpochPoolError::WireFormatInvalid(e.to_string());

        let event = match EVENT_NAMES[index] {
            "DepositEvent" => PoolEvent::Deposit(borsh::from_slice(payload).map_err(wire)?),
            "WithdrawEvent" => PoolEvent::Withdraw(borsh::from_slice(payload).map_err(wire)?),
            "TransferEvent" => PoolEvent::Transfer(borsh::from_slice(payload).map_err(wire)?),
            "RenewEvent" => PoolEvent::Renew(borsh::from_slice(payload).map_err(wire)?),
            "EpochRolloverEvent" => {
                PoolEvent::EpochRollover(borsh::from_slice(payload).map_err(wire)?)
            }
            "EpochFinalizedEvent" => {
                PoolEvent::EpochFinalized(borsh::from_slice(payload).map_err(wire)?)
            }
            "DepositEventV1" => PoolEvent::DepositV1(borsh::from_slice(payload).map_err(wire)?),
            "WithdrawEventV1" => PoolEvent::WithdrawV1(borsh::from_slice(payload).map_err(wire)?),
            "ShieldedTransferEventV1" => {
                PoolEvent::ShieldedTransferV1(borsh::from_slice(payload).map_err(wire)?)
            }
            _ => unreachable!("tag table and name table are index-paired"),
        };

        match &event {
            PoolEvent::DepositV1(e) if e.version != LEGACY_EVENT_VERSION => {
                return Err(EpochPoolError::UnsupportedVersion(e.version));
            }
            PoolEvent::WithdrawV1(e) if e.version != LEGACY_EVENT_VERSION => {
                return Err(EpochPoolError::UnsupportedVersion(e.version));
            }
            PoolEvent::ShieldedTransferV1(e) if e.version != LEGACY_EVENT_VERSION => {
                return Err(EpochPoolError::UnsupportedVersion(e.version));
            }
            _ => {}
        }

        Ok(event)
    }

    /// The pool this record belongs to, if the event kind carries one
    pub fn pool_id(&self) -> Option<&[u8; 32]> {
        match self {
            PoolEvent::Deposit(e) => Some(&e.pool_id),
            PoolEvent::Withdraw(e) => Some(&e.pool_id),
            PoolEvent::Transfer(e) => Some(&e.pool_id),
            PoolEvent::Renew(e) => Some(&e.pool_id),
            PoolEvent::DepositV1(e) => Some(&e.pool_id),
            PoolEvent::WithdrawV1(e) => Some(&e.pool_id),
            PoolEvent::ShieldedTransferV1(e) => Some(&e.pool_id),
            PoolEvent::EpochRollover(_) | PoolEvent::EpochFinalized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_prefix_of_sha256() {
        let mut hasher = Sha256::new();
        hasher.update(b"event:DepositEvent");
        let digest = hasher.finalize();
        assert_eq!(event_tag("DepositEvent"), digest[..8]);
    }

    #[test]
    fn test_tags_distinct() {
        let tags = tag_table();
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_deposit_roundtrip() {
        let event = PoolEvent::Deposit(DepositEvent {
            epoch: 3,
            pool_id: [7u8; 32],
            commitment: [1u8; 32],
            leaf_index: 42,
            new_root: [2u8; 32],
            encrypted_note: vec![9, 9, 9],
        });

        let record = event.encode();
        assert_eq!(PoolEvent::decode(&record).unwrap(), event);
    }

    #[test]
    fn test_transfer_roundtrip() {
        let event = PoolEvent::Transfer(TransferEvent {
            output_epoch: 5,
            pool_id: [7u8; 32],
            nullifiers: vec![[1u8; 32], [2u8; 32]],
            input_epochs: vec![3, 4],
            output_commitments: vec![[5u8; 32], [6u8; 32]],
            output_leaf_indices: vec![10, 11],
        });

        let record = event.encode();
        assert_eq!(PoolEvent::decode(&record).unwrap(), event);
    }

    #[test]
    fn test_wire_layout_is_le_with_len_prefix() {
        let event = DepositEvent {
            epoch: 0x0102030405060708,
            pool_id: [0u8; 32],
            commitment: [0u8; 32],
            leaf_index: 1,
            new_root: [0u8; 32],
            encrypted_note: vec![0xaa, 0xbb],
        };
        let bytes = borsh::to_vec(&event).unwrap();

        // epoch u64 little-endian
        assert_eq!(&bytes[..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        // encrypted_note: u32-LE length then bytes, at the tail
        assert_eq!(&bytes[bytes.len() - 6..], &[2, 0, 0, 0, 0xaa, 0xbb]);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut record = vec![0u8; 16];
        record[..8].copy_from_slice(&[0xff; 8]);
        assert!(matches!(
            PoolEvent::decode(&record),
            Err(EpochPoolError::UnknownEventTag(_))
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let event = PoolEvent::Withdraw(WithdrawEvent {
            epoch: 1,
            pool_id: [0u8; 32],
            nullifier: [1u8; 32],
            amount: 500,
            recipient: [2u8; 32],
        });
        let record = event.encode();
        assert!(matches!(
            PoolEvent::decode(&record[..record.len() - 4]),
            Err(EpochPoolError::WireFormatInvalid(_))
        ));
    }

    #[test]
    fn test_legacy_version_checked() {
        let event = PoolEvent::WithdrawV1(WithdrawEventV1 {
            version: 2,
            pool_id: [0u8; 32],
            chain_id: [0u8; 32],
            nullifier: [1u8; 32],
            amount: 10,
            recipient: [2u8; 32],
        });
        assert!(matches!(
            PoolEvent::decode(&event.encode()),
            Err(EpochPoolError::UnsupportedVersion(2))
        ));
    }
}
