//! Note encryption
//!
//! Notes travel on-chain sealed with XSalsa20-Poly1305 under the
//! recipient's 32-byte viewing key, a fresh random 24-byte nonce per
//! sealing. Wire form: `nonce(24) || ciphertext`.
//!
//! Plaintext layout (130 bytes + memo):
//! `value(32, BE) || token(32) || owner(32) || blinding(32) ||
//!  memo_len(u16 LE) || memo_utf8`

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;

use crate::error::{WalletError, WalletResult};
use crate::keys::ShieldedAddress;
use crate::note::{AssetId, Note};

/// Nonce length prepended to every ciphertext
pub const NONCE_LEN: usize = 24;

/// Plaintext size before the memo
pub const NOTE_PLAINTEXT_BASE: usize = 130;

/// The fields a note ciphertext carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteOpening {
    pub value: u64,
    pub token: AssetId,
    pub owner: ShieldedAddress,
    pub blinding: [u8; 32],
    pub memo: Option<String>,
}

impl NoteOpening {
    /// Capture the transferable fields of a note
    pub fn from_note(note: &Note) -> Self {
        Self {
            value: note.value,
            token: note.token,
            owner: note.owner,
            blinding: note.blinding,
            memo: note.memo.clone(),
        }
    }

    /// Canonical plaintext serialization
    pub fn to_plaintext(&self) -> Vec<u8> {
        let memo = self.memo.as_deref().unwrap_or("");
        let memo_bytes = memo.as_bytes();

        let mut plaintext = Vec::with_capacity(NOTE_PLAINTEXT_BASE + memo_bytes.len());
        let mut value_be = [0u8; 32];
        value_be[24..].copy_from_slice(&self.value.to_be_bytes());
        plaintext.extend_from_slice(&value_be);
        plaintext.extend_from_slice(&self.token);
        plaintext.extend_from_slice(&self.owner.to_bytes());
        plaintext.extend_from_slice(&self.blinding);
        plaintext.extend_from_slice(&(memo_bytes.len() as u16).to_le_bytes());
        plaintext.extend_from_slice(memo_bytes);
        plaintext
    }

    /// Parse the canonical plaintext serialization
    pub fn from_plaintext(plaintext: &[u8]) -> WalletResult<Self> {
        if plaintext.len() < NOTE_PLAINTEXT_BASE {
            return Err(WalletError::DecryptFailed);
        }

        // value occupies the low 8 bytes of a 32-byte big-endian slot
        if plaintext[..24].iter().any(|b| *b != 0) {
            return Err(WalletError::DecryptFailed);
        }
        let mut value_bytes = [0u8; 8];
        value_bytes.copy_from_slice(&plaintext[24..32]);
        let value = u64::from_be_bytes(value_bytes);

        let mut token = [0u8; 32];
        token.copy_from_slice(&plaintext[32..64]);
        let mut owner = [0u8; 32];
        owner.copy_from_slice(&plaintext[64..96]);
        let mut blinding = [0u8; 32];
        blinding.copy_from_slice(&plaintext[96..128]);

        let memo_len =
            u16::from_le_bytes([plaintext[128], plaintext[129]]) as usize;
        if plaintext.len() != NOTE_PLAINTEXT_BASE + memo_len {
            return Err(WalletError::DecryptFailed);
        }
        let memo = if memo_len == 0 {
            None
        } else {
            let text = std::str::from_utf8(&plaintext[NOTE_PLAINTEXT_BASE..])
                .map_err(|_| WalletError::DecryptFailed)?;
            Some(text.to_string())
        };

        Ok(Self {
            value,
            token,
            owner: ShieldedAddress(owner),
            blinding,
            memo,
        })
    }
}

/// Seal arbitrary bytes under a 32-byte key: `nonce(24) || ciphertext`
pub fn seal_bytes(key: &[u8; 32], plaintext: &[u8]) -> WalletResult<Vec<u8>> {
    let cipher =
        XSalsa20Poly1305::new_from_slice(key).map_err(|_| WalletError::DecryptFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| WalletError::DecryptFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open `nonce(24) || ciphertext`; fails closed on any tampering
pub fn open_bytes(key: &[u8; 32], sealed: &[u8]) -> WalletResult<Vec<u8>> {
    if sealed.len() <= NONCE_LEN {
        return Err(WalletError::DecryptFailed);
    }

    let cipher =
        XSalsa20Poly1305::new_from_slice(key).map_err(|_| WalletError::DecryptFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&sealed[..NONCE_LEN]);
    let nonce = Nonce::from(nonce_bytes);

    cipher
        .decrypt(&nonce, &sealed[NONCE_LEN..])
        .map_err(|_| WalletError::DecryptFailed)
}

/// Seal a note under the recipient's viewing key
pub fn encrypt_note(viewing_key: &[u8; 32], opening: &NoteOpening) -> WalletResult<Vec<u8>> {
    seal_bytes(viewing_key, &opening.to_plaintext())
}

/// Open a sealed note; any failure means the note is not ours
pub fn decrypt_note(viewing_key: &[u8; 32], sealed: &[u8]) -> WalletResult<NoteOpening> {
    NoteOpening::from_plaintext(&open_bytes(viewing_key, sealed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opening() -> NoteOpening {
        NoteOpening {
            value: 5_000,
            token: [1u8; 32],
            owner: ShieldedAddress([2u8; 32]),
            blinding: [3u8; 32],
            memo: Some("coffee".to_string()),
        }
    }

    #[test]
    fn test_plaintext_layout() {
        let plaintext = opening().to_plaintext();
        assert_eq!(plaintext.len(), NOTE_PLAINTEXT_BASE + 6);
        // value big-endian in the last 8 bytes of the first slot
        assert_eq!(&plaintext[24..32], &5_000u64.to_be_bytes());
        // memo length little-endian
        assert_eq!(&plaintext[128..130], &[6, 0]);
        assert_eq!(&plaintext[130..], b"coffee");
    }

    #[test]
    fn test_plaintext_roundtrip() {
        let original = opening();
        let restored = NoteOpening::from_plaintext(&original.to_plaintext()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_empty_memo_roundtrip() {
        let mut original = opening();
        original.memo = None;
        let plaintext = original.to_plaintext();
        assert_eq!(plaintext.len(), NOTE_PLAINTEXT_BASE);
        assert_eq!(NoteOpening::from_plaintext(&plaintext).unwrap(), original);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let sealed = encrypt_note(&key, &opening()).unwrap();
        let restored = decrypt_note(&key, &sealed).unwrap();
        assert_eq!(restored, opening());
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = [42u8; 32];
        let a = encrypt_note(&key, &opening()).unwrap();
        let b = encrypt_note(&key, &opening()).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let sealed = encrypt_note(&[42u8; 32], &opening()).unwrap();
        assert!(matches!(
            decrypt_note(&[43u8; 32], &sealed),
            Err(WalletError::DecryptFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = [42u8; 32];
        let mut sealed = encrypt_note(&key, &opening()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(decrypt_note(&key, &sealed).is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        assert!(decrypt_note(&[0u8; 32], &[0u8; 10]).is_err());
    }
}
