//! Key derivation for the shielded pool
//!
//! A single 32-byte seed yields the whole key set:
//! - `spending_key = SHA256("spending" || seed)`
//! - `viewing_key = SHA256("viewing" || seed)` — decrypts notes sent to us
//! - `nullifier_key = SHA256("nullifier" || seed)` — derives nullifiers
//! - `shielded_address = SHA256("address" || spending_key)` — public identity
//!
//! Seeds come either raw, or from a BIP39 mnemonic collapsed through the
//! SLIP-0010 hardened path `m/44'/501'/0'/0'`.

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{WalletError, WalletResult};

type HmacSha512 = Hmac<Sha512>;

const SLIP10_CURVE_KEY: &[u8] = b"ed25519 seed";
const DERIVATION_PATH: [u32; 4] = [44, 501, 0, 0];
const HARDENED: u32 = 1 << 31;

/// A 32-byte shielded address, rendered in base58
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShieldedAddress(pub [u8; 32]);

impl ShieldedAddress {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Base58 text form
    pub fn encode(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Parse a base58 address; must decode to exactly 32 bytes
    pub fn decode(text: &str) -> WalletResult<Self> {
        let raw = bs58::decode(text)
            .into_vec()
            .map_err(|_| WalletError::InvalidAddress)?;

        let bytes: [u8; 32] = raw.try_into().map_err(|_| WalletError::InvalidAddress)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for ShieldedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

// Snapshots store addresses like every other 32-byte field: hex.
impl serde::Serialize for ShieldedAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for ShieldedAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as serde::Deserialize>::deserialize(deserializer)?;
        let raw = hex::decode(&text).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("address must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Holds the derived key set for one wallet
#[derive(Clone)]
pub struct KeyManager {
    seed: [u8; 32],
    spending_key: [u8; 32],
    viewing_key: [u8; 32],
    nullifier_key: [u8; 32],
    address: ShieldedAddress,
}

impl KeyManager {
    /// Generate a fresh wallet; returns the manager and its 12-word
    /// mnemonic for backup
    pub fn generate() -> WalletResult<(Self, String)> {
        let mnemonic =
            Mnemonic::generate(12).map_err(|_| WalletError::InvalidMnemonic)?;
        let phrase = mnemonic.to_string();
        let manager = Self::from_parsed_mnemonic(&mnemonic);
        Ok((manager, phrase))
    }

    /// Restore from a BIP39 phrase (checksum validated)
    pub fn from_mnemonic(phrase: &str) -> WalletResult<Self> {
        let mnemonic = Mnemonic::parse(phrase).map_err(|_| WalletError::InvalidMnemonic)?;
        Ok(Self::from_parsed_mnemonic(&mnemonic))
    }

    /// Use 32 seed bytes directly
    pub fn from_seed(bytes: &[u8]) -> WalletResult<Self> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WalletError::InvalidSeedLength(bytes.len()))?;
        Ok(Self::from_seed_array(seed))
    }

    fn from_parsed_mnemonic(mnemonic: &Mnemonic) -> Self {
        let long_seed = mnemonic.to_seed("");
        Self::from_seed_array(collapse_seed(&long_seed))
    }

    fn from_seed_array(seed: [u8; 32]) -> Self {
        let spending_key = tagged_hash(b"spending", &seed);
        let viewing_key = tagged_hash(b"viewing", &seed);
        let nullifier_key = tagged_hash(b"nullifier", &seed);
        let address = ShieldedAddress(tagged_hash(b"address", &spending_key));

        Self {
            seed,
            spending_key,
            viewing_key,
            nullifier_key,
            address,
        }
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    pub fn spending_key(&self) -> &[u8; 32] {
        &self.spending_key
    }

    pub fn viewing_key(&self) -> &[u8; 32] {
        &self.viewing_key
    }

    pub fn nullifier_key(&self) -> &[u8; 32] {
        &self.nullifier_key
    }

    pub fn address(&self) -> ShieldedAddress {
        self.address
    }

    /// Base58 form of the shielded address
    pub fn encode_address(&self) -> String {
        self.address.encode()
    }
}

/// SHA-256 over a domain tag and key material
fn tagged_hash(tag: &[u8], material: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(material);

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Collapse a 64-byte BIP39 seed to 32 bytes along m/44'/501'/0'/0'
fn collapse_seed(seed: &[u8; 64]) -> [u8; 32] {
    let (mut key, mut chain_code) = slip10_master(seed);
    for index in DERIVATION_PATH {
        (key, chain_code) = slip10_child(&key, &chain_code, index | HARDENED);
    }
    key
}

fn slip10_master(seed: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut mac = HmacSha512::new_from_slice(SLIP10_CURVE_KEY)
        .expect("HMAC accepts keys of any length");
    mac.update(seed);
    split_digest(&mac.finalize().into_bytes())
}

fn slip10_child(key: &[u8; 32], chain_code: &[u8; 32], index: u32) -> ([u8; 32], [u8; 32]) {
    let mut mac =
        HmacSha512::new_from_slice(chain_code).expect("HMAC accepts keys of any length");
    mac.update(&[0u8]);
    mac.update(key);
    mac.update(&index.to_be_bytes());
    split_digest(&mac.finalize().into_bytes())
}

fn split_digest(digest: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..64]);
    (key, chain_code)
}
