//! Symmetric crypto for private drives.
//!
//! Metadata bodies of private entities are sealed with AES-256-GCM using a
//! 12-byte IV carried base64url-encoded in the `Cipher-IV` tag. Drive keys are
//! derived with HKDF-SHA256 from a wallet signature over the drive ID, using
//! the drive password as info. File keys are derived from the drive key with
//! the file ID as info.

use crate::ids::EntityId;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// AES-GCM IV length used by ArFS.
pub const IV_LEN: usize = 12;
/// Symmetric key length (AES-256).
pub const KEY_LEN: usize = 32;

/// Prefix signed by the wallet when deriving a drive key.
const DRIVE_SIGNING_PREFIX: &[u8] = b"drive";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid cipher IV: {0}")]
    InvalidIv(String),

    #[error("Decryption failed (wrong key or corrupted body)")]
    Decrypt,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

/// Key protecting a private drive and its folders.
pub type DriveKey = SymmetricKey;
/// Key protecting one private file, derived from its drive key.
pub type FileKey = SymmetricKey;

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len())))?;
        Ok(Self(array))
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Parse a base64url (or standard base64) encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = decode_b64(encoded).map_err(CryptoError::InvalidKey)?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Never print key material
impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Wallet signing material used for password-based drive key derivation.
///
/// Wallet management lives outside this crate; callers adapt their wallet to
/// this trait.
pub trait DriveSigner: Send + Sync {
    /// Deterministically sign `message` with the wallet's private key.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Derive a drive key from the drive password and the wallet's signature over
/// the drive ID.
pub fn derive_drive_key(password: &str, drive_id: &EntityId, signer: &dyn DriveSigner) -> Result<DriveKey> {
    let mut message = DRIVE_SIGNING_PREFIX.to_vec();
    message.extend_from_slice(drive_id.as_bytes());
    let signature = signer.sign(&message)?;

    let hk = Hkdf::<Sha256>::new(None, &signature);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(password.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {:?}", e)))?;
    Ok(SymmetricKey(okm))
}

/// Derive the per-file key of a private file.
pub fn derive_file_key(drive_key: &DriveKey, file_id: &EntityId) -> Result<FileKey> {
    let hk = Hkdf::<Sha256>::new(None, drive_key.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(file_id.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {:?}", e)))?;
    Ok(SymmetricKey(okm))
}

/// Decode a `Cipher-IV` tag value.
pub fn decode_iv(cipher_iv: &str) -> Result<[u8; IV_LEN]> {
    let bytes = decode_b64(cipher_iv).map_err(CryptoError::InvalidIv)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidIv(format!("expected {} bytes, got {}", IV_LEN, bytes.len())))
}

/// Open an AES-256-GCM sealed body.
pub fn decrypt(key: &SymmetricKey, cipher_iv: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let iv = decode_iv(cipher_iv)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Seal `plaintext` under a fresh random IV.
///
/// Returns the base64url IV (as written to `Cipher-IV`) and the ciphertext
/// with the GCM tag appended.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<(String, Vec<u8>)> {
    use rand::Rng;
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok((URL_SAFE_NO_PAD.encode(iv), ciphertext))
}

/// Accepts base64url or standard base64, padded or not.
fn decode_b64(encoded: &str) -> std::result::Result<Vec<u8>, String> {
    let trimmed = encoded.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| e.to_string())
}
