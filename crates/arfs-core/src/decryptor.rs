//! PrivateKeyDecryptor: finds the drive key that opens a private record.
//!
//! Resolution order, stopping at the first key that both authenticates and
//! yields valid JSON:
//!
//! 1. The key cached for this drive
//! 2. Caller-supplied candidate keys, in order (a winner moves to the cache)
//! 3. A key derived from the configured password and wallet signer
//!
//! Whatever wins is cached against the drive ID. Nothing here ever fails: when
//! no key fits, `resolve` returns `None` and `safely_decrypt_to_json` returns
//! the caller's placeholder.

use crate::crypto::{self, DriveKey, DriveSigner};
use crate::ids::EntityId;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Which step of the cascade produced the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Cache,
    Candidate,
    Password,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: DriveKey,
    pub json: Value,
    pub source: KeySource,
}

struct PasswordSource {
    password: String,
    signer: Arc<dyn DriveSigner>,
}

#[derive(Default)]
pub struct PrivateKeyDecryptor {
    /// drive ID -> key that last opened one of its records
    cache: RwLock<HashMap<EntityId, DriveKey>>,
    candidates: Mutex<Vec<DriveKey>>,
    password: Option<PasswordSource>,
}

impl PrivateKeyDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys to try, in order, when the cache misses.
    pub fn with_candidate_keys(self, keys: impl IntoIterator<Item = DriveKey>) -> Self {
        self.candidates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(keys);
        self
    }

    /// Fall back to deriving the drive key from `password`.
    pub fn with_password(mut self, password: impl Into<String>, signer: Arc<dyn DriveSigner>) -> Self {
        self.password = Some(PasswordSource {
            password: password.into(),
            signer,
        });
        self
    }

    /// Seed the cache with a key known to belong to `drive_id`.
    pub fn cache_key(&self, drive_id: EntityId, key: DriveKey) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(drive_id, key);
    }

    pub fn cached_key(&self, drive_id: &EntityId) -> Option<DriveKey> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(drive_id)
            .cloned()
    }

    /// Number of candidate keys not yet matched to a drive.
    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run the cascade for one sealed body.
    pub fn resolve(&self, drive_id: &EntityId, cipher_iv: &str, body: &[u8]) -> Option<ResolvedKey> {
        if let Some(key) = self.cached_key(drive_id) {
            if let Some(json) = open_json(&key, cipher_iv, body) {
                debug!("Drive {} opened with cached key", drive_id);
                return Some(ResolvedKey {
                    key,
                    json,
                    source: KeySource::Cache,
                });
            }
        }

        if let Some((key, json)) = self.try_candidates(cipher_iv, body) {
            debug!("Drive {} opened with candidate key", drive_id);
            self.cache_key(*drive_id, key.clone());
            return Some(ResolvedKey {
                key,
                json,
                source: KeySource::Candidate,
            });
        }

        if let Some(source) = &self.password {
            match crypto::derive_drive_key(&source.password, drive_id, source.signer.as_ref()) {
                Ok(key) => {
                    if let Some(json) = open_json(&key, cipher_iv, body) {
                        debug!("Drive {} opened with password-derived key", drive_id);
                        self.cache_key(*drive_id, key.clone());
                        return Some(ResolvedKey {
                            key,
                            json,
                            source: KeySource::Password,
                        });
                    }
                }
                Err(e) => warn!("Failed to derive key for drive {}: {}", drive_id, e),
            }
        }

        debug!("No key opens drive {}", drive_id);
        None
    }

    /// Decrypt `body` to JSON with whichever key fits, else return `placeholder`.
    pub fn safely_decrypt_to_json(
        &self,
        drive_id: &EntityId,
        cipher_iv: &str,
        body: &[u8],
        placeholder: Value,
    ) -> Value {
        self.resolve(drive_id, cipher_iv, body)
            .map(|resolved| resolved.json)
            .unwrap_or(placeholder)
    }

    /// Try candidates in order; the winner leaves the list.
    fn try_candidates(&self, cipher_iv: &str, body: &[u8]) -> Option<(DriveKey, Value)> {
        let mut candidates = self.candidates.lock().unwrap_or_else(|e| e.into_inner());
        let (index, json) = candidates
            .iter()
            .enumerate()
            .find_map(|(i, key)| open_json(key, cipher_iv, body).map(|json| (i, json)))?;
        Some((candidates.remove(index), json))
    }
}

fn open_json(key: &DriveKey, cipher_iv: &str, body: &[u8]) -> Option<Value> {
    let plaintext = crypto::decrypt(key, cipher_iv, body).ok()?;
    serde_json::from_slice(&plaintext).ok()
}
