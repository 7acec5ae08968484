//! Bulk encryption of many accounts' secrets under one passphrase.
//!
//! A batch holds the public data of every account plus one ciphertext
//! over the concatenation of their 32-byte secret keys, in entry order.
//! Unlocking any batched account decrypts the whole ciphertext once and
//! memoizes every secret for the lifetime of the wallet instance.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "entries": [{
//!     "uuid": "<uuid>", "name": "<name>",
//!     "verification_vector": ["<hex>", ...],
//!     "signing_threshold": "<decimal>",
//!     "participants": {"<decimal id>": "<address>", ...},
//!     "pubkey": "<hex>"
//!   }, ...],
//!   "crypto": { ... },
//!   "encryptor": "<name>",
//!   "version": 1
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use distwallet_crypto::encryptor::Encryptor;
use distwallet_crypto::keys::{PublicKey, SecretKey, SECRET_KEY_LEN};
use distwallet_types::{DistWalletError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::validation;

/// Batch record format version.
pub const BATCH_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// BatchEntry
// ---------------------------------------------------------------------------

/// Public data of one batched account.
#[derive(Clone, Debug)]
pub(crate) struct BatchEntry {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) verification_vector: Vec<PublicKey>,
    pub(crate) signing_threshold: u32,
    pub(crate) participants: BTreeMap<u64, String>,
    pub(crate) public_key: PublicKey,
}

#[derive(Serialize, Deserialize)]
struct EntryJson {
    uuid: Uuid,
    name: String,
    verification_vector: Vec<String>,
    signing_threshold: String,
    participants: BTreeMap<String, String>,
    pubkey: String,
}

#[derive(Serialize, Deserialize)]
struct BatchJson {
    entries: Vec<EntryJson>,
    crypto: serde_json::Value,
    encryptor: String,
    version: u32,
}

impl From<&BatchEntry> for EntryJson {
    fn from(entry: &BatchEntry) -> Self {
        Self {
            uuid: entry.id,
            name: entry.name.clone(),
            verification_vector: entry.verification_vector.iter().map(PublicKey::to_hex).collect(),
            signing_threshold: entry.signing_threshold.to_string(),
            participants: entry
                .participants
                .iter()
                .map(|(id, address)| (id.to_string(), address.clone()))
                .collect(),
            pubkey: entry.public_key.to_hex(),
        }
    }
}

impl TryFrom<EntryJson> for BatchEntry {
    type Error = DistWalletError;

    fn try_from(json: EntryJson) -> Result<Self> {
        let verification_vector = json
            .verification_vector
            .iter()
            .enumerate()
            .map(|(i, key)| {
                PublicKey::from_hex(key)
                    .map_err(|_| validation(format!("batch entry {} verification vector {i} invalid", json.name)))
            })
            .collect::<Result<Vec<_>>>()?;
        let signing_threshold = json
            .signing_threshold
            .parse::<u32>()
            .map_err(|_| validation(format!("batch entry {} signing threshold invalid", json.name)))?;
        let participants = json
            .participants
            .into_iter()
            .map(|(id, address)| {
                id.parse::<u64>()
                    .map(|id| (id, address))
                    .map_err(|_| validation(format!("batch entry {} participant ID invalid", json.name)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let public_key = PublicKey::from_hex(&json.pubkey)
            .map_err(|_| validation(format!("batch entry {} pubkey invalid", json.name)))?;

        Ok(Self {
            id: json.uuid,
            name: json.name,
            verification_vector,
            signing_threshold,
            participants,
            public_key,
        })
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Decoded batch record.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) entries: Vec<BatchEntry>,
    pub(crate) crypto: serde_json::Value,
}

impl Batch {
    /// Encodes the batch record, tagged with `encryptor_name`.
    pub(crate) fn serialize(&self, encryptor_name: &str) -> Result<Vec<u8>> {
        let json = BatchJson {
            entries: self.entries.iter().map(EntryJson::from).collect(),
            crypto: self.crypto.clone(),
            encryptor: encryptor_name.to_string(),
            version: BATCH_VERSION,
        };
        serde_json::to_vec(&json).map_err(|e| DistWalletError::StorageError {
            reason: format!("failed to encode batch record: {e}"),
        })
    }

    /// Decodes a batch record, accepting only version 1 records written
    /// by the encryptor called `encryptor_name`.
    pub(crate) fn deserialize(data: &[u8], encryptor_name: &str) -> Result<Self> {
        let json: BatchJson = serde_json::from_slice(data)
            .map_err(|e| validation(format!("batch record invalid: {e}")))?;
        if json.version != BATCH_VERSION {
            return Err(validation(format!("unsupported version {}", json.version)));
        }
        if json.encryptor != encryptor_name {
            return Err(validation(format!("unsupported encryptor {}", json.encryptor)));
        }
        let entries = json
            .entries
            .into_iter()
            .map(BatchEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            entries,
            crypto: json.crypto,
        })
    }

    /// Decrypts every secret in the batch.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::AuthenticationError`] if the passphrase is
    ///   wrong or any secret does not match its entry's public key.
    /// - [`DistWalletError::CorruptionError`] if the plaintext length is
    ///   not 32 bytes per entry.
    pub(crate) fn decrypt(
        &self,
        encryptor: &dyn Encryptor,
        passphrase: &[u8],
    ) -> Result<HashMap<Uuid, SecretKey>> {
        let plaintext = encryptor.decrypt(&self.crypto, passphrase).map_err(|_| {
            DistWalletError::AuthenticationError {
                reason: "incorrect passphrase".into(),
            }
        })?;
        if plaintext.len() != SECRET_KEY_LEN * self.entries.len() {
            return Err(DistWalletError::CorruptionError {
                reason: format!(
                    "batch holds {} secret bytes for {} entries",
                    plaintext.len(),
                    self.entries.len()
                ),
            });
        }

        let mut secrets = HashMap::with_capacity(self.entries.len());
        for (entry, chunk) in self.entries.iter().zip(plaintext.chunks_exact(SECRET_KEY_LEN)) {
            let secret_key = SecretKey::from_bytes(chunk)?;
            if secret_key.public_key() != entry.public_key {
                return Err(DistWalletError::AuthenticationError {
                    reason: "secret key does not correspond to public key".into(),
                });
            }
            secrets.insert(entry.id, secret_key);
        }
        Ok(secrets)
    }
}

// ---------------------------------------------------------------------------
// BatchState
// ---------------------------------------------------------------------------

/// Outcome of the one-time batch fetch.
pub(crate) enum BatchMarker {
    NotAttempted,
    Loaded(Arc<Batch>),
    Failed,
}

/// Per-wallet batch cell shared with every batch-derived account.
///
/// Three locks, never held across one another except as listed:
///
/// - `marker` holds the fetch outcome. Once resolved it is only read, so
///   lookups take a shared lock and return.
/// - `fetch` serializes the one-time fetch and batch construction. The
///   fetch closure runs under it and may take the wallet state lock.
/// - `secrets` holds the decryption memo. It is held across the batch
///   decryption so the ciphertext is opened at most once, and may take a
///   shared `marker` lock.
pub(crate) struct BatchState {
    marker: RwLock<BatchMarker>,
    fetch: Mutex<()>,
    secrets: Mutex<Option<HashMap<Uuid, SecretKey>>>,
}

fn poisoned(e: impl std::fmt::Display) -> DistWalletError {
    DistWalletError::StateError {
        reason: format!("batch lock poisoned: {e}"),
    }
}

impl BatchState {
    pub(crate) fn new() -> Self {
        Self {
            marker: RwLock::new(BatchMarker::NotAttempted),
            fetch: Mutex::new(()),
            secrets: Mutex::new(None),
        }
    }

    /// Returns the marker's outcome, or `None` if no fetch has run yet.
    fn resolved(&self) -> Result<Option<Option<Arc<Batch>>>> {
        let marker = self.marker.read().map_err(poisoned)?;
        Ok(match &*marker {
            BatchMarker::Loaded(batch) => Some(Some(Arc::clone(batch))),
            BatchMarker::Failed => Some(None),
            BatchMarker::NotAttempted => None,
        })
    }

    /// Returns the loaded batch, running `fetch` on first use only.
    ///
    /// A fetch that yields nothing is remembered and never retried.
    /// Concurrent first callers wait for the one running fetch; callers
    /// after it only take the shared marker lock.
    pub(crate) fn get_or_fetch<F>(&self, fetch: F) -> Result<Option<Arc<Batch>>>
    where
        F: FnOnce() -> Option<Arc<Batch>>,
    {
        if let Some(outcome) = self.resolved()? {
            return Ok(outcome);
        }

        let _fetching = self.fetch.lock().map_err(poisoned)?;
        if let Some(outcome) = self.resolved()? {
            return Ok(outcome);
        }
        let fetched = fetch();
        *self.marker.write().map_err(poisoned)? = match &fetched {
            Some(batch) => BatchMarker::Loaded(Arc::clone(batch)),
            None => BatchMarker::Failed,
        };
        Ok(fetched)
    }

    /// Runs `f` while no fetch or other `exclusive` call is in progress.
    /// Lookups against a resolved marker are not blocked.
    pub(crate) fn exclusive<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _fetching = self.fetch.lock().map_err(poisoned)?;
        f()
    }

    /// Returns the secret of batched account `id`, decrypting the whole
    /// batch under `passphrase` if that has not happened yet.
    pub(crate) fn secret_key(
        &self,
        id: Uuid,
        encryptor: &dyn Encryptor,
        passphrase: &[u8],
    ) -> Result<SecretKey> {
        let mut secrets = self.secrets.lock().map_err(poisoned)?;
        if secrets.is_none() {
            let batch = match self.resolved()? {
                Some(Some(batch)) => batch,
                _ => {
                    return Err(DistWalletError::StateError {
                        reason: "no batch to decrypt".into(),
                    })
                }
            };
            let decrypted = batch.decrypt(encryptor, passphrase)?;
            tracing::debug!(entries = decrypted.len(), "decrypted account batch");
            *secrets = Some(decrypted);
        }
        secrets
            .as_ref()
            .and_then(|secrets| secrets.get(&id))
            .cloned()
            .ok_or_else(|| DistWalletError::StateError {
                reason: format!("account {id} is not part of the batch"),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
