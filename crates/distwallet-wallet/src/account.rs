//! Threshold-signing accounts.
//!
//! An [`Account`] holds this node's share of a key produced by an
//! external multi-party protocol. The secret share is kept encrypted in
//! the account record and only lives in memory between
//! [`unlock`](Account::unlock) and [`lock`](Account::lock).
//!
//! Accounts materialized from a batch carry no ciphertext of their own;
//! they unlock through the batch shared with their wallet.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use distwallet_crypto::encryptor::Encryptor;
use distwallet_crypto::keys::{PublicKey, SecretKey, Signature};
use distwallet_types::{DistWalletError, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::batch::{BatchEntry, BatchState};
use crate::record::{parse_json, to_bytes, validation, Fields};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One threshold-signing identity.
///
/// # Invariants
///
/// - While unlocked, the held secret key derives exactly `public_key`.
/// - `crypto` is `None` only for accounts materialized from a batch.
pub struct Account {
    id: Uuid,
    name: String,
    public_key: PublicKey,
    verification_vector: Vec<PublicKey>,
    signing_threshold: u32,
    participants: BTreeMap<u64, String>,
    crypto: Option<Value>,
    version: u32,
    encryptor: Arc<dyn Encryptor>,
    batch: Option<Arc<BatchState>>,
    secret_key: RwLock<Option<SecretKey>>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("public_key", &self.public_key)
            .field("signing_threshold", &self.signing_threshold)
            .field("unlocked", &self.is_unlocked())
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Builds a freshly imported account. The caller has already
    /// validated every field.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn imported(
        id: Uuid,
        name: String,
        public_key: PublicKey,
        verification_vector: Vec<PublicKey>,
        signing_threshold: u32,
        participants: BTreeMap<u64, String>,
        crypto: Value,
        encryptor: Arc<dyn Encryptor>,
    ) -> Self {
        Self {
            id,
            name,
            public_key,
            verification_vector,
            signing_threshold,
            participants,
            crypto: Some(crypto),
            version: encryptor.version(),
            encryptor,
            batch: None,
            secret_key: RwLock::new(None),
        }
    }

    /// Builds a locked account from a batch entry.
    pub(crate) fn from_batch_entry(
        entry: &BatchEntry,
        encryptor: Arc<dyn Encryptor>,
        batch: Arc<BatchState>,
    ) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            public_key: entry.public_key,
            verification_vector: entry.verification_vector.clone(),
            signing_threshold: entry.signing_threshold,
            participants: entry.participants.clone(),
            crypto: None,
            version: encryptor.version(),
            encryptor,
            batch: Some(batch),
            secret_key: RwLock::new(None),
        }
    }

    // -- Accessors --------------------------------------------------------

    /// Returns the account ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns this node's public key share.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the first verification vector entry.
    ///
    /// In a Feldman-style key generation this entry commits to the shared
    /// secret and is the group public key. The wallet does not check how
    /// the vector was produced; for arbitrary Ed25519 shares it is just the
    /// first participant's verification key.
    pub fn composite_public_key(&self) -> Option<&PublicKey> {
        self.verification_vector.first()
    }

    /// Returns the verification vector.
    pub fn verification_vector(&self) -> &[PublicKey] {
        &self.verification_vector
    }

    /// Returns the number of participants needed to sign.
    pub fn signing_threshold(&self) -> u32 {
        self.signing_threshold
    }

    /// Returns the participants keyed by participant ID.
    pub fn participants(&self) -> &BTreeMap<u64, String> {
        &self.participants
    }

    /// Returns the encryptor format version of the stored secret.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Distributed accounts are not derived, so the path is always empty.
    pub fn path(&self) -> &str {
        ""
    }

    /// Returns `true` while the secret key is held in memory.
    pub fn is_unlocked(&self) -> bool {
        self.secret_key
            .read()
            .map(|secret| secret.is_some())
            .unwrap_or(false)
    }

    // -- Lock state -------------------------------------------------------

    /// Drops the in-memory secret key.
    pub fn lock(&self) {
        match self.secret_key.write() {
            Ok(mut secret) => *secret = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Decrypts the secret key with `passphrase` and keeps it in memory.
    ///
    /// Succeeds immediately if the account is already unlocked, without
    /// looking at `passphrase`.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::AuthenticationError`] with `incorrect
    ///   passphrase` if decryption fails, or `secret key does not
    ///   correspond to public key` if the decrypted key is not this
    ///   account's.
    pub fn unlock(&self, passphrase: &[u8]) -> Result<()> {
        let mut secret = self.write_secret()?;
        if secret.is_some() {
            return Ok(());
        }

        let secret_key = match (&self.crypto, &self.batch) {
            (Some(crypto), _) => {
                let plaintext = self.encryptor.decrypt(crypto, passphrase).map_err(|_| {
                    DistWalletError::AuthenticationError {
                        reason: "incorrect passphrase".into(),
                    }
                })?;
                SecretKey::from_bytes(&plaintext)?
            }
            (None, Some(batch)) => batch.secret_key(self.id, self.encryptor.as_ref(), passphrase)?,
            (None, None) => {
                return Err(DistWalletError::StateError {
                    reason: format!("account \"{}\" has no encrypted secret", self.name),
                })
            }
        };

        if secret_key.public_key() != self.public_key {
            return Err(DistWalletError::AuthenticationError {
                reason: "secret key does not correspond to public key".into(),
            });
        }
        *secret = Some(secret_key);
        Ok(())
    }

    /// Signs `message` with the secret key share.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::StateError`] if the account is locked.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let secret = self.read_secret()?;
        let secret_key = secret.as_ref().ok_or_else(|| DistWalletError::StateError {
            reason: "cannot sign when account is locked".into(),
        })?;
        Ok(secret_key.sign(message))
    }

    /// Returns a copy of the secret key share.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::StateError`] if the account is locked.
    pub fn private_key(&self) -> Result<SecretKey> {
        let secret = self.read_secret()?;
        secret.clone().ok_or_else(|| DistWalletError::StateError {
            reason: "cannot provide private key when account is locked".into(),
        })
    }

    fn read_secret(&self) -> Result<RwLockReadGuard<'_, Option<SecretKey>>> {
        self.secret_key.read().map_err(|e| DistWalletError::StateError {
            reason: format!("account lock poisoned: {e}"),
        })
    }

    fn write_secret(&self) -> Result<RwLockWriteGuard<'_, Option<SecretKey>>> {
        self.secret_key.write().map_err(|e| DistWalletError::StateError {
            reason: format!("account lock poisoned: {e}"),
        })
    }

    // -- Records ----------------------------------------------------------

    /// Builds the JSON account record.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::StateError`] for batch-derived accounts, which
    /// have no individual ciphertext to persist.
    pub fn to_record(&self) -> Result<Value> {
        let crypto = self.crypto.as_ref().ok_or_else(|| DistWalletError::StateError {
            reason: format!("account \"{}\" has no individual record", self.name),
        })?;
        let participants: Map<String, Value> = self
            .participants
            .iter()
            .map(|(id, address)| (id.to_string(), Value::String(address.clone())))
            .collect();
        Ok(json!({
            "uuid": self.id.to_string(),
            "name": self.name,
            "pubkey": self.public_key.to_hex(),
            "verificationvector": self
                .verification_vector
                .iter()
                .map(PublicKey::to_hex)
                .collect::<Vec<_>>(),
            "signing_threshold": self.signing_threshold,
            "participants": participants,
            "crypto": crypto,
            "encryptor": self.encryptor.name(),
            "version": self.version,
        }))
    }

    /// Encodes the account record.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        to_bytes(&self.to_record()?, "account")
    }

    /// Decodes an account record.
    pub fn deserialize(data: &[u8], encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        Self::from_record(&parse_json(data, "account")?, encryptor)
    }

    /// Parses an account record field by field.
    ///
    /// Fields are checked in the order `uuid`, `name`, `pubkey`,
    /// `verificationvector`, `participants`, `signing_threshold`,
    /// `crypto`, `encryptor`, `version`; the first bad field is reported
    /// as a [`DistWalletError::ValidationError`].
    pub fn from_record(value: &Value, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        let fields = Fields::new("account", value)?;

        let id = fields.uuid("uuid", "ID")?;
        let name = fields.str("name", "name")?.to_string();
        let public_key = fields.public_key("pubkey", "pubkey")?;

        let verification_vector = fields
            .array("verificationvector", "verificationvector")?
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .as_str()
                    .and_then(|key| PublicKey::from_hex(key).ok())
                    .ok_or_else(|| validation(format!("account verificationvector entry {i} invalid")))
            })
            .collect::<Result<Vec<_>>>()?;

        if fields.get("participants").is_none() {
            return Err(validation("participants missing"));
        }
        let participants = fields
            .object("participants", "participants")?
            .iter()
            .map(|(id, address)| -> Result<(u64, String)> {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| fields.invalid("participant ID"))?;
                let address = address
                    .as_str()
                    .ok_or_else(|| fields.invalid("participant value"))?;
                Ok((id, address.to_string()))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let signing_threshold = fields.u32("signing_threshold", "signing threshold")?;
        if signing_threshold as usize <= participants.len() / 2 {
            return Err(validation("account signing threshold too low"));
        }

        let crypto = fields.object("crypto", "crypto")?;
        let encryptor_name = fields.str("encryptor", "encryptor")?;
        if encryptor_name != encryptor.name() {
            return Err(validation(format!("unsupported encryptor \"{encryptor_name}\"")));
        }
        let version = fields.u32("version", "version")?;
        if version != encryptor.version() {
            return Err(validation("unsupported keystore version"));
        }

        Ok(Self {
            id,
            name,
            public_key,
            verification_vector,
            signing_threshold,
            participants,
            crypto: Some(Value::Object(crypto.clone())),
            version,
            encryptor,
            batch: None,
            secret_key: RwLock::new(None),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
