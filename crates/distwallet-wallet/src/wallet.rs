//! Distributed wallet: account container, index owner and lock gate.
//!
//! A [`Wallet`] owns no secret of its own. Its lock flag only gates
//! account import; every account carries its own encrypted secret and
//! its own lock state.
//!
//! # Concurrency
//!
//! `Wallet` is `Send + Sync` and meant to be shared behind an `Arc`.
//!
//! - The index and the cache of realized accounts sit behind one
//!   `RwLock` (the primary lock).
//! - The batch fetch marker, the fetch/build lock and the decryption
//!   memo are separate locks shared with batch-derived accounts. Once
//!   the marker is resolved, lookups only take it shared, so decrypting
//!   the batch never blocks lookups. The fetch lock is taken before the
//!   primary lock, never after it.
//! - Each account guards its own secret key.
//!
//! A poisoned lock is reported as [`DistWalletError::StateError`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use distwallet_crypto::encryptor::Encryptor;
use distwallet_crypto::keys::{PublicKey, SecretKey};
use distwallet_store::Store;
use distwallet_types::config::WalletConfig;
use distwallet_types::{DistWalletError, Result};
use serde_json::{json, Value};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::account::Account;
use crate::batch::{Batch, BatchEntry, BatchState};
use crate::index::Index;
use crate::record::{parse_json, to_bytes, validation, Fields};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Wallet type written into every wallet record.
pub const WALLET_TYPE: &str = "distributed";

/// Current wallet record version.
pub const WALLET_VERSION: u32 = 1;

/// Account names may not start with this character.
const RESERVED_PREFIX: char = '_';

// ---------------------------------------------------------------------------
// WalletRecord
// ---------------------------------------------------------------------------

/// Persisted wallet metadata: `{uuid, name, version, type}`.
pub(crate) struct WalletRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) version: u32,
}

impl WalletRecord {
    pub(crate) fn to_value(&self) -> Value {
        json!({
            "uuid": self.id.to_string(),
            "name": self.name,
            "version": self.version,
            "type": WALLET_TYPE,
        })
    }

    /// Parses a wallet record. `type` is checked first, then `uuid`,
    /// `name` and `version`.
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let fields = Fields::new("wallet", value)?;
        let wallet_type = fields.str("type", "type")?;
        if wallet_type != WALLET_TYPE {
            return Err(validation(format!("wallet type \"{wallet_type}\" unexpected")));
        }
        Ok(Self {
            id: fields.uuid("uuid", "ID")?,
            name: fields.str("name", "name")?.to_string(),
            version: fields.u32("version", "version")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

struct WalletState {
    index: Index,
    accounts: HashMap<Uuid, Arc<Account>>,
}

/// Container of threshold-signing accounts backed by a [`Store`].
pub struct Wallet {
    id: Uuid,
    name: String,
    version: u32,
    store: Arc<dyn Store>,
    encryptor: Arc<dyn Encryptor>,
    config: WalletConfig,
    unlocked: AtomicBool,
    state: Arc<RwLock<WalletState>>,
    batch: Arc<BatchState>,
}

impl Wallet {
    fn from_parts(
        record: WalletRecord,
        index: Index,
        store: Arc<dyn Store>,
        encryptor: Arc<dyn Encryptor>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            version: record.version,
            store,
            encryptor,
            config: WalletConfig::default(),
            unlocked: AtomicBool::new(false),
            state: Arc::new(RwLock::new(WalletState {
                index,
                accounts: HashMap::new(),
            })),
            batch: Arc::new(BatchState::new()),
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Creates a new, empty wallet called `name` in `store`.
    ///
    /// The empty index is persisted before the wallet record.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::ConflictError`] if `store` already holds a
    ///   wallet with this name.
    /// - [`DistWalletError::StorageError`] if a write fails.
    pub fn create(name: &str, store: Arc<dyn Store>, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        ensure_wallet_absent(store.as_ref(), name)?;

        let record = WalletRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: WALLET_VERSION,
        };
        let wallet = Self::from_parts(record, Index::new(), store, encryptor);
        wallet.store_index(&Index::new())?;
        wallet
            .store
            .store_wallet(wallet.id, &wallet.name, &wallet.serialize()?)?;

        tracing::info!(wallet = %wallet.name, wallet_id = %wallet.id, store = wallet.store.name(), "created wallet");
        Ok(wallet)
    }

    /// Opens the wallet called `name`.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::CorruptionError`] if the record is missing or
    /// malformed.
    pub fn open(name: &str, store: Arc<dyn Store>, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        let data = store.retrieve_wallet(name).map_err(|e| match e {
            DistWalletError::NotFound { .. } => DistWalletError::CorruptionError {
                reason: format!("wallet \"{name}\" does not exist"),
            },
            other => other,
        })?;
        Self::deserialize(&data, store, encryptor)
    }

    /// Builds a wallet from its record bytes and loads its index.
    ///
    /// A missing or unparsable index is rebuilt from the account records
    /// and persisted again.
    pub fn deserialize(data: &[u8], store: Arc<dyn Store>, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        let record = parse_json(data, "wallet")
            .and_then(|value| WalletRecord::from_value(&value))
            .map_err(|e| e.into_corruption("wallet corrupt"))?;
        let index = load_index(store.as_ref(), &encryptor, record.id)?;

        tracing::debug!(wallet = %record.name, accounts = index.len(), "opened wallet");
        Ok(Self::from_parts(record, index, store, encryptor))
    }

    /// Replaces the default configuration.
    pub fn with_config(mut self, config: WalletConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Encodes the wallet record.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        to_bytes(&self.record().to_value(), "wallet")
    }

    pub(crate) fn record(&self) -> WalletRecord {
        WalletRecord {
            id: self.id,
            name: self.name.clone(),
            version: self.version,
        }
    }

    // -- Accessors --------------------------------------------------------

    /// Returns the wallet ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the wallet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wallet record version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Always `"distributed"`.
    pub fn wallet_type(&self) -> &'static str {
        WALLET_TYPE
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn encryptor(&self) -> &Arc<dyn Encryptor> {
        &self.encryptor
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    // -- Lock state -------------------------------------------------------

    /// Returns `true` if accounts may be imported.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    /// Forbids account import.
    pub fn lock(&self) {
        self.unlocked.store(false, Ordering::SeqCst);
    }

    /// Allows account import. The wallet holds no secret, so the
    /// passphrase is not checked.
    pub fn unlock(&self, _passphrase: &[u8]) -> Result<()> {
        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    // -- Accounts ---------------------------------------------------------

    /// Imports a threshold account produced by an external key
    /// generation ceremony.
    ///
    /// # Validation order
    ///
    /// 1. `name` non-empty.
    /// 2. `name` does not start with `_`.
    /// 3. `secret_key` non-empty.
    /// 4. `verification_vector` non-empty.
    /// 5. `participants` non-empty.
    /// 6. `signing_threshold > participants / 2`.
    /// 7. `verification_vector.len() == signing_threshold`.
    /// 8. Wallet unlocked.
    /// 9. No account called `name` yet.
    ///
    /// The index entry is added before the account record is written and
    /// removed again if that write fails. Once the account record is
    /// written the import succeeds: a failed index write is logged and
    /// the persisted index catches up at the next successful import,
    /// which rewrites it whole.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::ValidationError`] for steps 1–7 and for an
    ///   unparsable verification vector entry.
    /// - [`DistWalletError::StateError`] if the wallet is locked.
    /// - [`DistWalletError::ConflictError`] if the name is taken.
    /// - [`DistWalletError::CryptoError`] if `secret_key` does not parse.
    pub fn import_account(
        &self,
        name: &str,
        secret_key: &[u8],
        signing_threshold: u32,
        verification_vector: &[Vec<u8>],
        participants: &BTreeMap<u64, String>,
        passphrase: &[u8],
    ) -> Result<Arc<Account>> {
        if name.is_empty() {
            return Err(validation("account name missing"));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(validation(format!("invalid account name \"{name}\"")));
        }
        if secret_key.is_empty() {
            return Err(validation("private key missing"));
        }
        if verification_vector.is_empty() {
            return Err(validation("verification vector missing"));
        }
        if participants.is_empty() {
            return Err(validation("participants missing"));
        }
        if signing_threshold as usize <= participants.len() / 2 {
            return Err(validation("invalid signing threshold:participant ratio"));
        }
        if verification_vector.len() != signing_threshold as usize {
            return Err(validation("verification vector invalid"));
        }
        if !self.is_unlocked() {
            return Err(DistWalletError::StateError {
                reason: "wallet must be unlocked to create accounts".into(),
            });
        }
        if self.read_state()?.index.id(name).is_some() {
            return Err(account_exists(name));
        }

        let secret = SecretKey::from_bytes(secret_key)?;
        let verification_vector = verification_vector
            .iter()
            .enumerate()
            .map(|(i, key)| {
                PublicKey::from_bytes(key)
                    .map_err(|_| validation(format!("invalid verification vector entry {i}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let crypto = self.encryptor.encrypt(secret.to_bytes().as_slice(), passphrase)?;

        let account = Arc::new(Account::imported(
            Uuid::new_v4(),
            name.to_string(),
            secret.public_key(),
            verification_vector,
            signing_threshold,
            participants.clone(),
            crypto,
            Arc::clone(&self.encryptor),
        ));
        self.register(&account)?;

        tracing::info!(wallet = %self.name, account = %name, account_id = %account.id(), "imported account");
        Ok(account)
    }

    /// Adds `account` to the index and persists it as one step.
    fn register(&self, account: &Arc<Account>) -> Result<()> {
        let record = account.serialize()?;
        let mut state = self.write_state()?;

        // Re-checked under the write lock: two imports of one name race here.
        if state.index.id(account.name()).is_some() {
            return Err(account_exists(account.name()));
        }
        state.index.add(account.id(), account.name());
        if let Err(e) = self.store.store_account(self.id, account.id(), &record) {
            state.index.remove(account.id());
            tracing::warn!(wallet = %self.name, account = %account.name(), error = %e, "account write failed; index rolled back");
            return Err(e);
        }
        state.accounts.insert(account.id(), Arc::clone(account));
        if let Err(e) = self.store_index(&state.index) {
            tracing::warn!(wallet = %self.name, account = %account.name(), error = %e, "account stored but index write failed");
        }
        Ok(())
    }

    /// Streams every account of the wallet.
    ///
    /// When a non-empty batch is loaded the cached accounts are served,
    /// followed by any indexed account the batch does not cover.
    /// Otherwise every record is read from the store; records that do
    /// not parse are skipped. Accounts already cached are yielded as the
    /// cached instance.
    ///
    /// The accounts are produced by a worker thread into a bounded queue
    /// of [`WalletConfig::account_queue_capacity`] entries. Dropping the
    /// iterator early stops the worker at its next send.
    pub fn accounts(&self) -> Result<AccountIter> {
        let batch = self.ensure_batch()?;
        let source = match batch {
            Some(batch) if !batch.entries.is_empty() => {
                let state = self.read_state()?;
                let cached = state.accounts.values().cloned().collect();
                let missing = state
                    .index
                    .iter()
                    .map(|(id, _)| id)
                    .filter(|id| !state.accounts.contains_key(id))
                    .collect();
                Source::Cache { cached, missing }
            }
            _ => Source::Store,
        };

        let (tx, rx) = mpsc::sync_channel(self.config.account_queue_capacity);
        let worker = Worker {
            wallet_id: self.id,
            store: Arc::clone(&self.store),
            encryptor: Arc::clone(&self.encryptor),
            state: Arc::clone(&self.state),
        };
        thread::Builder::new()
            .name("distwallet-accounts".into())
            .spawn(move || worker.run(source, tx))
            .map_err(|e| DistWalletError::StateError {
                reason: format!("failed to spawn account worker: {e}"),
            })?;
        Ok(AccountIter { rx })
    }

    /// Looks up an account by name through the index.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::NotFound`] if no account has this name.
    pub fn account_by_name(&self, name: &str) -> Result<Arc<Account>> {
        self.ensure_batch()?;
        let id = self
            .read_state()?
            .index
            .id(name)
            .ok_or_else(|| DistWalletError::NotFound {
                reason: format!("no account with name \"{name}\""),
            })?;
        self.account_by_id(id)
    }

    /// Looks up an account by ID.
    ///
    /// Cached accounts, including those materialized from a batch, are
    /// returned directly; otherwise the record is fetched and cached.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::NotFound`] if the store has no such account.
    /// - [`DistWalletError::CorruptionError`] if its record is malformed.
    pub fn account_by_id(&self, id: Uuid) -> Result<Arc<Account>> {
        self.ensure_batch()?;
        if let Some(account) = self.read_state()?.accounts.get(&id) {
            return Ok(Arc::clone(account));
        }

        let data = self.store.retrieve_account(self.id, id).map_err(|e| match e {
            DistWalletError::NotFound { .. } => DistWalletError::NotFound {
                reason: format!("no account with ID {id}"),
            },
            other => other,
        })?;
        let account = Account::deserialize(&data, Arc::clone(&self.encryptor))
            .map_err(|e| e.into_corruption(&format!("account {id} corrupt")))?;

        let mut state = self.write_state()?;
        let cached = state
            .accounts
            .entry(id)
            .or_insert_with(|| Arc::new(account));
        tracing::debug!(wallet = %self.name, account_id = %id, "cached account");
        Ok(Arc::clone(cached))
    }

    // -- Batches ----------------------------------------------------------

    /// Encrypts the secrets of every stored account into one batch
    /// record under `batch_passphrase`.
    ///
    /// Each account is unlocked with the first of `candidate_passphrases`
    /// that works. Nothing is persisted unless every account unlocks.
    /// The batch is picked up by wallets opened after this call.
    ///
    /// # Errors
    ///
    /// - [`DistWalletError::StateError`] if the store cannot hold batches.
    /// - [`DistWalletError::AuthenticationError`] naming the first
    ///   account no candidate passphrase unlocks.
    pub fn build_batch<P: AsRef<[u8]>>(
        &self,
        candidate_passphrases: &[P],
        batch_passphrase: &[u8],
    ) -> Result<()> {
        let batch_store = self.store.as_batch_store().ok_or_else(|| DistWalletError::StateError {
            reason: format!("store {} cannot store batches", self.store.name()),
        })?;

        self.batch.exclusive(|| {
            let mut entries = Vec::new();
            let mut secrets = Zeroizing::new(Vec::new());

            for record in self.store.retrieve_accounts(self.id) {
                let account = match Account::deserialize(&record?, Arc::clone(&self.encryptor)) {
                    Ok(account) => account,
                    Err(e) => {
                        tracing::warn!(wallet = %self.name, error = %e, "skipping unparsable account record");
                        continue;
                    }
                };
                let unlocked = candidate_passphrases
                    .iter()
                    .any(|passphrase| account.unlock(passphrase.as_ref()).is_ok());
                if !unlocked {
                    return Err(DistWalletError::AuthenticationError {
                        reason: format!(
                            "unable to decrypt account \"{}\" with supplied passphrases",
                            account.name()
                        ),
                    });
                }

                secrets.extend_from_slice(account.private_key()?.to_bytes().as_slice());
                entries.push(BatchEntry {
                    id: account.id(),
                    name: account.name().to_string(),
                    verification_vector: account.verification_vector().to_vec(),
                    signing_threshold: account.signing_threshold(),
                    participants: account.participants().clone(),
                    public_key: *account.public_key(),
                });
                account.lock();
            }

            let batch = Batch {
                crypto: self.encryptor.encrypt(&secrets, batch_passphrase)?,
                entries,
            };
            batch_store.store_batch(self.id, &self.name, &batch.serialize(self.encryptor.name())?)?;

            tracing::info!(wallet = %self.name, entries = batch.entries.len(), "stored account batch");
            Ok(())
        })
    }

    /// Loads the batch on first use and materializes its accounts.
    fn ensure_batch(&self) -> Result<Option<Arc<Batch>>> {
        self.batch.get_or_fetch(|| self.fetch_batch())
    }

    fn fetch_batch(&self) -> Option<Arc<Batch>> {
        let batch_store = self.store.as_batch_store()?;
        let data = match batch_store.retrieve_batch(self.id) {
            Ok(data) => data,
            Err(DistWalletError::NotFound { .. }) => {
                tracing::debug!(wallet = %self.name, "no account batch stored");
                return None;
            }
            Err(e) => {
                tracing::warn!(wallet = %self.name, error = %e, "failed to retrieve account batch");
                return None;
            }
        };
        let batch = match Batch::deserialize(&data, self.encryptor.name()) {
            Ok(batch) => Arc::new(batch),
            Err(e) => {
                let e = e.into_corruption("batch corrupt");
                tracing::warn!(wallet = %self.name, error = %e, "ignoring account batch");
                return None;
            }
        };

        let mut state = match self.write_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(wallet = %self.name, error = %e, "cannot cache batched accounts");
                return None;
            }
        };
        for entry in &batch.entries {
            state.accounts.entry(entry.id).or_insert_with(|| {
                Arc::new(Account::from_batch_entry(
                    entry,
                    Arc::clone(&self.encryptor),
                    Arc::clone(&self.batch),
                ))
            });
        }
        tracing::debug!(wallet = %self.name, entries = batch.entries.len(), "materialized account batch");
        Some(batch)
    }

    // -- Internal ---------------------------------------------------------

    fn store_index(&self, index: &Index) -> Result<()> {
        self.store.store_accounts_index(self.id, &index.serialize()?)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, WalletState>> {
        self.state.read().map_err(|e| DistWalletError::StateError {
            reason: format!("wallet lock poisoned: {e}"),
        })
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, WalletState>> {
        self.state.write().map_err(|e| DistWalletError::StateError {
            reason: format!("wallet lock poisoned: {e}"),
        })
    }
}

/// Fails with a conflict if `store` already holds a wallet called `name`.
pub(crate) fn ensure_wallet_absent(store: &dyn Store, name: &str) -> Result<()> {
    match store.retrieve_wallet(name) {
        Ok(_) => Err(DistWalletError::ConflictError {
            reason: format!("wallet \"{name}\" already exists"),
        }),
        Err(DistWalletError::NotFound { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

fn account_exists(name: &str) -> DistWalletError {
    DistWalletError::ConflictError {
        reason: format!("account with name \"{name}\" already exists"),
    }
}

/// Loads the persisted index, rebuilding it from the account records if
/// it is missing or unparsable.
fn load_index(store: &dyn Store, encryptor: &Arc<dyn Encryptor>, wallet_id: Uuid) -> Result<Index> {
    match store.retrieve_accounts_index(wallet_id) {
        Ok(data) => match Index::deserialize(&data) {
            Ok(index) => return Ok(index),
            Err(e) => tracing::warn!(wallet_id = %wallet_id, error = %e, "account index unparsable; rebuilding"),
        },
        Err(DistWalletError::NotFound { .. }) => {
            tracing::debug!(wallet_id = %wallet_id, "account index missing; rebuilding");
        }
        Err(e) => return Err(e),
    }

    let mut index = Index::new();
    for record in store.retrieve_accounts(wallet_id) {
        match Account::deserialize(&record?, Arc::clone(encryptor)) {
            Ok(account) => index.add(account.id(), account.name()),
            Err(e) => tracing::warn!(wallet_id = %wallet_id, error = %e, "skipping unparsable account record"),
        }
    }
    store.store_accounts_index(wallet_id, &index.serialize()?)?;

    tracing::info!(wallet_id = %wallet_id, accounts = index.len(), "rebuilt account index");
    Ok(index)
}

// ---------------------------------------------------------------------------
// Account enumeration
// ---------------------------------------------------------------------------

/// Iterator over the accounts of a wallet, fed by a worker thread.
pub struct AccountIter {
    rx: Receiver<Arc<Account>>,
}

impl Iterator for AccountIter {
    type Item = Arc<Account>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

enum Source {
    Cache {
        cached: Vec<Arc<Account>>,
        missing: Vec<Uuid>,
    },
    Store,
}

struct Worker {
    wallet_id: Uuid,
    store: Arc<dyn Store>,
    encryptor: Arc<dyn Encryptor>,
    state: Arc<RwLock<WalletState>>,
}

impl Worker {
    fn run(self, source: Source, tx: SyncSender<Arc<Account>>) {
        match source {
            Source::Cache { cached, missing } => {
                for account in cached {
                    if tx.send(account).is_err() {
                        return;
                    }
                }
                for id in missing {
                    let parsed = self
                        .store
                        .retrieve_account(self.wallet_id, id)
                        .and_then(|data| Account::deserialize(&data, Arc::clone(&self.encryptor)));
                    match parsed {
                        Ok(account) => {
                            if tx.send(self.prefer_cached(account)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!(account_id = %id, error = %e, "skipping indexed account"),
                    }
                }
            }
            Source::Store => {
                for record in self.store.retrieve_accounts(self.wallet_id) {
                    let parsed = record
                        .and_then(|data| Account::deserialize(&data, Arc::clone(&self.encryptor)));
                    match parsed {
                        Ok(account) => {
                            if tx.send(self.prefer_cached(account)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!(wallet_id = %self.wallet_id, error = %e, "skipping unparsable account record"),
                    }
                }
            }
        }
    }

    fn prefer_cached(&self, account: Account) -> Arc<Account> {
        let cached = self
            .state
            .read()
            .ok()
            .and_then(|state| state.accounts.get(&account.id()).cloned());
        cached.unwrap_or_else(|| Arc::new(account))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use distwallet_crypto::encryptor::KeystoreEncryptor;
    use distwallet_store::MemoryStore;
    use distwallet_types::config::EncryptorConfig;

    fn setup() -> std::result::Result<(Arc<dyn Store>, Arc<dyn Encryptor>), DistWalletError> {
        let encryptor = KeystoreEncryptor::new(EncryptorConfig {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        })?;
        Ok((Arc::new(MemoryStore::new()), Arc::new(encryptor)))
    }

    fn participants(n: u64) -> BTreeMap<u64, String> {
        (1..=n).map(|id| (id, format!("host-{id}:13000"))).collect()
    }

    fn vector(t: u8) -> std::result::Result<Vec<Vec<u8>>, DistWalletError> {
        (0..t)
            .map(|i| Ok(SecretKey::from_bytes(&[0x70 + i; 32])?.public_key().as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn wallet_record_shape() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        let value: Value = serde_json::from_slice(&wallet.serialize()?)?;
        assert_eq!(value["type"], "distributed");
        assert_eq!(value["name"], "w");
        assert_eq!(value["version"], 1);
        assert_eq!(value["uuid"], wallet.id().to_string());
        Ok(())
    }

    #[test]
    fn wallet_record_field_errors() {
        let cases = [
            (json!({}), "wallet type missing"),
            (json!({"type": 1}), "wallet type invalid"),
            (json!({"type": "hd"}), "wallet type \"hd\" unexpected"),
            (json!({"type": "distributed"}), "wallet ID missing"),
            (json!({"type": "distributed", "uuid": "x"}), "wallet ID invalid"),
            (
                json!({"type": "distributed", "uuid": Uuid::new_v4().to_string()}),
                "wallet name missing",
            ),
            (
                json!({"type": "distributed", "uuid": Uuid::new_v4().to_string(), "name": "w"}),
                "wallet version missing",
            ),
        ];
        for (value, expected) in cases {
            let err = WalletRecord::from_value(&value).err();
            assert!(
                err.as_ref().is_some_and(|e| e.reason() == expected),
                "{value}: {err:?}"
            );
        }
    }

    #[test]
    fn deserialize_reports_corruption() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let err = Wallet::deserialize(br#"{"type":"distributed"}"#, store, encryptor).err();
        assert!(matches!(err, Some(DistWalletError::CorruptionError { .. })));
        assert!(err.is_some_and(|e| e.reason().contains("wallet ID missing")));
        Ok(())
    }

    #[test]
    fn lock_gates_import() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        assert_eq!(wallet.wallet_type(), "distributed");
        assert!(!wallet.is_unlocked());

        let err = wallet
            .import_account("a", &[1; 32], 2, &vector(2)?, &participants(3), b"pw")
            .err();
        assert!(err.is_some_and(|e| e.reason() == "wallet must be unlocked to create accounts"));

        wallet.unlock(b"anything")?;
        wallet.import_account("a", &[1; 32], 2, &vector(2)?, &participants(3), b"pw")?;
        wallet.lock();
        assert!(!wallet.is_unlocked());
        Ok(())
    }

    #[test]
    fn import_validation_order() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        let vv = vector(2)?;
        let ps = participants(3);
        let empty = BTreeMap::new();

        let cases: [(&str, &[u8], u32, &[Vec<u8>], &BTreeMap<u64, String>, &str); 8] = [
            ("", &[], 0, &[], &empty, "account name missing"),
            ("_x", &[], 0, &[], &empty, "invalid account name \"_x\""),
            ("a", &[], 0, &[], &empty, "private key missing"),
            ("a", &[1; 32], 0, &[], &empty, "verification vector missing"),
            ("a", &[1; 32], 0, &vv, &empty, "participants missing"),
            ("a", &[1; 32], 1, &vv, &ps, "invalid signing threshold:participant ratio"),
            ("a", &[1; 32], 3, &vv, &ps, "verification vector invalid"),
            ("a", &[1; 32], 2, &vv, &ps, "wallet must be unlocked to create accounts"),
        ];
        for (name, secret, t, vv, ps, expected) in cases {
            let err = wallet.import_account(name, secret, t, vv, ps, b"pw").err();
            assert!(
                err.as_ref().is_some_and(|e| e.reason() == expected),
                "expected {expected}: {err:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn bad_verification_vector_entry_is_named() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        wallet.unlock(b"")?;
        let mut vv = vector(2)?;
        vv[1] = vec![0u8; 5];
        let err = wallet
            .import_account("a", &[1; 32], 2, &vv, &participants(3), b"pw")
            .err();
        assert!(err.is_some_and(|e| e.reason() == "invalid verification vector entry 1"));
        Ok(())
    }

    #[test]
    fn duplicate_account_name_conflicts() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        wallet.unlock(b"")?;
        wallet.import_account("a", &[1; 32], 2, &vector(2)?, &participants(3), b"pw")?;
        let err = wallet
            .import_account("a", &[2; 32], 2, &vector(2)?, &participants(3), b"pw")
            .err();
        assert!(matches!(err, Some(DistWalletError::ConflictError { .. })));
        assert!(err.is_some_and(|e| e.reason() == "account with name \"a\" already exists"));
        Ok(())
    }

    #[test]
    fn lookups_hit_the_cache() -> std::result::Result<(), DistWalletError> {
        let (store, encryptor) = setup()?;
        let wallet = Wallet::create("w", store, encryptor)?;
        wallet.unlock(b"")?;
        let account = wallet.import_account("a", &[1; 32], 2, &vector(2)?, &participants(3), b"pw")?;

        let by_name = wallet.account_by_name("a")?;
        let by_id = wallet.account_by_id(account.id())?;
        assert!(Arc::ptr_eq(&account, &by_name));
        assert!(Arc::ptr_eq(&account, &by_id));

        let err = wallet.account_by_name("b").err();
        assert!(err.is_some_and(|e| e.reason() == "no account with name \"b\""));
        let missing = Uuid::new_v4();
        let err = wallet.account_by_id(missing).err();
        assert!(err.is_some_and(|e| e.reason() == format!("no account with ID {missing}")));
        Ok(())
    }
}
