//! On-disk store backed by sled.
//!
//! # Trees
//!
//! - `wallets`: wallet name → wallet record
//! - `accounts`: wallet id (16B) ‖ account id (16B) → account record
//! - `indexes`: wallet id → account index record
//! - `batches`: wallet id → batch record
//!
//! Account keys share the wallet id as a prefix, so one wallet's
//! records are enumerated with a lazy `scan_prefix`.

use std::path::Path;

use distwallet_types::{DistWalletError, Result};
use uuid::Uuid;

use crate::{BatchStore, RecordIter, Store};

const TREE_WALLETS: &str = "wallets";
const TREE_ACCOUNTS: &str = "accounts";
const TREE_INDEXES: &str = "indexes";
const TREE_BATCHES: &str = "batches";

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Batch-capable store persisting every record in a sled database.
pub struct SledStore {
    db: sled::Db,
    wallets: sled::Tree,
    accounts: sled::Tree,
    indexes: sled::Tree,
    batches: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DistWalletError::StorageError`] if the database or any
    /// of its trees cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| DistWalletError::StorageError {
            reason: format!("failed to open sled database: {e}"),
        })?;
        let open_tree = |name: &str| {
            db.open_tree(name).map_err(|e| DistWalletError::StorageError {
                reason: format!("failed to open tree '{name}': {e}"),
            })
        };
        let wallets = open_tree(TREE_WALLETS)?;
        let accounts = open_tree(TREE_ACCOUNTS)?;
        let indexes = open_tree(TREE_INDEXES)?;
        let batches = open_tree(TREE_BATCHES)?;

        tracing::debug!(path = %path.display(), "opened sled store");
        Ok(Self {
            db,
            wallets,
            accounts,
            indexes,
            batches,
        })
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| DistWalletError::StorageError {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }
}

fn account_key(wallet_id: Uuid, account_id: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(wallet_id.as_bytes());
    key[16..].copy_from_slice(account_id.as_bytes());
    key
}

fn get(tree: &sled::Tree, key: &[u8], missing: impl FnOnce() -> String) -> Result<Vec<u8>> {
    let value = tree.get(key).map_err(|e| DistWalletError::StorageError {
        reason: format!("sled get failed: {e}"),
    })?;
    value
        .map(|v| v.to_vec())
        .ok_or_else(|| DistWalletError::NotFound { reason: missing() })
}

fn insert(tree: &sled::Tree, key: &[u8], data: &[u8]) -> Result<()> {
    tree.insert(key, data)
        .map_err(|e| DistWalletError::StorageError {
            reason: format!("sled insert failed: {e}"),
        })?;
    Ok(())
}

impl Store for SledStore {
    fn name(&self) -> &str {
        "sled"
    }

    fn retrieve_wallet(&self, name: &str) -> Result<Vec<u8>> {
        get(&self.wallets, name.as_bytes(), || {
            format!("wallet \"{name}\" not found")
        })
    }

    fn store_wallet(&self, wallet_id: Uuid, name: &str, data: &[u8]) -> Result<()> {
        insert(&self.wallets, name.as_bytes(), data)?;
        tracing::debug!(wallet_id = %wallet_id, name, "stored wallet record");
        Ok(())
    }

    fn retrieve_account(&self, wallet_id: Uuid, account_id: Uuid) -> Result<Vec<u8>> {
        get(&self.accounts, &account_key(wallet_id, account_id), || {
            format!("account {account_id} not found")
        })
    }

    fn store_account(&self, wallet_id: Uuid, account_id: Uuid, data: &[u8]) -> Result<()> {
        insert(&self.accounts, &account_key(wallet_id, account_id), data)
    }

    fn retrieve_accounts(&self, wallet_id: Uuid) -> RecordIter<'_> {
        Box::new(
            self.accounts
                .scan_prefix(wallet_id.as_bytes())
                .map(|item| {
                    item.map(|(_, value)| value.to_vec())
                        .map_err(|e| DistWalletError::StorageError {
                            reason: format!("sled scan_prefix failed: {e}"),
                        })
                }),
        )
    }

    fn retrieve_accounts_index(&self, wallet_id: Uuid) -> Result<Vec<u8>> {
        get(&self.indexes, wallet_id.as_bytes(), || {
            format!("no account index for wallet {wallet_id}")
        })
    }

    fn store_accounts_index(&self, wallet_id: Uuid, data: &[u8]) -> Result<()> {
        insert(&self.indexes, wallet_id.as_bytes(), data)
    }

    fn as_batch_store(&self) -> Option<&dyn BatchStore> {
        Some(self)
    }
}

impl BatchStore for SledStore {
    fn retrieve_batch(&self, wallet_id: Uuid) -> Result<Vec<u8>> {
        get(&self.batches, wallet_id.as_bytes(), || {
            format!("no batch for wallet {wallet_id}")
        })
    }

    fn store_batch(&self, wallet_id: Uuid, name: &str, data: &[u8]) -> Result<()> {
        insert(&self.batches, wallet_id.as_bytes(), data)?;
        tracing::debug!(wallet_id = %wallet_id, name, bytes = data.len(), "stored batch record");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
