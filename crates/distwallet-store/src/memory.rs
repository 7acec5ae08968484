//! In-process store backed by hash maps.
//!
//! # Thread Safety
//!
//! All maps live behind one `std::sync::Mutex`. A poisoned lock is
//! reported as a storage error rather than a panic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use distwallet_types::{DistWalletError, Result};
use uuid::Uuid;

use crate::{BatchStore, RecordIter, Store};

#[derive(Default)]
struct Maps {
    wallets: HashMap<String, Vec<u8>>,
    accounts: HashMap<Uuid, HashMap<Uuid, Vec<u8>>>,
    indexes: HashMap<Uuid, Vec<u8>>,
    batches: HashMap<Uuid, Vec<u8>>,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Scratch store holding every record in memory.
///
/// Batch-capable unless built with [`MemoryStore::without_batches`].
pub struct MemoryStore {
    inner: Mutex<Maps>,
    batches_enabled: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty, batch-capable store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Maps::default()),
            batches_enabled: true,
        }
    }

    /// Creates an empty store that does not offer the batch extension.
    pub fn without_batches() -> Self {
        Self {
            inner: Mutex::new(Maps::default()),
            batches_enabled: false,
        }
    }

    /// Drops the persisted index of `wallet_id`, if any.
    ///
    /// Returns `true` if an index was present.
    pub fn remove_accounts_index(&self, wallet_id: Uuid) -> Result<bool> {
        let mut maps = self.lock_maps()?;
        Ok(maps.indexes.remove(&wallet_id).is_some())
    }

    fn lock_maps(&self) -> Result<MutexGuard<'_, Maps>> {
        self.inner.lock().map_err(|e| DistWalletError::StorageError {
            reason: format!("memory store lock poisoned: {e}"),
        })
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn retrieve_wallet(&self, name: &str) -> Result<Vec<u8>> {
        let maps = self.lock_maps()?;
        maps.wallets
            .get(name)
            .cloned()
            .ok_or_else(|| DistWalletError::NotFound {
                reason: format!("wallet \"{name}\" not found"),
            })
    }

    fn store_wallet(&self, _wallet_id: Uuid, name: &str, data: &[u8]) -> Result<()> {
        let mut maps = self.lock_maps()?;
        maps.wallets.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn retrieve_account(&self, wallet_id: Uuid, account_id: Uuid) -> Result<Vec<u8>> {
        let maps = self.lock_maps()?;
        maps.accounts
            .get(&wallet_id)
            .and_then(|accounts| accounts.get(&account_id))
            .cloned()
            .ok_or_else(|| DistWalletError::NotFound {
                reason: format!("account {account_id} not found"),
            })
    }

    fn store_account(&self, wallet_id: Uuid, account_id: Uuid, data: &[u8]) -> Result<()> {
        let mut maps = self.lock_maps()?;
        maps.accounts
            .entry(wallet_id)
            .or_default()
            .insert(account_id, data.to_vec());
        Ok(())
    }

    fn retrieve_accounts(&self, wallet_id: Uuid) -> RecordIter<'_> {
        // Snapshot under the lock so the iterator never holds it.
        let snapshot: Vec<Result<Vec<u8>>> = match self.lock_maps() {
            Ok(maps) => maps
                .accounts
                .get(&wallet_id)
                .map(|accounts| accounts.values().cloned().map(Ok).collect())
                .unwrap_or_default(),
            Err(e) => vec![Err(e)],
        };
        Box::new(snapshot.into_iter())
    }

    fn retrieve_accounts_index(&self, wallet_id: Uuid) -> Result<Vec<u8>> {
        let maps = self.lock_maps()?;
        maps.indexes
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| DistWalletError::NotFound {
                reason: format!("no account index for wallet {wallet_id}"),
            })
    }

    fn store_accounts_index(&self, wallet_id: Uuid, data: &[u8]) -> Result<()> {
        let mut maps = self.lock_maps()?;
        maps.indexes.insert(wallet_id, data.to_vec());
        Ok(())
    }

    fn as_batch_store(&self) -> Option<&dyn BatchStore> {
        if self.batches_enabled {
            Some(self)
        } else {
            None
        }
    }
}

impl BatchStore for MemoryStore {
    fn retrieve_batch(&self, wallet_id: Uuid) -> Result<Vec<u8>> {
        let maps = self.lock_maps()?;
        maps.batches
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| DistWalletError::NotFound {
                reason: format!("no batch for wallet {wallet_id}"),
            })
    }

    fn store_batch(&self, wallet_id: Uuid, _name: &str, data: &[u8]) -> Result<()> {
        let mut maps = self.lock_maps()?;
        maps.batches.insert(wallet_id, data.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
