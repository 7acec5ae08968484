//! Persistence capability for distributed wallets.
//!
//! The wallet core never talks to a database directly. It is handed an
//! `Arc<dyn Store>` and reads and writes opaque byte records through it:
//! one wallet record per wallet name, one record per account, one index
//! record per wallet and, for backends that implement [`BatchStore`], one
//! batch record per wallet.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local maps, for tests and scratch wallets
//! - [`SledStore`]: on-disk sled database
//!
//! # Error contract
//!
//! A record that does not exist is reported as
//! [`DistWalletError::NotFound`](distwallet_types::DistWalletError::NotFound);
//! any backend failure is a
//! [`DistWalletError::StorageError`](distwallet_types::DistWalletError::StorageError).

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use distwallet_types::Result;
use uuid::Uuid;

/// Lazily produced sequence of raw account records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Vec<u8>>> + Send + 'a>;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Required persistence capability.
pub trait Store: Send + Sync {
    /// Short identifier of the backend, used in log lines and errors.
    fn name(&self) -> &str;

    /// Returns the wallet record stored under `name`.
    fn retrieve_wallet(&self, name: &str) -> Result<Vec<u8>>;

    /// Stores the wallet record for `wallet_id` under `name`.
    fn store_wallet(&self, wallet_id: Uuid, name: &str, data: &[u8]) -> Result<()>;

    /// Returns a single account record.
    fn retrieve_account(&self, wallet_id: Uuid, account_id: Uuid) -> Result<Vec<u8>>;

    /// Stores (or replaces) a single account record.
    fn store_account(&self, wallet_id: Uuid, account_id: Uuid, data: &[u8]) -> Result<()>;

    /// Iterates every account record of `wallet_id`. Order is unspecified.
    fn retrieve_accounts(&self, wallet_id: Uuid) -> RecordIter<'_>;

    /// Returns the persisted account index of `wallet_id`.
    fn retrieve_accounts_index(&self, wallet_id: Uuid) -> Result<Vec<u8>>;

    /// Stores the account index of `wallet_id`.
    fn store_accounts_index(&self, wallet_id: Uuid, data: &[u8]) -> Result<()>;

    /// Returns the batch extension if this backend supports it.
    fn as_batch_store(&self) -> Option<&dyn BatchStore> {
        None
    }
}

// ---------------------------------------------------------------------------
// BatchStore
// ---------------------------------------------------------------------------

/// Optional extension for backends that can hold one batch record per
/// wallet.
pub trait BatchStore: Send + Sync {
    /// Returns the batch record of `wallet_id`.
    fn retrieve_batch(&self, wallet_id: Uuid) -> Result<Vec<u8>>;

    /// Stores the batch record of `wallet_id`; `name` is the wallet name.
    fn store_batch(&self, wallet_id: Uuid, name: &str, data: &[u8]) -> Result<()>;
}
