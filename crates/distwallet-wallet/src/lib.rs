//! Threshold-signing wallets.
//!
//! A distributed wallet holds the key shares this node owns in a number
//! of threshold-signing groups:
//!
//! - **Import** an account produced by an external key generation
//!   ceremony (secret share, verification vector, participants)
//! - **Lock / Unlock** each account independently with its passphrase
//! - **Sign** with an unlocked account's share
//! - **Index** accounts by name, rebuilt from the records when lost
//! - **Batch** every secret under one passphrase for fast bulk unlock
//! - **Export / Import** the whole wallet as a passphrase-sealed dump
//!
//! Persistence goes through the [`distwallet_store::Store`] trait and
//! secret protection through [`distwallet_crypto::encryptor::Encryptor`].

pub mod account;
mod batch;
pub mod export;
pub mod index;
mod record;
pub mod wallet;

pub use account::Account;
pub use batch::BATCH_VERSION;
pub use export::import;
pub use index::Index;
pub use wallet::{AccountIter, Wallet, WALLET_TYPE, WALLET_VERSION};
