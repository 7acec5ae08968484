//! Passphrase-protected wallet dumps.
//!
//! A dump is the JSON document
//!
//! ```json
//! {"wallet": <wallet record>, "accounts": [<account record>, ...]}
//! ```
//!
//! sealed with the export cipher. Account secrets stay encrypted under
//! their own keystore passphrases inside the dump.

use std::collections::HashSet;
use std::sync::Arc;

use distwallet_crypto::encryptor::Encryptor;
use distwallet_crypto::export_cipher;
use distwallet_crypto::kdf::Argon2Params;
use distwallet_store::Store;
use distwallet_types::{DistWalletError, Result};
use serde_json::json;

use crate::account::Account;
use crate::index::Index;
use crate::record::{parse_json, to_bytes, Fields};
use crate::wallet::{ensure_wallet_absent, Wallet, WalletRecord};

impl Wallet {
    /// Seals the wallet record and every stored account record under
    /// `passphrase`.
    ///
    /// Records are read straight from the store, so accounts written by
    /// other instances sharing the store are included. Records that do
    /// not parse as accounts are left out.
    ///
    /// # Errors
    ///
    /// [`DistWalletError::StorageError`] if enumerating the store fails.
    pub fn export(&self, passphrase: &[u8]) -> Result<Vec<u8>> {
        let mut accounts = Vec::new();
        for record in self.store().retrieve_accounts(self.id()) {
            let value = parse_json(&record?, "account").and_then(|value| {
                Account::from_record(&value, Arc::clone(self.encryptor())).map(|_| value)
            });
            match value {
                Ok(value) => accounts.push(value),
                Err(e) => tracing::warn!(wallet = %self.name(), error = %e, "leaving unparsable account out of export"),
            }
        }

        let count = accounts.len();
        let document = json!({
            "wallet": self.record().to_value(),
            "accounts": accounts,
        });
        let params = Argon2Params::from(self.config().encryptor);
        let dump = export_cipher::encrypt_with_params(&to_bytes(&document, "export")?, passphrase, &params)?;

        tracing::info!(wallet = %self.name(), accounts = count, "exported wallet");
        Ok(dump)
    }
}

/// Recreates an exported wallet in `store` and opens it.
///
/// Every record in the dump is parsed before anything is written.
///
/// # Errors
///
/// - [`DistWalletError::AuthenticationError`] if `passphrase` is wrong.
/// - [`DistWalletError::CorruptionError`] if the dump is malformed or
///   holds two accounts with one name.
/// - [`DistWalletError::ConflictError`] if `store` already holds a wallet
///   with the dumped name.
pub fn import(
    dump: &[u8],
    passphrase: &[u8],
    store: Arc<dyn Store>,
    encryptor: Arc<dyn Encryptor>,
) -> Result<Wallet> {
    let plaintext = export_cipher::decrypt(dump, passphrase)?;
    let (wallet, accounts) = parse_document(&plaintext, &encryptor)
        .map_err(|e| e.into_corruption("export dump corrupt"))?;

    ensure_wallet_absent(store.as_ref(), &wallet.name)?;

    store.store_wallet(wallet.id, &wallet.name, &to_bytes(&wallet.to_value(), "wallet")?)?;
    let mut index = Index::new();
    for account in &accounts {
        store.store_account(wallet.id, account.id(), &account.serialize()?)?;
        index.add(account.id(), account.name());
    }
    store.store_accounts_index(wallet.id, &index.serialize()?)?;

    tracing::info!(wallet = %wallet.name, accounts = accounts.len(), "imported wallet");
    Wallet::open(&wallet.name, store, encryptor)
}

fn parse_document(plaintext: &[u8], encryptor: &Arc<dyn Encryptor>) -> Result<(WalletRecord, Vec<Account>)> {
    let document = parse_json(plaintext, "export")?;
    let fields = Fields::new("export", &document)?;
    let wallet = WalletRecord::from_value(fields.value("wallet", "wallet")?)?;

    let mut names = HashSet::new();
    let mut accounts = Vec::new();
    for value in fields.array("accounts", "accounts")? {
        let account = Account::from_record(value, Arc::clone(encryptor))?;
        if !names.insert(account.name().to_string()) {
            return Err(DistWalletError::CorruptionError {
                reason: format!("duplicate account name \"{}\"", account.name()),
            });
        }
        accounts.push(account);
    }
    Ok((wallet, accounts))
}
