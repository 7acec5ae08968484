//! Integration tests for distwallet-wallet.
//!
//! Secrets are fixed 32-byte seeds and the Argon2 costs are the lowest
//! the encryptor accepts, so each test runs in milliseconds. Persistence
//! tests run against both the in-memory and the sled backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use distwallet_crypto::encryptor::{Encryptor, KeystoreEncryptor};
use distwallet_crypto::keys::{verify, SecretKey};
use distwallet_store::{MemoryStore, RecordIter, SledStore, Store};
use distwallet_types::config::{EncryptorConfig, WalletConfig};
use distwallet_types::DistWalletError;
use distwallet_wallet::Wallet;
use uuid::Uuid;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const PASSPHRASE: &[u8] = b"correct horse battery staple";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("distwallet_wallet=debug")
        .with_test_writer()
        .try_init();
}

fn light_costs() -> EncryptorConfig {
    EncryptorConfig {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    }
}

fn encryptor() -> std::result::Result<Arc<dyn Encryptor>, DistWalletError> {
    Ok(Arc::new(KeystoreEncryptor::new(light_costs())?))
}

fn participants(n: u64) -> BTreeMap<u64, String> {
    (1..=n).map(|id| (id, format!("node-{id}.example:13000"))).collect()
}

fn vector(t: u32) -> std::result::Result<Vec<Vec<u8>>, DistWalletError> {
    (0..t)
        .map(|i| {
            let seed = [0x40 + i as u8; 32];
            Ok(SecretKey::from_bytes(&seed)?.public_key().as_bytes().to_vec())
        })
        .collect()
}

fn secret(seed: u8) -> [u8; 32] {
    [seed; 32]
}

/// Imports a 2-of-3 account called `name`.
fn import(wallet: &Wallet, name: &str, seed: u8) -> std::result::Result<Arc<distwallet_wallet::Account>, DistWalletError> {
    wallet.import_account(name, &secret(seed), 2, &vector(2)?, &participants(3), PASSPHRASE)
}

/// Runs `f` once per backend with a fresh store.
fn with_backends(f: impl Fn(Arc<dyn Store>) -> TestResult) -> TestResult {
    f(Arc::new(MemoryStore::new()))?;
    let dir = tempfile::tempdir()?;
    f(Arc::new(SledStore::open(dir.path())?))
}

/// Delegates to a [`MemoryStore`] but can be told to fail account or index
/// writes.
struct FlakyStore {
    inner: MemoryStore,
    fail_accounts: AtomicBool,
    fail_index: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_accounts: AtomicBool::new(false),
            fail_index: AtomicBool::new(false),
        }
    }
}

impl Store for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn retrieve_wallet(&self, name: &str) -> distwallet_types::Result<Vec<u8>> {
        self.inner.retrieve_wallet(name)
    }

    fn store_wallet(&self, wallet_id: Uuid, name: &str, data: &[u8]) -> distwallet_types::Result<()> {
        self.inner.store_wallet(wallet_id, name, data)
    }

    fn retrieve_account(&self, wallet_id: Uuid, account_id: Uuid) -> distwallet_types::Result<Vec<u8>> {
        self.inner.retrieve_account(wallet_id, account_id)
    }

    fn store_account(&self, wallet_id: Uuid, account_id: Uuid, data: &[u8]) -> distwallet_types::Result<()> {
        if self.fail_accounts.load(Ordering::SeqCst) {
            return Err(DistWalletError::StorageError {
                reason: "disk full".into(),
            });
        }
        self.inner.store_account(wallet_id, account_id, data)
    }

    fn retrieve_accounts(&self, wallet_id: Uuid) -> RecordIter<'_> {
        self.inner.retrieve_accounts(wallet_id)
    }

    fn retrieve_accounts_index(&self, wallet_id: Uuid) -> distwallet_types::Result<Vec<u8>> {
        self.inner.retrieve_accounts_index(wallet_id)
    }

    fn store_accounts_index(&self, wallet_id: Uuid, data: &[u8]) -> distwallet_types::Result<()> {
        if self.fail_index.load(Ordering::SeqCst) {
            return Err(DistWalletError::StorageError {
                reason: "index volume offline".into(),
            });
        }
        self.inner.store_accounts_index(wallet_id, data)
    }
}

// ---------------------------------------------------------------------------
// 1. Wallet lifecycle
// ---------------------------------------------------------------------------

#[test]
fn create_then_open() -> TestResult {
    init_tracing();
    with_backends(|store| {
        let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
        assert!(!wallet.is_unlocked());
        assert_eq!(wallet.version(), 1);

        let opened = Wallet::open("primary", store, encryptor()?)?;
        assert_eq!(opened.id(), wallet.id());
        assert_eq!(opened.name(), "primary");
        assert_eq!(opened.wallet_type(), "distributed");
        assert_eq!(opened.accounts()?.count(), 0);
        Ok(())
    })
}

#[test]
fn create_existing_wallet_conflicts() -> TestResult {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    Wallet::create("primary", Arc::clone(&store), encryptor()?)?;

    let err = Wallet::create("primary", store, encryptor()?).err();
    assert!(matches!(err, Some(DistWalletError::ConflictError { .. })));
    assert!(err.is_some_and(|e| e.reason() == "wallet \"primary\" already exists"));
    Ok(())
}

#[test]
fn open_missing_wallet_is_corruption() -> TestResult {
    let err = Wallet::open("ghost", Arc::new(MemoryStore::new()), encryptor()?).err();
    assert!(matches!(err, Some(DistWalletError::CorruptionError { .. })));
    assert!(err.is_some_and(|e| e.reason() == "wallet \"ghost\" does not exist"));
    Ok(())
}

#[test]
fn accounts_survive_reopening_sled() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (account_id, public_key) = {
        let store: Arc<dyn Store> = Arc::new(SledStore::open(dir.path())?);
        let wallet = Wallet::create("primary", store, encryptor()?)?;
        wallet.unlock(b"")?;
        let account = import(&wallet, "alpha", 1)?;
        (account.id(), *account.public_key())
    };

    let store: Arc<dyn Store> = Arc::new(SledStore::open(dir.path())?);
    let wallet = Wallet::open("primary", store, encryptor()?)?;
    let account = wallet.account_by_name("alpha")?;
    assert_eq!(account.id(), account_id);
    assert_eq!(*account.public_key(), public_key);
    assert!(!account.is_unlocked());

    account.unlock(PASSPHRASE)?;
    let signature = account.sign(b"payload")?;
    verify(account.public_key(), b"payload", &signature)?;
    Ok(())
}

#[test]
fn with_config_rejects_invalid_values() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    let err = wallet
        .with_config(WalletConfig {
            account_queue_capacity: 0,
            encryptor: light_costs(),
        })
        .err();
    assert!(matches!(err, Some(DistWalletError::ConfigError { .. })));
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Import validation
// ---------------------------------------------------------------------------

#[test]
fn signing_threshold_must_exceed_half_the_participants() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;

    let cases: [(u64, u32, bool); 8] = [
        (1, 1, true),
        (2, 1, false),
        (2, 2, true),
        (3, 1, false),
        (3, 2, true),
        (4, 2, false),
        (4, 3, true),
        (5, 3, true),
    ];
    for (i, (n, t, accepted)) in cases.into_iter().enumerate() {
        let name = format!("account-{i}");
        let result = wallet.import_account(&name, &secret(i as u8 + 1), t, &vector(t)?, &participants(n), PASSPHRASE);
        assert_eq!(result.is_ok(), accepted, "{t} of {n}: {:?}", result.err());
        if !accepted {
            assert!(result.err().is_some_and(|e| e.reason() == "invalid signing threshold:participant ratio"));
        }
    }
    Ok(())
}

#[test]
fn verification_vector_length_must_match_threshold() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;
    let err = wallet
        .import_account("alpha", &secret(1), 2, &vector(3)?, &participants(3), PASSPHRASE)
        .err();
    assert!(matches!(err, Some(DistWalletError::ValidationError { .. })));
    assert!(err.is_some_and(|e| e.reason() == "verification vector invalid"));
    Ok(())
}

#[test]
fn locking_the_wallet_blocks_import_only() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;
    let account = import(&wallet, "alpha", 1)?;
    wallet.lock();

    let err = import(&wallet, "beta", 2).err();
    assert!(matches!(err, Some(DistWalletError::StateError { .. })));

    // Accounts keep their own lock state.
    account.unlock(PASSPHRASE)?;
    assert!(account.sign(b"still works").is_ok());
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Account lock state
// ---------------------------------------------------------------------------

#[test]
fn account_lock_unlock_sign() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;
    let account = import(&wallet, "alpha", 1)?;

    assert!(!account.is_unlocked());
    let err = account.sign(b"m").err();
    assert!(err.is_some_and(|e| e.reason() == "cannot sign when account is locked"));

    let err = account.unlock(b"wrong").err();
    assert!(matches!(err, Some(DistWalletError::AuthenticationError { .. })));
    assert!(!account.is_unlocked());

    account.unlock(PASSPHRASE)?;
    assert!(account.is_unlocked());
    let signature = account.sign(b"m")?;
    verify(account.public_key(), b"m", &signature)?;
    assert_eq!(account.private_key()?.public_key(), *account.public_key());

    account.lock();
    assert!(!account.is_unlocked());
    assert!(account.private_key().is_err());
    Ok(())
}

#[test]
fn account_exposes_threshold_metadata() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;
    let account = import(&wallet, "alpha", 1)?;

    assert_eq!(account.signing_threshold(), 2);
    assert_eq!(account.participants(), &participants(3));
    assert_eq!(account.verification_vector().len(), 2);
    assert_eq!(account.composite_public_key(), account.verification_vector().first());
    assert_eq!(account.path(), "");
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Enumeration and lookup
// ---------------------------------------------------------------------------

#[test]
fn accounts_yields_every_account_once() -> TestResult {
    init_tracing();
    with_backends(|store| {
        let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
        wallet.unlock(b"")?;
        for (i, name) in ["alpha", "beta", "gamma"].into_iter().enumerate() {
            import(&wallet, name, i as u8 + 1)?;
        }

        let names: HashSet<String> = wallet.accounts()?.map(|a| a.name().to_string()).collect();
        assert_eq!(names.len(), 3);

        let reopened = Wallet::open("primary", store, encryptor()?)?;
        let cached = reopened.account_by_name("beta")?;
        let listed: Vec<_> = reopened.accounts()?.collect();
        assert_eq!(listed.len(), 3);
        let beta = listed.iter().find(|a| a.name() == "beta");
        assert!(beta.is_some_and(|a| Arc::ptr_eq(a, &cached)));
        Ok(())
    })
}

#[test]
fn accounts_with_a_tiny_queue() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?.with_config(WalletConfig {
        account_queue_capacity: 1,
        encryptor: light_costs(),
    })?;
    wallet.unlock(b"")?;
    for i in 0..5 {
        import(&wallet, &format!("account-{i}"), i + 1)?;
    }
    assert_eq!(wallet.accounts()?.count(), 5);

    // Dropping the iterator early must not hang the worker.
    let first = wallet.accounts()?.next();
    assert!(first.is_some());
    Ok(())
}

#[test]
fn unparsable_records_are_skipped_when_listing() -> TestResult {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
    wallet.unlock(b"")?;
    import(&wallet, "alpha", 1)?;
    store.store_account(wallet.id(), Uuid::new_v4(), b"{not json")?;

    let reopened = Wallet::open("primary", store, encryptor()?)?;
    assert_eq!(reopened.accounts()?.count(), 1);
    Ok(())
}

#[test]
fn corrupt_account_record_is_reported() -> TestResult {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
    let id = Uuid::new_v4();
    store.store_account(wallet.id(), id, br#"{"uuid":"nope"}"#)?;

    let err = wallet.account_by_id(id).err();
    assert!(matches!(err, Some(DistWalletError::CorruptionError { .. })));
    Ok(())
}

#[test]
fn lookup_errors_name_the_missing_account() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    let err = wallet.account_by_name("nobody").err();
    assert!(matches!(err, Some(DistWalletError::NotFound { .. })));
    assert!(err.is_some_and(|e| e.reason() == "no account with name \"nobody\""));
    Ok(())
}

// ---------------------------------------------------------------------------
// 5. Index maintenance
// ---------------------------------------------------------------------------

#[test]
fn missing_index_is_rebuilt_on_open() -> TestResult {
    init_tracing();
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory.clone();
    let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
    wallet.unlock(b"")?;
    let alpha = import(&wallet, "alpha", 1)?;
    import(&wallet, "beta", 2)?;

    assert!(memory.remove_accounts_index(wallet.id())?);
    let reopened = Wallet::open("primary", Arc::clone(&store), encryptor()?)?;
    assert_eq!(reopened.account_by_name("alpha")?.id(), alpha.id());
    assert!(reopened.account_by_name("beta").is_ok());

    // The rebuilt index is persisted.
    assert!(store.retrieve_accounts_index(wallet.id()).is_ok());
    Ok(())
}

#[test]
fn garbage_index_is_rebuilt_on_open() -> TestResult {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
    wallet.unlock(b"")?;
    import(&wallet, "alpha", 1)?;

    store.store_accounts_index(wallet.id(), b"\x00garbage")?;
    let reopened = Wallet::open("primary", store, encryptor()?)?;
    assert!(reopened.account_by_name("alpha").is_ok());
    Ok(())
}

#[test]
fn failed_account_write_rolls_back_the_index() -> TestResult {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn Store> = flaky.clone();
    let wallet = Wallet::create("primary", store, encryptor()?)?;
    wallet.unlock(b"")?;

    flaky.fail_accounts.store(true, Ordering::SeqCst);
    let err = import(&wallet, "alpha", 1).err();
    assert!(matches!(err, Some(DistWalletError::StorageError { .. })));
    assert!(matches!(wallet.account_by_name("alpha"), Err(DistWalletError::NotFound { .. })));

    flaky.fail_accounts.store(false, Ordering::SeqCst);
    import(&wallet, "alpha", 1)?;
    assert_eq!(wallet.accounts()?.count(), 1);
    Ok(())
}

#[test]
fn failed_index_write_keeps_the_stored_account() -> TestResult {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn Store> = flaky.clone();
    let wallet = Wallet::create("primary", Arc::clone(&store), encryptor()?)?;
    wallet.unlock(b"")?;

    flaky.fail_index.store(true, Ordering::SeqCst);
    let alpha = import(&wallet, "alpha", 1)?;
    assert_eq!(wallet.account_by_name("alpha")?.id(), alpha.id());

    // The next successful import rewrites the whole index.
    flaky.fail_index.store(false, Ordering::SeqCst);
    let beta = import(&wallet, "beta", 2)?;

    let reopened = Wallet::open("primary", store, encryptor()?)?;
    assert_eq!(reopened.account_by_name("alpha")?.id(), alpha.id());
    assert_eq!(reopened.account_by_name("beta")?.id(), beta.id());
    Ok(())
}

// ---------------------------------------------------------------------------
// 6. Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_imports_of_one_name_admit_a_single_winner() -> TestResult {
    let wallet = Arc::new(Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?);
    wallet.unlock(b"")?;

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let wallet = Arc::clone(&wallet);
            thread::spawn(move || import(&wallet, "contended", i + 1))
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.join() {
            Ok(Ok(_)) => winners += 1,
            Ok(Err(e)) => assert!(matches!(e, DistWalletError::ConflictError { .. }), "{e}"),
            Err(_) => return Err("import thread panicked".into()),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(wallet.accounts()?.count(), 1);
    Ok(())
}

#[test]
fn concurrent_unlock_and_sign_on_one_account() -> TestResult {
    let wallet = Wallet::create("primary", Arc::new(MemoryStore::new()), encryptor()?)?;
    wallet.unlock(b"")?;
    let account = import(&wallet, "alpha", 1)?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let account = Arc::clone(&account);
            thread::spawn(move || -> distwallet_types::Result<()> {
                account.unlock(PASSPHRASE)?;
                let signature = account.sign(b"concurrent")?;
                verify(account.public_key(), b"concurrent", &signature)
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| "signing thread panicked")??;
    }
    Ok(())
}
