//! Passphrase-based protection of individual secrets.
//!
//! The wallet core never encrypts anything itself. It hands raw secret
//! bytes to an [`Encryptor`] and stores whatever JSON record comes back
//! next to the account, tagged with the encryptor's name and version.
//! [`KeystoreEncryptor`] is the implementation shipped with this crate.
//!
//! # Keystore record
//!
//! ```json
//! {
//!   "kdf": {
//!     "function": "argon2id",
//!     "params": { "m_cost": 65536, "t_cost": 3, "p_cost": 1, "salt": "<hex>" }
//!   },
//!   "cipher": {
//!     "function": "xchacha20-poly1305",
//!     "params": { "nonce": "<hex>" },
//!     "message": "<hex>"
//!   }
//! }
//! ```

use distwallet_types::config::EncryptorConfig;
use distwallet_types::{DistWalletError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aead::{decrypt_xchacha20, encrypt_xchacha20, generate_aead_nonce, AeadNonce};
use crate::kdf::{argon2id_derive_key, generate_salt, Argon2Params};
use crate::keys::decode_hex;

/// Associated data bound into every keystore ciphertext.
const KEYSTORE_AAD: &[u8] = b"distwallet-keystore-v1";

const KDF_FUNCTION: &str = "argon2id";
const CIPHER_FUNCTION: &str = "xchacha20-poly1305";

// ---------------------------------------------------------------------------
// Encryptor trait
// ---------------------------------------------------------------------------

/// Capability that turns a secret into a persisted JSON record and back.
pub trait Encryptor: Send + Sync {
    /// Short identifier written into every record this encryptor produces.
    fn name(&self) -> &str;

    /// Format version of the records this encryptor produces.
    fn version(&self) -> u32;

    /// Encrypts `secret` under `passphrase`.
    fn encrypt(&self, secret: &[u8], passphrase: &[u8]) -> Result<serde_json::Value>;

    /// Recovers the secret from a record produced by [`Encryptor::encrypt`].
    ///
    /// Any failure, including a wrong passphrase, is an error; callers
    /// decide how to present it.
    fn decrypt(&self, record: &serde_json::Value, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct KeystoreRecord {
    kdf: KdfSection,
    cipher: CipherSection,
}

#[derive(Serialize, Deserialize)]
struct KdfSection {
    function: String,
    params: KdfParams,
}

#[derive(Serialize, Deserialize)]
struct KdfParams {
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
    salt: String,
}

#[derive(Serialize, Deserialize)]
struct CipherSection {
    function: String,
    params: CipherParams,
    message: String,
}

#[derive(Serialize, Deserialize)]
struct CipherParams {
    nonce: String,
}

// ---------------------------------------------------------------------------
// KeystoreEncryptor
// ---------------------------------------------------------------------------

/// Argon2id + XChaCha20-Poly1305 keystore.
#[derive(Clone, Debug, Default)]
pub struct KeystoreEncryptor {
    params: Argon2Params,
}

impl KeystoreEncryptor {
    /// Record format version.
    pub const VERSION: u32 = 1;

    /// Identifier written into account records.
    pub const NAME: &'static str = "keystore";

    /// Creates an encryptor using the costs from `config`.
    pub fn new(config: EncryptorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: config.into(),
        })
    }

    /// Returns the Argon2 costs applied to new records.
    pub fn params(&self) -> Argon2Params {
        self.params
    }
}

impl Encryptor for KeystoreEncryptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn encrypt(&self, secret: &[u8], passphrase: &[u8]) -> Result<serde_json::Value> {
        let salt = generate_salt();
        let key = argon2id_derive_key(passphrase, &salt, &self.params)?;
        let nonce = generate_aead_nonce();
        let message = encrypt_xchacha20(key.as_bytes(), &nonce, secret, KEYSTORE_AAD)?;

        let record = KeystoreRecord {
            kdf: KdfSection {
                function: KDF_FUNCTION.into(),
                params: KdfParams {
                    m_cost: self.params.m_cost,
                    t_cost: self.params.t_cost,
                    p_cost: self.params.p_cost,
                    salt: hex::encode(salt),
                },
            },
            cipher: CipherSection {
                function: CIPHER_FUNCTION.into(),
                params: CipherParams {
                    nonce: hex::encode(nonce.as_bytes()),
                },
                message: hex::encode(message),
            },
        };

        serde_json::to_value(record).map_err(|e| DistWalletError::CryptoError {
            reason: format!("failed to encode keystore record: {e}"),
        })
    }

    fn decrypt(&self, record: &serde_json::Value, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let record = KeystoreRecord::deserialize(record).map_err(|e| {
            DistWalletError::CryptoError {
                reason: format!("malformed keystore record: {e}"),
            }
        })?;

        if record.kdf.function != KDF_FUNCTION {
            return Err(DistWalletError::CryptoError {
                reason: format!("unsupported kdf function \"{}\"", record.kdf.function),
            });
        }
        if record.cipher.function != CIPHER_FUNCTION {
            return Err(DistWalletError::CryptoError {
                reason: format!("unsupported cipher function \"{}\"", record.cipher.function),
            });
        }

        let params = Argon2Params {
            m_cost: record.kdf.params.m_cost,
            t_cost: record.kdf.params.t_cost,
            p_cost: record.kdf.params.p_cost,
        };
        params.check()?;

        let salt = decode_hex(&record.kdf.params.salt)?;
        let nonce = AeadNonce::from_slice(&decode_hex(&record.cipher.params.nonce)?)?;
        let message = decode_hex(&record.cipher.message)?;

        let key = argon2id_derive_key(passphrase, &salt, &params)?;
        decrypt_xchacha20(key.as_bytes(), &nonce, &message, KEYSTORE_AAD)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> std::result::Result<KeystoreEncryptor, DistWalletError> {
        KeystoreEncryptor::new(EncryptorConfig {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        })
    }

    #[test]
    fn roundtrip_recovers_secret() -> std::result::Result<(), DistWalletError> {
        let enc = light()?;
        let record = enc.encrypt(&[5u8; 32], b"pass")?;
        let secret = enc.decrypt(&record, b"pass")?;
        assert_eq!(secret.as_slice(), &[5u8; 32]);
        Ok(())
    }

    #[test]
    fn wrong_passphrase_fails() -> std::result::Result<(), DistWalletError> {
        let enc = light()?;
        let record = enc.encrypt(&[5u8; 32], b"pass")?;
        assert!(enc.decrypt(&record, b"nope").is_err());
        Ok(())
    }

    #[test]
    fn record_has_expected_shape() -> std::result::Result<(), DistWalletError> {
        let enc = light()?;
        let record = enc.encrypt(b"x", b"pass")?;
        assert_eq!(record["kdf"]["function"], "argon2id");
        assert_eq!(record["kdf"]["params"]["m_cost"], 256);
        assert_eq!(record["cipher"]["function"], "xchacha20-poly1305");
        assert!(record["cipher"]["message"].is_string());
        Ok(())
    }

    #[test]
    fn hostile_costs_rejected_before_derivation() -> std::result::Result<(), DistWalletError> {
        let enc = light()?;
        let mut record = enc.encrypt(b"x", b"pass")?;
        record["kdf"]["params"]["m_cost"] = serde_json::json!(u32::MAX);
        assert!(enc.decrypt(&record, b"pass").is_err());
        Ok(())
    }

    #[test]
    fn malformed_record_rejected() -> std::result::Result<(), DistWalletError> {
        let enc = light()?;
        assert!(enc.decrypt(&serde_json::json!({"kdf": 1}), b"pass").is_err());
        Ok(())
    }

    #[test]
    fn identity() {
        let enc = KeystoreEncryptor::default();
        assert_eq!(enc.name(), "keystore");
        assert_eq!(enc.version(), 1);
    }
}
