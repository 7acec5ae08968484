//! Ed25519 key material for threshold accounts.
//!
//! Secret key shares arrive pre-generated from the multi-party protocol;
//! this module only parses, signs with, and verifies against them. The
//! signing key is zeroized on drop by `ed25519-dalek`'s `ZeroizeOnDrop`.

use std::fmt;

use distwallet_types::{DistWalletError, Result};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

/// Byte length of a raw secret key share.
pub const SECRET_KEY_LEN: usize = 32;

/// Byte length of a compressed public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Byte length of a signature.
pub const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// SecretKey
// ---------------------------------------------------------------------------

/// Ed25519 secret key share.
///
/// `Debug` is redacted so the key never appears in logs.
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
}

impl SecretKey {
    /// Parses a secret key from its 32 raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DistWalletError::CryptoError`] if `bytes` is not exactly
    /// [`SECRET_KEY_LEN`] bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: Zeroizing<[u8; SECRET_KEY_LEN]> =
            Zeroizing::new(bytes.try_into().map_err(|_| DistWalletError::CryptoError {
                reason: format!(
                    "secret key must be {SECRET_KEY_LEN} bytes, got {}",
                    bytes.len()
                ),
            })?);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Returns the public key derived from this secret.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs `message`. Ed25519 is deterministic, so the same key and
    /// message always yield the same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Returns the raw secret bytes in a zeroizing buffer.
    pub fn to_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LEN]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key (32-byte compressed point).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Parses a public key, rejecting bytes that do not decompress to a
    /// curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| DistWalletError::CryptoError {
                reason: format!(
                    "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                    bytes.len()
                ),
            })?;
        VerifyingKey::from_bytes(&arr).map_err(|e| DistWalletError::CryptoError {
            reason: format!("invalid public key: {e}"),
        })?;
        Ok(Self(arr))
    }

    /// Parses a hex-encoded public key. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex(s)?)
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Lowercase, unprefixed hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Creates a [`Signature`] from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 64-byte array.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Verifies `signature` over `message` against `public_key`.
///
/// Uses strict verification, which rejects small-order keys and
/// non-canonical signatures.
///
/// # Errors
///
/// Returns [`DistWalletError::CryptoError`] if verification fails.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| DistWalletError::CryptoError {
        reason: format!("invalid public key: {e}"),
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(message, &sig)
        .map_err(|e| DistWalletError::CryptoError {
            reason: format!("signature verification failed: {e}"),
        })
}

/// Decodes a hex string, accepting an optional `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let stripped = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(stripped).map_err(|e| DistWalletError::CryptoError {
        reason: format!("invalid hex: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
