//! XChaCha20-Poly1305 authenticated encryption with associated data.
//!
//! Both the keystore encryptor and the export cipher seal their payloads
//! with XChaCha20-Poly1305 under a 192-bit random nonce. A nonce must
//! never be reused with the same key; since every seal derives a fresh
//! key from a fresh salt, random nonces are more than sufficient.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use distwallet_types::{DistWalletError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Length of the Poly1305 authentication tag appended to ciphertexts.
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// AeadNonce
// ---------------------------------------------------------------------------

/// 192-bit (24-byte) nonce for XChaCha20-Poly1305.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AeadNonce([u8; 24]);

impl AeadNonce {
    /// Fixed byte length of an XChaCha20-Poly1305 nonce.
    pub const LEN: usize = 24;

    /// Creates an [`AeadNonce`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 24]) -> Self {
        Self(bytes)
    }

    /// Parses a nonce from a slice, rejecting any length other than 24.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 24] = bytes.try_into().map_err(|_| DistWalletError::CryptoError {
            reason: format!("nonce must be {} bytes, got {}", Self::LEN, bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Returns the underlying 24-byte array.
    pub fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

/// Generates a fresh random nonce from OS entropy.
pub fn generate_aead_nonce() -> AeadNonce {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    AeadNonce(bytes)
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext`, returning the ciphertext with the 16-byte tag
/// appended.
///
/// `aad` is authenticated but not encrypted; pass `&[]` if unused.
pub fn encrypt_xchacha20(
    key: &[u8; 32],
    nonce: &AeadNonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
        .map_err(|e| DistWalletError::CryptoError {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })
}

/// Decrypts a ciphertext produced by [`encrypt_xchacha20`].
///
/// The plaintext is returned in a zeroizing buffer since callers use
/// this path almost exclusively for secret key material.
///
/// # Errors
///
/// Returns [`DistWalletError::CryptoError`] if the tag does not verify
/// (wrong key, wrong nonce, tampered ciphertext, or wrong AAD).
pub fn decrypt_xchacha20(
    key: &[u8; 32],
    nonce: &AeadNonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|e| DistWalletError::CryptoError {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
