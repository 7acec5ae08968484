//! Passphrase envelope for whole-wallet exports.
//!
//! # Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       4   Magic bytes: b"DWEX"
//!   4       1   Version: 0x01
//!   5      68   Header body (bincode-serialized):
//!                 m_cost : u32 (4B)
//!                 t_cost : u32 (4B)
//!                 p_cost : u32 (4B)
//!                 salt   : [u8; 32]
//!                 nonce  : [u8; 24]
//!  73     var   XChaCha20-Poly1305 ciphertext + tag
//! ```
//!
//! The full 73-byte header is bound into the ciphertext as associated
//! data, so tampering with the costs or salt fails authentication.
//! Magic and version are checked before bincode sees any bytes, and the
//! costs are bounded before any key derivation runs.

use distwallet_types::{DistWalletError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aead::{decrypt_xchacha20, encrypt_xchacha20, generate_aead_nonce, AeadNonce, TAG_LEN};
use crate::kdf::{argon2id_derive_key, generate_salt, Argon2Params, SALT_LEN};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes identifying an export dump.
pub const EXPORT_MAGIC: [u8; 4] = *b"DWEX";

/// Current export envelope version.
pub const EXPORT_VERSION: u8 = 1;

/// Bincode-serialized size of [`HeaderBody`]: 3 × u32 (12) + 32 + 24.
const HEADER_BODY_SIZE: usize = 12 + SALT_LEN + AeadNonce::LEN;

/// Magic (4) + version (1) + body (68).
const TOTAL_HEADER_SIZE: usize = 4 + 1 + HEADER_BODY_SIZE;

#[derive(Serialize, Deserialize)]
struct HeaderBody {
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
    salt: [u8; SALT_LEN],
    nonce: [u8; 24],
}

// ---------------------------------------------------------------------------
// Encrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` under `passphrase` with the default Argon2 costs.
pub fn encrypt(plaintext: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    encrypt_with_params(plaintext, passphrase, &Argon2Params::default())
}

/// Encrypts `plaintext` under `passphrase` with explicit Argon2 costs.
///
/// # Errors
///
/// [`DistWalletError::CryptoError`] if the costs are out of range or a
/// primitive fails.
pub fn encrypt_with_params(
    plaintext: &[u8],
    passphrase: &[u8],
    params: &Argon2Params,
) -> Result<Vec<u8>> {
    params.check()?;

    let salt = generate_salt();
    let nonce = generate_aead_nonce();
    let body = HeaderBody {
        m_cost: params.m_cost,
        t_cost: params.t_cost,
        p_cost: params.p_cost,
        salt,
        nonce: *nonce.as_bytes(),
    };
    let body_bytes = bincode::serialize(&body).map_err(|e| DistWalletError::CryptoError {
        reason: format!("failed to serialize export header: {e}"),
    })?;

    let mut out = Vec::with_capacity(TOTAL_HEADER_SIZE + plaintext.len() + TAG_LEN);
    out.extend_from_slice(&EXPORT_MAGIC);
    out.push(EXPORT_VERSION);
    out.extend_from_slice(&body_bytes);

    let key = argon2id_derive_key(passphrase, &salt, params)?;
    let ciphertext = encrypt_xchacha20(key.as_bytes(), &nonce, plaintext, &out)?;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decrypt
// ---------------------------------------------------------------------------

/// Decrypts a dump produced by [`encrypt`].
///
/// # Validation order
///
/// 1. Length covers the header and a tag.
/// 2. Magic bytes match `b"DWEX"`.
/// 3. Version byte matches `0x01`.
/// 4. Header body deserialized via `bincode`; costs bounded.
/// 5. Key derived and ciphertext authenticated.
///
/// # Errors
///
/// - [`DistWalletError::CorruptionError`] for steps 1–4.
/// - [`DistWalletError::AuthenticationError`] if the passphrase is wrong
///   or the dump was tampered with.
pub fn decrypt(data: &[u8], passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < TOTAL_HEADER_SIZE + TAG_LEN {
        return Err(DistWalletError::CorruptionError {
            reason: format!(
                "export dump truncated: expected at least {} bytes, got {}",
                TOTAL_HEADER_SIZE + TAG_LEN,
                data.len()
            ),
        });
    }
    let (header, ciphertext) = data.split_at(TOTAL_HEADER_SIZE);

    if header[..4] != EXPORT_MAGIC {
        return Err(DistWalletError::CorruptionError {
            reason: "export dump magic mismatch".into(),
        });
    }
    if header[4] != EXPORT_VERSION {
        return Err(DistWalletError::CorruptionError {
            reason: format!(
                "export dump version mismatch: expected {EXPORT_VERSION}, got {}",
                header[4]
            ),
        });
    }

    let body: HeaderBody =
        bincode::deserialize(&header[5..]).map_err(|e| DistWalletError::CorruptionError {
            reason: format!("failed to deserialize export header: {e}"),
        })?;
    let params = Argon2Params {
        m_cost: body.m_cost,
        t_cost: body.t_cost,
        p_cost: body.p_cost,
    };
    params.check().map_err(|e| DistWalletError::CorruptionError {
        reason: e.reason().to_string(),
    })?;

    let key = argon2id_derive_key(passphrase, &body.salt, &params)?;
    let nonce = AeadNonce::from_bytes(body.nonce);
    decrypt_xchacha20(key.as_bytes(), &nonce, ciphertext, header).map_err(|_| {
        DistWalletError::AuthenticationError {
            reason: "incorrect passphrase".into(),
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
