//! Argon2id passphrase stretching.
//!
//! Derives a 256-bit encryption key from a passphrase and a random salt.
//! Cost parameters travel with every ciphertext so they can be read back
//! from untrusted records; [`Argon2Params::check`] bounds them before any
//! derivation work happens.

use distwallet_types::config::EncryptorConfig;
use distwallet_types::{DistWalletError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the random salt generated for each derivation.
pub const SALT_LEN: usize = 32;

/// Minimum acceptable salt length (the argon2 crate enforces 8 bytes).
const MIN_SALT_LEN: usize = 8;

/// Largest memory cost accepted from a stored record (4 GiB).
const MAX_M_COST: u32 = 4 * 1024 * 1024;

/// Largest iteration count accepted from a stored record.
const MAX_T_COST: u32 = 64;

/// Largest parallelism accepted from a stored record.
const MAX_P_COST: u32 = 64;

// ---------------------------------------------------------------------------
// Argon2Params
// ---------------------------------------------------------------------------

/// Tuning parameters for Argon2id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Argon2Params {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Time cost (number of passes).
    pub t_cost: u32,
    /// Parallelism degree.
    pub p_cost: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        EncryptorConfig::default().into()
    }
}

impl From<EncryptorConfig> for Argon2Params {
    fn from(config: EncryptorConfig) -> Self {
        Self {
            m_cost: config.m_cost,
            t_cost: config.t_cost,
            p_cost: config.p_cost,
        }
    }
}

impl Argon2Params {
    /// Rejects parameters outside the range this crate is willing to run.
    pub fn check(&self) -> Result<()> {
        if self.t_cost == 0 || self.t_cost > MAX_T_COST {
            return Err(DistWalletError::CryptoError {
                reason: format!("argon2 t_cost {} out of range", self.t_cost),
            });
        }
        if self.p_cost == 0 || self.p_cost > MAX_P_COST {
            return Err(DistWalletError::CryptoError {
                reason: format!("argon2 p_cost {} out of range", self.p_cost),
            });
        }
        if self.m_cost < 8 * self.p_cost || self.m_cost > MAX_M_COST {
            return Err(DistWalletError::CryptoError {
                reason: format!("argon2 m_cost {} out of range", self.m_cost),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// 256-bit key derived by Argon2id, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    /// Fixed byte length of the derived key.
    pub const LEN: usize = 32;

    /// Returns the raw key material.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Generates a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives a 256-bit key from `password` and `salt` using Argon2id.
///
/// # Errors
///
/// - [`DistWalletError::CryptoError`] if the salt is shorter than 8
///   bytes, the parameters are out of range, or Argon2 itself fails.
pub fn argon2id_derive_key(
    password: &[u8],
    salt: &[u8],
    params: &Argon2Params,
) -> Result<DerivedKey> {
    if salt.len() < MIN_SALT_LEN {
        return Err(DistWalletError::CryptoError {
            reason: format!(
                "salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            ),
        });
    }
    params.check()?;

    let argon2_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(DerivedKey::LEN),
    )
    .map_err(|e| DistWalletError::CryptoError {
        reason: format!("invalid Argon2 parameters: {e}"),
    })?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| DistWalletError::CryptoError {
            reason: format!("Argon2id derivation failed: {e}"),
        })?;

    Ok(DerivedKey(output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
