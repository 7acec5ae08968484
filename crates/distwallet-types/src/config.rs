//! Library configuration with sensible defaults.
//!
//! Two groups of knobs exist: how a [`WalletConfig`] hands accounts to
//! consumers, and how hard the keystore encryptor works to stretch a
//! passphrase ([`EncryptorConfig`]). Both can be loaded from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DistWalletError, Result};

/// Upper bound for Argon2 memory cost accepted from configuration (4 GiB).
const MAX_M_COST: u32 = 4 * 1024 * 1024;

/// Upper bound for Argon2 iterations and parallelism.
const MAX_LANE_COST: u32 = 64;

// ---------------------------------------------------------------------------
// EncryptorConfig
// ---------------------------------------------------------------------------

/// Argon2id cost parameters used by the keystore encryptor and the
/// export cipher.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 65 536  | Memory usage in KiB (64 MiB) |
/// | `t_cost`  | 3       | Number of iterations |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EncryptorConfig {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for EncryptorConfig {
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl EncryptorConfig {
    /// Validates the cost parameters.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LANE_COST).contains(&self.t_cost) {
            return Err(DistWalletError::ConfigError {
                reason: format!("t_cost must be between 1 and {MAX_LANE_COST}"),
            });
        }
        if !(1..=MAX_LANE_COST).contains(&self.p_cost) {
            return Err(DistWalletError::ConfigError {
                reason: format!("p_cost must be between 1 and {MAX_LANE_COST}"),
            });
        }
        if self.m_cost < 8 * self.p_cost {
            return Err(DistWalletError::ConfigError {
                reason: format!("m_cost must be at least {} KiB", 8 * self.p_cost),
            });
        }
        if self.m_cost > MAX_M_COST {
            return Err(DistWalletError::ConfigError {
                reason: format!("m_cost must not exceed {MAX_M_COST} KiB"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WalletConfig
// ---------------------------------------------------------------------------

/// Wallet runtime configuration.
///
/// Example `wallet.json`:
/// ```json
/// {
///   "account_queue_capacity": 1024,
///   "encryptor": { "m_cost": 65536, "t_cost": 3, "p_cost": 1 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Capacity of the bounded queue between the account enumeration
    /// worker and its consumer.
    pub account_queue_capacity: usize,

    /// KDF costs for newly encrypted secrets.
    pub encryptor: EncryptorConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            account_queue_capacity: 1024,
            encryptor: EncryptorConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.account_queue_capacity == 0 {
            return Err(DistWalletError::ConfigError {
                reason: "account_queue_capacity must be greater than 0".into(),
            });
        }
        self.encryptor.validate()
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| DistWalletError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| DistWalletError::ConfigError {
            reason: format!("failed to parse config file {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }
}
