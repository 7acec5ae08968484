//! Core shared types for distributed (threshold) signing wallets.
//!
//! This crate defines the error taxonomy and configuration shared by
//! every crate in the workspace. It deliberately has no cryptographic
//! or storage dependencies so the lower layers can all depend on it.

pub mod config;

use thiserror::Error;

// ---------------------------------------------------------------------------
// DistWalletError
// ---------------------------------------------------------------------------

/// Central error type for the distributed wallet system.
///
/// All crates in the workspace convert their internal errors into variants
/// of this enum. Each variant corresponds to one failure class:
///
/// | Variant | Raised when |
/// |---------|-------------|
/// | `ValidationError` | an input or record field is missing or malformed |
/// | `ConflictError` | a wallet or account name is already taken |
/// | `AuthenticationError` | a passphrase is wrong or a decrypted key does not match |
/// | `StateError` | the operation needs an unlocked entity or a missing capability |
/// | `CorruptionError` | a persisted record cannot be parsed |
/// | `NotFound` | a lookup by name or ID has no result |
#[derive(Debug, Error)]
pub enum DistWalletError {
    /// A required input or record field is missing or has the wrong shape.
    #[error("validation error: {reason}")]
    ValidationError {
        /// Names the offending field.
        reason: String,
    },

    /// A wallet or account with the same name already exists.
    #[error("conflict: {reason}")]
    ConflictError {
        /// Names the duplicated entity.
        reason: String,
    },

    /// A passphrase did not decrypt a secret, or the decrypted secret
    /// does not belong to the stored public key.
    #[error("authentication failed: {reason}")]
    AuthenticationError {
        /// Deliberately coarse description; never carries the cause of
        /// a decryption failure.
        reason: String,
    },

    /// The operation requires a state the entity is not in (locked
    /// wallet or account), or a store capability the backend lacks.
    #[error("invalid state: {reason}")]
    StateError {
        /// Human-readable description of the missing precondition.
        reason: String,
    },

    /// A persisted record could not be parsed.
    #[error("corrupt record: {reason}")]
    CorruptionError {
        /// Names the record and the first invalid field.
        reason: String,
    },

    /// A wallet, account, index or batch was not found.
    #[error("not found: {reason}")]
    NotFound {
        /// Describes what was looked up.
        reason: String,
    },

    /// A cryptographic primitive failed (key parsing, KDF, AEAD).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A storage backend operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

impl DistWalletError {
    /// Returns the human-readable reason carried by any variant.
    pub fn reason(&self) -> &str {
        match self {
            Self::ValidationError { reason }
            | Self::ConflictError { reason }
            | Self::AuthenticationError { reason }
            | Self::StateError { reason }
            | Self::CorruptionError { reason }
            | Self::NotFound { reason }
            | Self::CryptoError { reason }
            | Self::StorageError { reason }
            | Self::ConfigError { reason } => reason,
        }
    }

    /// Re-labels a record-parsing failure as corruption of persisted data.
    ///
    /// Validation errors raised while parsing a stored record keep their
    /// field-naming reason but become [`DistWalletError::CorruptionError`].
    /// Every other variant passes through untouched.
    pub fn into_corruption(self, context: &str) -> Self {
        match self {
            Self::ValidationError { reason } | Self::CorruptionError { reason } => {
                Self::CorruptionError {
                    reason: format!("{context}: {reason}"),
                }
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`DistWalletError`].
pub type Result<T> = std::result::Result<T, DistWalletError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
