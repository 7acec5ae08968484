//! Cryptographic primitives for distributed wallets.
//!
//! This crate is the only place in the workspace that touches raw
//! cryptography. The wallet core sees it through three seams: the key
//! types in [`keys`], the [`encryptor::Encryptor`] capability that
//! protects individual secrets, and the [`export_cipher`] function pair
//! that protects whole-wallet dumps.
//!
//! # Modules
//!
//! - [`keys`]: Ed25519 secret/public keys, signatures and hex codec
//! - [`kdf`]: Argon2id passphrase stretching
//! - [`aead`]: XChaCha20-Poly1305 authenticated encryption
//! - [`encryptor`]: `Encryptor` trait and the keystore implementation
//! - [`export_cipher`]: passphrase envelope for wallet exports

pub mod aead;
pub mod encryptor;
pub mod export_cipher;
pub mod kdf;
pub mod keys;
