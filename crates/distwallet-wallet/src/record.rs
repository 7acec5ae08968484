//! Field-by-field validation of JSON records.
//!
//! Records are parsed into a `serde_json::Value` first and then read one
//! field at a time, so the first missing or mistyped field is reported
//! by name instead of as a generic deserialization error.

use distwallet_crypto::keys::PublicKey;
use distwallet_types::{DistWalletError, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Builds a [`DistWalletError::ValidationError`].
pub(crate) fn validation(reason: impl Into<String>) -> DistWalletError {
    DistWalletError::ValidationError {
        reason: reason.into(),
    }
}

/// Parses raw bytes as a JSON document.
pub(crate) fn parse_json(data: &[u8], entity: &str) -> Result<Value> {
    serde_json::from_slice(data).map_err(|e| validation(format!("{entity} record is not valid JSON: {e}")))
}

/// Encodes a JSON document to bytes.
pub(crate) fn to_bytes(value: &Value, entity: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DistWalletError::StorageError {
        reason: format!("failed to encode {entity} record: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Typed accessors over one JSON object.
///
/// Errors read `"<entity> <label> missing"` or `"<entity> <label> invalid"`.
pub(crate) struct Fields<'a> {
    entity: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(entity: &'static str, value: &'a Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| validation(format!("{entity} record is not a JSON object")))?;
        Ok(Self { entity, map })
    }

    pub(crate) fn missing(&self, label: &str) -> DistWalletError {
        validation(format!("{} {label} missing", self.entity))
    }

    pub(crate) fn invalid(&self, label: &str) -> DistWalletError {
        validation(format!("{} {label} invalid", self.entity))
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub(crate) fn value(&self, key: &str, label: &str) -> Result<&'a Value> {
        self.get(key).ok_or_else(|| self.missing(label))
    }

    pub(crate) fn str(&self, key: &str, label: &str) -> Result<&'a str> {
        self.value(key, label)?
            .as_str()
            .ok_or_else(|| self.invalid(label))
    }

    pub(crate) fn uuid(&self, key: &str, label: &str) -> Result<Uuid> {
        Uuid::parse_str(self.str(key, label)?).map_err(|_| self.invalid(label))
    }

    pub(crate) fn u32(&self, key: &str, label: &str) -> Result<u32> {
        self.value(key, label)?
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.invalid(label))
    }

    pub(crate) fn public_key(&self, key: &str, label: &str) -> Result<PublicKey> {
        PublicKey::from_hex(self.str(key, label)?).map_err(|_| self.invalid(label))
    }

    pub(crate) fn array(&self, key: &str, label: &str) -> Result<&'a Vec<Value>> {
        self.value(key, label)?
            .as_array()
            .ok_or_else(|| self.invalid(label))
    }

    pub(crate) fn object(&self, key: &str, label: &str) -> Result<&'a Map<String, Value>> {
        self.value(key, label)?
            .as_object()
            .ok_or_else(|| self.invalid(label))
    }
}
