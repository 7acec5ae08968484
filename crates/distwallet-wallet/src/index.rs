//! Name ↔ ID index of a wallet's accounts.
//!
//! The index is a cache over the account records: it is persisted as a
//! single record so lookups by name do not need to scan every account,
//! and it can always be rebuilt from the records themselves.
//!
//! # Wire format
//!
//! ```json
//! [{"uuid": "<uuid>", "name": "<name>"}, ...]
//! ```

use std::collections::{BTreeMap, HashMap};

use distwallet_types::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::validation;

#[derive(Serialize, Deserialize)]
struct IndexEntry {
    uuid: Uuid,
    name: String,
}

/// Bidirectional account name ↔ ID map for one wallet.
#[derive(Clone, Debug, Default)]
pub struct Index {
    by_id: BTreeMap<Uuid, String>,
    by_name: HashMap<String, Uuid>,
}

impl Index {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the ID of the account called `name`.
    pub fn id(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(name).copied()
    }

    /// Looks up the name of the account with `id`.
    pub fn name(&self, id: Uuid) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Iterates `(id, name)` pairs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &str)> {
        self.by_id.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Number of indexed accounts.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if no account is indexed.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Adds (or renames) an account.
    pub(crate) fn add(&mut self, id: Uuid, name: &str) {
        if let Some(previous) = self.by_id.insert(id, name.to_string()) {
            self.by_name.remove(&previous);
        }
        self.by_name.insert(name.to_string(), id);
    }

    /// Removes an account. Only used to roll back a failed import.
    pub(crate) fn remove(&mut self, id: Uuid) {
        if let Some(name) = self.by_id.remove(&id) {
            self.by_name.remove(&name);
        }
    }

    /// Encodes the index record.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let entries: Vec<IndexEntry> = self
            .by_id
            .iter()
            .map(|(id, name)| IndexEntry {
                uuid: *id,
                name: name.clone(),
            })
            .collect();
        serde_json::to_vec(&entries).map_err(|e| validation(format!("failed to encode account index: {e}")))
    }

    /// Decodes an index record.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let entries: Vec<IndexEntry> = serde_json::from_slice(data)
            .map_err(|e| validation(format!("account index invalid: {e}")))?;
        let mut index = Self::new();
        for entry in entries {
            index.add(entry.uuid, &entry.name);
        }
        Ok(index)
    }
}
