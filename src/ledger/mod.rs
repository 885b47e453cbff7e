//! Ledger data model for applied migrations.
//!
//! A ledger is a per-environment mapping from migration key to the metadata
//! recorded when that migration was applied. Keys are unique; inserting an
//! existing key replaces its metadata in place.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod format;
pub mod identity;

pub use format::{parse, serialize};
pub use identity::identify;

/// Default ledger file name under an environment root.
pub const DEFAULT_LEDGER_FILE: &str = ".z.migrations";

/// Layout of ledger lines and the identity scheme behind their keys.
///
/// Exactly one schema is active per configuration; ledgers are never sniffed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schema {
    /// `<file name> <content sha1> <applied at> <deploy version>`
    #[default]
    ContentHash,
    /// `<sha256 of file name> <applied at>`
    NameHash,
}

impl Schema {
    /// Number of whitespace-separated fields on one ledger line.
    pub fn field_count(self) -> usize {
        match self {
            Schema::ContentHash => 4,
            Schema::NameHash => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Schema::ContentHash => "content-hash",
            Schema::NameHash => "name-hash",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic identity of a migration within one ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationKey(String);

impl MigrationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: MigrationKey,
    /// Kept verbatim; older ledgers may carry non-RFC 3339 dates.
    pub applied_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// All applied migrations for one environment, in ledger order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: IndexMap<MigrationKey, LedgerEntry>,
}

impl Ledger {
    pub fn get(&self, key: &MigrationKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite by key. Overwrites keep the original position.
    pub fn insert(&mut self, entry: LedgerEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    /// Fold pending entries in; pending wins on key collisions.
    pub fn merge(&mut self, pending: &PendingSet) {
        for entry in pending.entries() {
            self.insert(entry.clone());
        }
    }
}

/// Migrations first seen as unapplied during the current session.
///
/// The first observation of a key is kept; later observations are ignored so
/// the recorded timestamp is the one from the first check.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    entries: IndexMap<MigrationKey, LedgerEntry>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry unless its key is already pending. Returns true when added.
    pub fn record(&mut self, entry: LedgerEntry) -> bool {
        if self.entries.contains_key(&entry.key) {
            return false;
        }
        self.entries.insert(entry.key.clone(), entry);
        true
    }

    pub fn get(&self, key: &MigrationKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
