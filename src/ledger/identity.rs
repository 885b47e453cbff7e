//! Migration identity derivation.
use super::{LedgerEntry, MigrationKey, Schema};
use crate::util::{file_name, sha1_file, sha256_hex};
use anyhow::{anyhow, Result};
use std::path::Path;

/// Key plus the content fingerprint (when the schema records one) of a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub key: MigrationKey,
    pub content_hash: Option<String>,
}

impl Identity {
    /// Build the ledger entry recorded when this migration is applied.
    pub fn entry(&self, applied_at: &str, version: Option<&str>) -> LedgerEntry {
        LedgerEntry {
            key: self.key.clone(),
            applied_at: applied_at.to_string(),
            content_hash: self.content_hash.clone(),
            version: version.map(|v| v.to_string()),
        }
    }

    /// Whether a recorded entry's content hash no longer matches this file.
    ///
    /// Always false when either side lacks a content hash.
    pub fn drifted_from(&self, entry: &LedgerEntry) -> bool {
        match (&self.content_hash, &entry.content_hash) {
            (Some(current), Some(recorded)) => current != recorded,
            _ => false,
        }
    }
}

/// Derive the identity of `path` under `schema`.
///
/// Only the base name takes part in the key; the directory never does.
/// Under the content-hash schema the name is the first ledger field, so names
/// containing whitespace are rejected: they could never be read back.
pub fn identify(schema: Schema, path: &Path) -> Result<Identity> {
    let name = file_name(path)?;
    let identity = match schema {
        Schema::ContentHash if name.chars().any(char::is_whitespace) => {
            return Err(anyhow!(
                "migration file name {name:?} contains whitespace and cannot be recorded in a content-hash ledger"
            ));
        }
        Schema::ContentHash => Identity {
            key: MigrationKey::new(name.clone()),
            content_hash: Some(sha1_file(path)?),
            name,
        },
        Schema::NameHash => Identity {
            key: MigrationKey::new(sha256_hex(name.as_bytes())),
            content_hash: None,
            name,
        },
    };
    Ok(identity)
}
