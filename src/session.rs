//! Deploy session: ledger cache, pending set, validity checks, and sync.
//!
//! A session spans one deploy run. Each environment's ledger is fetched at
//! most once per session and never refreshed; migrations first seen as
//! unapplied accumulate in the pending set until [`DeploySession::update`]
//! merges them into the target's ledger and replaces the remote copy.
use crate::config::{validate_version, LedgerConfig};
use crate::ledger::{self, identify, Ledger, LedgerEntry, PendingSet};
use crate::remote::{self, Transport};
use crate::util::now_rfc3339;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// A migration that was already applied but whose content has since changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftNotice {
    pub file: String,
    pub applied_at: String,
    pub version: Option<String>,
}

impl DriftNotice {
    /// Operator-facing line matching the deploy log convention.
    pub fn message(&self) -> String {
        format!(
            "# File \"{}\" was run on \"{}\" while deploying \"{}\", but looks like file has been changed.",
            self.file,
            self.applied_at,
            self.version.as_deref().unwrap_or("unknown")
        )
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub env: String,
    pub entries: usize,
    pub recorded: usize,
}

pub struct DeploySession<'a> {
    config: &'a LedgerConfig,
    transport: &'a dyn Transport,
    target: Option<String>,
    version: Option<String>,
    ledgers: HashMap<String, Ledger>,
    pending: PendingSet,
    drift: Vec<DriftNotice>,
}

impl<'a> DeploySession<'a> {
    /// Start a session against `target`, or against nothing when `None`.
    ///
    /// A named target must exist in the config. `version` overrides
    /// `build.version`.
    pub fn new(
        config: &'a LedgerConfig,
        transport: &'a dyn Transport,
        target: Option<&str>,
        version: Option<&str>,
    ) -> Result<Self> {
        if let Some(name) = target {
            config.env(name)?;
        }
        let version = version
            .map(|v| v.to_string())
            .or_else(|| config.build.version.clone());
        if let Some(version) = version.as_deref() {
            validate_version(version)?;
        }
        Ok(Self {
            config,
            transport,
            target: target.map(|name| name.to_string()),
            version,
            ledgers: HashMap::new(),
            pending: PendingSet::new(),
            drift: Vec::new(),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        self.config
    }

    pub fn target_env(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn drift(&self) -> &[DriftNotice] {
        &self.drift
    }

    /// The ledger for `env`, fetched on first use and cached for the session.
    pub fn ledger(&mut self, env: &str) -> Result<&Ledger> {
        if !self.ledgers.contains_key(env) {
            let env_config = self.config.env(env)?;
            let fetched = remote::fetch(
                self.transport,
                env,
                env_config,
                self.config.ledger_file(),
                self.config.schema(),
            )?;
            self.ledgers.insert(env.to_string(), fetched);
        }
        Ok(&self.ledgers[env])
    }

    /// Decide whether the migration in `file` should run.
    ///
    /// Returns false without touching the remote when no target is set.
    /// Unapplied migrations are recorded as pending on first sight and
    /// return true on every check. Applied ones return false and raise a
    /// drift notice when their content changed.
    pub fn is_valid(&mut self, file: &Path) -> Result<bool> {
        let Some(env) = self.target.clone() else {
            return Ok(false);
        };
        let identity = identify(self.config.schema(), file)?;
        let recorded = self.ledger(&env)?.get(&identity.key).cloned();

        let Some(recorded) = recorded else {
            match self.pending.get(&identity.key) {
                Some(first) => tracing::trace!(
                    key = %identity.key,
                    first_seen = %first.applied_at,
                    "migration already pending"
                ),
                None => {
                    let entry = identity.entry(&now_rfc3339()?, self.version.as_deref());
                    self.pending.record(entry);
                    tracing::debug!(env = %env, key = %identity.key, "migration pending");
                }
            }
            return Ok(true);
        };

        if identity.drifted_from(&recorded) {
            self.report_drift(&identity.name, &recorded);
        }
        tracing::debug!(env = %env, key = %identity.key, "migration already applied");
        Ok(false)
    }

    /// Merge pending migrations into the target's ledger and replace the remote copy.
    ///
    /// No-op returning `None` when no target is set. The pending set is drained
    /// into the cached ledger only after the write succeeds, so calling this
    /// again persists the same content.
    pub fn update(&mut self) -> Result<Option<SyncReport>> {
        let Some(env) = self.target.clone() else {
            return Ok(None);
        };
        if self.pending.is_empty() {
            tracing::debug!(env = %env, "no new migrations; rewriting ledger unchanged");
        }
        let mut merged = self.ledger(&env)?.clone();
        merged.merge(&self.pending);
        let text = ledger::serialize(self.config.schema(), &merged);

        let env_config = self.config.env(&env)?;
        remote::persist(
            self.transport,
            &env,
            env_config,
            self.config.ledger_file(),
            &text,
        )?;

        let report = SyncReport {
            env: env.clone(),
            entries: merged.len(),
            recorded: self.pending.len(),
        };
        tracing::info!(
            env = %env,
            entries = report.entries,
            recorded = report.recorded,
            "synced migration ledger"
        );
        self.ledgers.insert(env, merged);
        self.pending.clear();
        Ok(Some(report))
    }

    fn report_drift(&mut self, name: &str, recorded: &LedgerEntry) {
        let notice = DriftNotice {
            file: name.to_string(),
            applied_at: recorded.applied_at.clone(),
            version: recorded.version.clone(),
        };
        tracing::warn!(
            file = %notice.file,
            applied_at = %notice.applied_at,
            "applied migration changed since it ran"
        );
        if !self.drift.contains(&notice) {
            self.drift.push(notice);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
