//! Project configuration for the migration ledger.
//!
//! The config is a YAML file naming the migration glob, the ledger layout,
//! and the deploy environments the ledger lives in.
use crate::ledger::{Schema, DEFAULT_LEDGER_FILE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "mledger.yml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub envs: BTreeMap<String, EnvConfig>,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Directory relative migration globs are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Glob locating migration definition files.
    pub path: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

/// A deploy target: where its ledger lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    pub ssh: String,
    pub root: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default = "default_transport_program")]
    pub program: String,
    /// Extra arguments placed before the destination.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: default_transport_program(),
            args: Vec::new(),
        }
    }
}

fn default_ledger_file() -> String {
    DEFAULT_LEDGER_FILE.to_string()
}

fn default_transport_program() -> String {
    "ssh".to_string()
}

/// Resolve the config location from an explicit path or the default name.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<LedgerConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config = parse_config(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    config.base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(config)
}

/// Parse and validate config text. `base_dir` is left as the current directory.
pub fn parse_config(text: &str) -> Result<LedgerConfig> {
    let mut config: LedgerConfig = serde_yaml::from_str(text).context("parse config YAML")?;
    config.base_dir = PathBuf::from(".");
    validate_config(&config)?;
    Ok(config)
}

/// Validate user-provided values that the ledger format or transport depend on.
pub fn validate_config(config: &LedgerConfig) -> Result<()> {
    if config.migrations.path.trim().is_empty() {
        return Err(anyhow!("migrations.path must be non-empty"));
    }
    validate_ledger_file(&config.migrations.ledger_file)?;
    for (name, env) in &config.envs {
        if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
            return Err(anyhow!("env names must not contain whitespace (got {name:?})"));
        }
        if env.ssh.trim().is_empty() {
            return Err(anyhow!("envs.{name}.ssh must be non-empty"));
        }
        if env.root.trim().is_empty() {
            return Err(anyhow!("envs.{name}.root must be non-empty"));
        }
    }
    if let Some(version) = config.build.version.as_deref() {
        validate_version(version)?;
    }
    if config.transport.program.trim().is_empty() {
        return Err(anyhow!("transport.program must be non-empty"));
    }
    Ok(())
}

/// Versions are stored as a single ledger field.
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        return Err(anyhow!(
            "deploy version must be a non-empty token without whitespace (got {version:?})"
        ));
    }
    Ok(())
}

fn validate_ledger_file(name: &str) -> Result<()> {
    let path = Path::new(name);
    let is_plain = path.components().count() == 1
        && matches!(path.components().next(), Some(std::path::Component::Normal(_)));
    if name.trim().is_empty() || !is_plain || name.chars().any(char::is_whitespace) {
        return Err(anyhow!(
            "migrations.ledger_file must be a plain file name (got {name:?})"
        ));
    }
    Ok(())
}

impl LedgerConfig {
    pub fn schema(&self) -> Schema {
        self.migrations.schema
    }

    pub fn ledger_file(&self) -> &str {
        &self.migrations.ledger_file
    }

    /// Look up a named environment. Unknown names are configuration errors.
    pub fn env(&self, name: &str) -> Result<&EnvConfig> {
        self.envs.get(name).ok_or_else(|| {
            let known = self.envs.keys().cloned().collect::<Vec<_>>().join(", ");
            anyhow!("unknown environment {name:?} (configured: {known})")
        })
    }

    /// Migration glob with relative patterns anchored at the config directory.
    pub fn migration_pattern(&self) -> String {
        let pattern = Path::new(&self.migrations.path);
        if pattern.is_absolute() {
            self.migrations.path.clone()
        } else {
            self.base_dir.join(pattern).to_string_lossy().to_string()
        }
    }

    /// Migration definition files matching the configured glob, sorted by path.
    pub fn discover_migrations(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.migration_pattern();
        let entries = glob::glob(&pattern)
            .with_context(|| format!("invalid migrations.path glob {pattern:?}"))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("read migrations glob entry")?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
