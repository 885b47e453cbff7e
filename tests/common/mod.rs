//! Shared test infrastructure for integration tests.
//!
//! A fixture is a throwaway project directory plus a "remote" directory. The
//! configured transport is a stand-in ssh script that drops the destination
//! and runs the remote script locally, so the real ledger protocol runs end
//! to end against the filesystem.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FAKE_SSH: &str = "#!/bin/sh\nshift\nexec sh -c \"$1\"\n";

/// Result of one `mledger` invocation.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

pub struct Project {
    _temp: TempDir,
    pub root: PathBuf,
    pub remote: PathBuf,
}

impl Project {
    /// Create a project with a config targeting environment `local`.
    pub fn new() -> anyhow::Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().join("project");
        let remote = temp.path().join("remote");
        std::fs::create_dir_all(root.join("migrations"))?;
        std::fs::create_dir_all(&remote)?;

        let ssh = temp.path().join("fake-ssh");
        std::fs::write(&ssh, FAKE_SSH)?;
        std::fs::set_permissions(&ssh, std::fs::Permissions::from_mode(0o755))?;

        let config = format!(
            "migrations:\n  path: migrations/*.yml\nenvs:\n  local:\n    ssh: fake-host\n    root: {}\ntransport:\n  program: {}\n",
            remote.display(),
            ssh.display()
        );
        std::fs::write(root.join("mledger.yml"), config)?;
        Ok(Self {
            _temp: temp,
            root,
            remote,
        })
    }

    /// Write a migration definition whose deploy job appends `marker` to executed.log.
    pub fn add_migration(&self, name: &str, marker: &str) -> PathBuf {
        let path = self.root.join("migrations").join(name);
        let body = format!("deploy:\n  post: echo {marker} >> executed.log\n");
        std::fs::write(&path, body).expect("write migration");
        path
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.remote.join(".z.migrations")
    }

    pub fn ledger(&self) -> Option<String> {
        std::fs::read_to_string(self.ledger_path()).ok()
    }

    pub fn write_ledger(&self, text: &str) {
        std::fs::write(self.ledger_path(), text).expect("write ledger");
    }

    /// Lines appended by migration jobs, in run order.
    pub fn executed(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("executed.log"))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn run(&self, args: &[&str]) -> RunResult {
        let config = self.root.join("mledger.yml");
        Command::new(env!("CARGO_BIN_EXE_mledger"))
            .arg("--config")
            .arg(&config)
            .args(args)
            .current_dir(&self.root)
            .env_remove("MLEDGER_ENV")
            .env_remove("MLEDGER_CONFIG")
            .env_remove("RUST_LOG")
            .output()
            .expect("spawn mledger")
            .into()
    }
}

pub fn relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
