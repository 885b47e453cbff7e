//! Remote ledger store.
//!
//! The ledger is a single text file under the environment root. It is read
//! and replaced wholesale through remote shell commands; there is no lock and
//! no version check, so concurrent writers to one environment race and the
//! last write wins.
use crate::config::{EnvConfig, TransportConfig};
use crate::ledger::{self, Ledger, Schema};
use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Executes a shell script on a remote host and returns its stdout.
pub trait Transport {
    /// Run `script` on `destination`, feeding `stdin` when given.
    ///
    /// A non-zero exit is an error.
    fn run(&self, destination: &str, script: &str, stdin: Option<&str>) -> Result<String>;
}

/// Transport backed by an ssh-compatible program.
///
/// The program is looked up on first use so commands that never reach a
/// remote host work without it installed.
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
    args: Vec<String>,
}

impl SshTransport {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn resolve_program(&self) -> Result<PathBuf> {
        which::which(&self.program)
            .with_context(|| format!("locate transport program {:?}", self.program))
    }
}

impl Transport for SshTransport {
    fn run(&self, destination: &str, script: &str, stdin: Option<&str>) -> Result<String> {
        let program = self.resolve_program()?;
        let start = Instant::now();
        let mut child = Command::new(&program)
            .args(&self.args)
            .arg(destination)
            .arg(script)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", program.display()))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .with_context(|| format!("write stdin for {destination}"))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("wait for {}", program.display()))?;
        tracing::debug!(
            destination,
            elapsed_ms = start.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            "remote command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "remote command on {destination} failed with status {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        String::from_utf8(output.stdout).context("decode remote stdout as UTF-8")
    }
}

/// Script printing the ledger, or nothing when the file does not exist.
pub fn read_script(root: &str, ledger_file: &str) -> String {
    let file = shell_words::quote(ledger_file);
    format!(
        "cd {} && if [ -f {file} ]; then cat {file}; fi",
        shell_words::quote(root)
    )
}

/// Script replacing the ledger with stdin via a sibling temp file.
pub fn write_script(root: &str, ledger_file: &str) -> String {
    let file = shell_words::quote(ledger_file);
    let temp_name = format!("{ledger_file}.tmp");
    let temp = shell_words::quote(&temp_name);
    format!(
        "cd {} && cat > {temp} && mv -f {temp} {file}",
        shell_words::quote(root)
    )
}

/// Fetch and parse an environment's ledger. A missing file is an empty ledger.
pub fn fetch(
    transport: &dyn Transport,
    env_name: &str,
    env: &EnvConfig,
    ledger_file: &str,
    schema: Schema,
) -> Result<Ledger> {
    let text = transport
        .run(&env.ssh, &read_script(&env.root, ledger_file), None)
        .with_context(|| format!("fetch migration ledger for {env_name}"))?;
    let parsed = ledger::parse(schema, &text);
    if parsed.dropped_lines > 0 {
        tracing::debug!(
            env = env_name,
            dropped = parsed.dropped_lines,
            "ignored malformed ledger lines"
        );
    }
    if parsed.ledger.is_empty() {
        tracing::info!(env = env_name, "no migrations recorded yet");
    } else {
        tracing::info!(env = env_name, entries = parsed.ledger.len(), "fetched ledger");
    }
    Ok(parsed.ledger)
}

/// Replace an environment's ledger with `text`.
pub fn persist(
    transport: &dyn Transport,
    env_name: &str,
    env: &EnvConfig,
    ledger_file: &str,
    text: &str,
) -> Result<()> {
    transport
        .run(&env.ssh, &write_script(&env.root, ledger_file), Some(text))
        .with_context(|| format!("persist migration ledger for {env_name}"))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTransport;
    use super::*;
    use crate::ledger::MigrationKey;

    fn env() -> EnvConfig {
        EnvConfig {
            ssh: "deploy@host".to_string(),
            root: "/srv/my app".to_string(),
        }
    }

    #[test]
    fn scripts_quote_root_and_file() {
        let read = read_script("/srv/my app", ".z.migrations");
        assert_eq!(
            read,
            "cd '/srv/my app' && if [ -f .z.migrations ]; then cat .z.migrations; fi"
        );
        let write = write_script("/srv/app", ".z.migrations");
        assert_eq!(
            write,
            "cd /srv/app && cat > .z.migrations.tmp && mv -f .z.migrations.tmp .z.migrations"
        );
    }

    #[test]
    fn fetch_of_absent_ledger_is_empty() {
        let transport = MemoryTransport::new();
        let ledger = fetch(&transport, "prod", &env(), ".z.migrations", Schema::NameHash)
            .expect("fetch");
        assert!(ledger.is_empty());
        assert_eq!(transport.reads(), 1);
    }

    #[test]
    fn fetch_parses_remote_text() {
        let transport =
            MemoryTransport::with_ledger(
                "deploy@host",
                "/srv/my app",
                "abc123 2024-01-01T00:00:00+00:00\n",
            );
        let ledger = fetch(&transport, "prod", &env(), ".z.migrations", Schema::NameHash)
            .expect("fetch");
        assert!(ledger.get(&MigrationKey::new("abc123")).is_some());
        let call = &transport.calls()[0];
        assert_eq!(call.destination, "deploy@host");
        assert!(call.script.starts_with("cd '/srv/my app' && "));
    }

    #[test]
    fn persist_sends_full_text_on_stdin() {
        let transport = MemoryTransport::with_ledger("deploy@host", "/srv/my app", "old\n");
        persist(&transport, "prod", &env(), ".z.migrations", "new 1\n").expect("persist");
        assert_eq!(transport.writes(), vec!["new 1\n".to_string()]);
        assert_eq!(
            transport.ledger("deploy@host", "/srv/my app").as_deref(),
            Some("new 1\n")
        );
    }

    #[test]
    fn same_host_different_roots_keep_separate_ledgers() {
        let transport = MemoryTransport::new();
        let other = EnvConfig {
            ssh: "deploy@host".to_string(),
            root: "/srv/other".to_string(),
        };
        persist(&transport, "prod", &env(), ".z.migrations", "a 1\n").expect("persist");
        persist(&transport, "qa", &other, ".z.migrations", "b 2\n").expect("persist");

        assert_eq!(
            transport.ledger("deploy@host", "/srv/my app").as_deref(),
            Some("a 1\n")
        );
        assert_eq!(
            transport.ledger("deploy@host", "/srv/other").as_deref(),
            Some("b 2\n")
        );
        let ledger = fetch(&transport, "qa", &other, ".z.migrations", Schema::NameHash)
            .expect("fetch");
        assert!(ledger.get(&MigrationKey::new("b")).is_some());
        assert!(ledger.get(&MigrationKey::new("a")).is_none());
    }

    #[test]
    fn transport_failures_propagate_with_context() {
        let transport = MemoryTransport::new();
        transport.fail_next();
        let err = fetch(&transport, "prod", &env(), ".z.migrations", Schema::ContentHash)
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("fetch migration ledger for prod"), "{message}");
        assert!(message.contains("connection refused"), "{message}");
    }

    #[cfg(unix)]
    #[test]
    fn ssh_transport_reports_non_zero_exit() {
        let transport = SshTransport {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        };
        let err = transport.run("ignored", "ignored", None).unwrap_err();
        assert!(err.to_string().contains("boom"), "{err}");
    }
}
