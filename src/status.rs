//! Status report: local migration files cross-referenced with a ledger.
//!
//! Reporting is read-only. It uses the session's cached ledger and never
//! records pending migrations or syncs.
use crate::ledger::{identify, Schema};
use crate::session::DeploySession;
use crate::util::display_path;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

const DRIFT_COMMENT: &str = "Migration was executed but looks like file has been changed.";

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub env: String,
    pub schema: Schema,
    pub rows: Vec<StatusRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub file: String,
    pub path: PathBuf,
    pub key: String,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub drift: bool,
}

impl StatusReport {
    pub fn executed_count(&self) -> usize {
        self.rows.iter().filter(|row| row.executed).count()
    }

    pub fn pending_count(&self) -> usize {
        self.rows.len() - self.executed_count()
    }
}

/// Build a report for `files` against the ledger of `env`.
pub fn list(session: &mut DeploySession<'_>, env: &str, files: &[PathBuf]) -> Result<StatusReport> {
    let schema = session.config().schema();
    let ledger = session.ledger(env)?;
    let mut rows = Vec::with_capacity(files.len());
    for path in files {
        let identity = identify(schema, path)?;
        let row = match ledger.get(&identity.key) {
            Some(entry) => StatusRow {
                file: identity.name.clone(),
                path: path.clone(),
                key: identity.key.as_str().to_string(),
                executed: true,
                content_hash: entry.content_hash.clone(),
                applied_at: Some(entry.applied_at.clone()),
                version: entry.version.clone(),
                drift: identity.drifted_from(entry),
            },
            None => StatusRow {
                file: identity.name.clone(),
                path: path.clone(),
                key: identity.key.as_str().to_string(),
                executed: false,
                content_hash: None,
                applied_at: None,
                version: None,
                drift: false,
            },
        };
        rows.push(row);
    }
    Ok(StatusReport {
        env: env.to_string(),
        schema,
        rows,
    })
}

/// Render the report as an aligned plain-text table.
pub fn render_table(report: &StatusReport, base: Option<&Path>) -> String {
    let header = ["file", "ref", "executed", "date", "deploy version", "comment"];
    let mut table: Vec<[String; 6]> = vec![header.map(str::to_string)];
    for row in &report.rows {
        let file = if row.executed {
            row.file.clone()
        } else {
            display_path(&row.path, base)
        };
        table.push([
            file,
            row.content_hash.clone().unwrap_or_default(),
            if row.executed { "yes" } else { "no" }.to_string(),
            row.applied_at.clone().unwrap_or_default(),
            row.version.clone().unwrap_or_default(),
            if row.drift {
                DRIFT_COMMENT.to_string()
            } else {
                String::new()
            },
        ]);
    }

    let mut widths = [0usize; 6];
    for cells in &table {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for cells in &table {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&format!(
        "{}: {} executed, {} pending\n",
        report.env,
        report.executed_count(),
        report.pending_count()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::remote::testing::MemoryTransport;
    use crate::util::sha1_hex;

    const CONFIG: &str = "\
migrations:
  path: migrations/*.yml
envs:
  production:
    ssh: deploy@prod
    root: /srv/prod
";

    fn fixture() -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for (name, body) in [("001.yml", "a"), ("002.yml", "b-edited"), ("003.yml", "c")] {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            files.push(path);
        }
        (dir, files)
    }

    fn ledger_text() -> String {
        format!(
            "001.yml {} 2024-01-01T00:00:00Z v1\n002.yml {} 2024-01-02T00:00:00Z v2\n",
            sha1_hex(b"a"),
            sha1_hex(b"b")
        )
    }

    #[test]
    fn rows_mark_executed_pending_and_drift() {
        let (_dir, files) = fixture();
        let config = parse_config(CONFIG).unwrap();
        let transport = MemoryTransport::with_ledger("deploy@prod", "/srv/prod", &ledger_text());
        let mut session = DeploySession::new(&config, &transport, None, None).unwrap();

        let report = list(&mut session, "production", &files).unwrap();

        assert_eq!(report.rows.len(), 3);
        let first = &report.rows[0];
        assert!(first.executed && !first.drift);
        assert_eq!(first.version.as_deref(), Some("v1"));
        let second = &report.rows[1];
        assert!(second.executed && second.drift);
        let third = &report.rows[2];
        assert!(!third.executed);
        assert_eq!(third.applied_at, None);
        assert_eq!(report.executed_count(), 2);
        assert_eq!(report.pending_count(), 1);
    }

    #[test]
    fn listing_is_read_only() {
        let (_dir, files) = fixture();
        let config = parse_config(CONFIG).unwrap();
        let transport = MemoryTransport::with_ledger("deploy@prod", "/srv/prod", &ledger_text());
        let mut session =
            DeploySession::new(&config, &transport, Some("production"), None).unwrap();

        list(&mut session, "production", &files).unwrap();

        assert!(session.pending().is_empty());
        assert!(transport.writes().is_empty());
        assert_eq!(transport.reads(), 1);
    }

    #[test]
    fn table_aligns_columns_and_summarizes() {
        let (dir, files) = fixture();
        let config = parse_config(CONFIG).unwrap();
        let transport = MemoryTransport::with_ledger("deploy@prod", "/srv/prod", &ledger_text());
        let mut session = DeploySession::new(&config, &transport, None, None).unwrap();
        let report = list(&mut session, "production", &files).unwrap();

        let table = render_table(&report, Some(dir.path()));
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("file     ref"), "{table}");
        assert!(lines[2].ends_with(DRIFT_COMMENT), "{table}");
        assert!(lines[3].starts_with("003.yml"), "{table}");
        assert!(lines[3].contains("no"), "{table}");
        assert_eq!(lines[4], "production: 2 executed, 1 pending");
    }

    #[test]
    fn report_serializes_to_json() {
        let (_dir, files) = fixture();
        let config = parse_config(CONFIG).unwrap();
        let transport = MemoryTransport::with_ledger("deploy@prod", "/srv/prod", &ledger_text());
        let mut session = DeploySession::new(&config, &transport, None, None).unwrap();
        let report = list(&mut session, "production", &files).unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["schema"], "content-hash");
        assert_eq!(value["rows"][1]["drift"], true);
        assert!(value["rows"][2].get("applied_at").is_none());
    }
}
