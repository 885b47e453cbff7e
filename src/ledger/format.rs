//! Plain-text ledger wire format.
//!
//! One entry per line, fields separated by a single space. Parsing tolerates
//! the column-aligned output older deploys wrote, so any whitespace run
//! separates fields.
use super::{Ledger, LedgerEntry, MigrationKey, Schema};

/// Written in place of an absent optional field.
pub const ABSENT_FIELD: &str = "-";

/// A parsed ledger plus the number of lines that were discarded.
#[derive(Debug, Clone, Default)]
pub struct ParsedLedger {
    pub ledger: Ledger,
    pub dropped_lines: usize,
}

/// Parse ledger text. Lines with the wrong field count are dropped, not reported.
pub fn parse(schema: Schema, text: &str) -> ParsedLedger {
    let mut parsed = ParsedLedger::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != schema.field_count() {
            parsed.dropped_lines += 1;
            continue;
        }
        parsed.ledger.insert(entry_from_fields(schema, &fields));
    }
    parsed
}

/// Render a ledger in the layout of `schema`, one line per entry.
pub fn serialize(schema: Schema, ledger: &Ledger) -> String {
    let mut out = String::new();
    for entry in ledger.entries() {
        out.push_str(&fields_for_entry(schema, entry).join(" "));
        out.push('\n');
    }
    out
}

fn entry_from_fields(schema: Schema, fields: &[&str]) -> LedgerEntry {
    match schema {
        Schema::ContentHash => LedgerEntry {
            key: MigrationKey::new(fields[0]),
            content_hash: optional_field(fields[1]),
            applied_at: fields[2].to_string(),
            version: optional_field(fields[3]),
        },
        Schema::NameHash => LedgerEntry {
            key: MigrationKey::new(fields[0]),
            applied_at: fields[1].to_string(),
            content_hash: None,
            version: None,
        },
    }
}

fn fields_for_entry(schema: Schema, entry: &LedgerEntry) -> Vec<String> {
    match schema {
        Schema::ContentHash => vec![
            entry.key.to_string(),
            field_or_absent(entry.content_hash.as_deref()),
            field_or_absent(Some(&entry.applied_at)),
            field_or_absent(entry.version.as_deref()),
        ],
        Schema::NameHash => vec![
            entry.key.to_string(),
            field_or_absent(Some(&entry.applied_at)),
        ],
    }
}

fn optional_field(raw: &str) -> Option<String> {
    (raw != ABSENT_FIELD).then(|| raw.to_string())
}

// A field with embedded whitespace would shift every later column on reparse.
fn field_or_absent(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => value.split_whitespace().collect::<Vec<_>>().join("_"),
        _ => ABSENT_FIELD.to_string(),
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
