//! Per-owner download ledger.
//!
//! One delimited text file per owner under the ledger dir, named
//! `<owner_id>_ledger.csv`. The ledger is advisory: completeness claims are
//! always re-verified against the filesystem before being trusted. Writes go
//! through a whole-file read-modify-rewrite under an exclusive lock, so the
//! file stays consistent even if two runs overlap.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::keep::note::NoteKind;
use crate::keep::warn;

pub const LEDGER_HEADER: &str = "note_id,owner_id,note_kind,title,description,last_touched_at,is_complete,expected_image_count,expected_video_count";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub note_id: String,
    pub owner_id: String,
    pub note_kind: NoteKind,
    pub title: String,
    pub description: String,
    pub last_touched_at: String,
    pub is_complete: bool,
    pub expected_image_count: Option<u32>,
    pub expected_video_count: Option<u32>,
}

pub fn ledger_file(ledger_dir: &Path, owner_id: &str) -> PathBuf {
    ledger_dir.join(format!("{owner_id}_ledger.csv"))
}

/// Create the owner's ledger file with its header if it does not exist yet.
pub fn ensure(ledger_dir: &Path, owner_id: &str) -> Result<PathBuf> {
    fs::create_dir_all(ledger_dir)
        .with_context(|| format!("failed to create {}", ledger_dir.display()))?;
    let path = ledger_file(ledger_dir, owner_id);
    if !path.exists() {
        fs::write(&path, format!("{LEDGER_HEADER}\n"))
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(path)
}

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn flatten_lines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn render_count(count: Option<u32>) -> String {
    count.map(|c| c.to_string()).unwrap_or_default()
}

fn render_row(record: &LedgerRecord) -> String {
    [
        quote_field(&record.note_id),
        quote_field(&record.owner_id),
        record.note_kind.as_str().to_string(),
        quote_field(&flatten_lines(&record.title)),
        quote_field(&flatten_lines(&record.description)),
        quote_field(&record.last_touched_at),
        record.is_complete.to_string(),
        render_count(record.expected_image_count),
        render_count(record.expected_video_count),
    ]
    .join(",")
}

/// Split one CSV row, honoring quoted fields with doubled embedded quotes.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

fn parse_count(field: Option<&String>) -> Option<u32> {
    field.and_then(|f| f.parse::<u32>().ok())
}

fn parse_row(owner_id: &str, line: &str) -> Option<LedgerRecord> {
    let fields = split_row(line);
    if fields.len() < 7 {
        warn::emit(
            "ledger_row_malformed",
            "ledger_read",
            fields.first().map(String::as_str).unwrap_or(""),
            owner_id,
            "",
            "fewer_than_7_columns",
        );
        return None;
    }
    Some(LedgerRecord {
        note_id: fields[0].clone(),
        owner_id: fields[1].clone(),
        note_kind: NoteKind::parse(&fields[2]),
        title: fields[3].clone(),
        description: fields[4].clone(),
        last_touched_at: fields[5].clone(),
        is_complete: fields[6].eq_ignore_ascii_case("true"),
        expected_image_count: parse_count(fields.get(7)),
        expected_video_count: parse_count(fields.get(8)),
    })
}

/// All records in one owner's ledger. Malformed rows are skipped with a
/// warn, never an error; a missing file reads as empty.
pub fn read_records(ledger_dir: &Path, owner_id: &str) -> Result<Vec<LedgerRecord>> {
    let path = ledger_file(ledger_dir, owner_id);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut records = Vec::new();
    for line in raw.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(record) = parse_row(owner_id, line) {
            records.push(record);
        }
    }
    Ok(records)
}

pub fn lookup(ledger_dir: &Path, owner_id: &str, note_id: &str) -> Result<Option<LedgerRecord>> {
    let records = read_records(ledger_dir, owner_id)?;
    Ok(records.into_iter().find(|r| r.note_id == note_id))
}

fn lock_file(ledger_dir: &Path, owner_id: &str) -> PathBuf {
    ledger_dir.join(format!("{owner_id}_ledger.lock"))
}

/// Insert or update one record, keyed by `note_id`, rewriting the whole file
/// atomically under an exclusive lock. The lock lives on a stable sidecar
/// file: the data file's inode is replaced by rename on every write, so a
/// lock on it would not serialize queued writers.
pub fn upsert(ledger_dir: &Path, record: &LedgerRecord) -> Result<()> {
    let path = ensure(ledger_dir, &record.owner_id)?;
    let lock_path = lock_file(ledger_dir, &record.owner_id);
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("failed to open {}", lock_path.display()))?;
    lock.lock_exclusive()
        .with_context(|| format!("failed to lock {}", lock_path.display()))?;

    let result = upsert_locked(ledger_dir, &path, record);
    let _ = fs2::FileExt::unlock(&lock);
    result
}

fn upsert_locked(ledger_dir: &Path, path: &Path, record: &LedgerRecord) -> Result<()> {
    let mut records = read_records(ledger_dir, &record.owner_id)?;
    match records.iter_mut().find(|r| r.note_id == record.note_id) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }

    let mut tmp = NamedTempFile::new_in(ledger_dir)
        .with_context(|| format!("failed to create temp file in {}", ledger_dir.display()))?;
    writeln!(tmp, "{LEDGER_HEADER}")
        .with_context(|| format!("failed to write {}", path.display()))?;
    for row in &records {
        writeln!(tmp, "{}", render_row(row))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Owner ids that have a ledger file, from the `<owner_id>_ledger.csv` names.
pub fn scan_all_owners(ledger_dir: &Path) -> Result<Vec<String>> {
    if !ledger_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(ledger_dir)
        .with_context(|| format!("failed to read {}", ledger_dir.display()))?;
    let mut owners = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", ledger_dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(owner_id) = name.strip_suffix("_ledger.csv")
            && !owner_id.is_empty()
        {
            owners.push(owner_id.to_string());
        }
    }
    owners.sort();
    Ok(owners)
}

/// Look a note up across every owner's ledger, for refs whose owner is not
/// yet known. Returns on the first hit.
pub fn find_anywhere(ledger_dir: &Path, note_id: &str) -> Result<Option<LedgerRecord>> {
    for owner_id in scan_all_owners(ledger_dir)? {
        if let Some(record) = lookup(ledger_dir, &owner_id, note_id)? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}
