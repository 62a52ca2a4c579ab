use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::keep::paths::KeepPaths;
use crate::keep::util;

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Serialize)]
struct AuditEvent<'a> {
    at_epoch_secs: u64,
    phase: &'a str,
    status: &'a str,
    message: &'a str,
}

/// Append one JSONL event to the audit log under the logs dir.
pub fn append_event(paths: &KeepPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: util::now_epoch_secs()?,
        phase,
        status,
        message,
    };
    let line = serde_json::to_string(&event).context("failed to encode audit event")?;
    let path = paths.logs_dir.join(AUDIT_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_append_as_jsonl() {
        let dir = tempdir().unwrap();
        let paths = KeepPaths {
            keep_home: dir.path().to_path_buf(),
            media_dir: dir.path().join("media"),
            ledger_dir: dir.path().join("ledgers"),
            logs_dir: dir.path().join("logs"),
        };
        append_event(&paths, "batch", "ok", "first").unwrap();
        append_event(&paths, "reconcile", "failed", "second").unwrap();

        let raw = fs::read_to_string(paths.logs_dir.join(AUDIT_FILE)).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["phase"], "batch");
        assert_eq!(first["status"], "ok");
        assert!(first["at_epoch_secs"].as_u64().unwrap() > 0);
    }
}
