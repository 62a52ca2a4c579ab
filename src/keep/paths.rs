use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Filesystem roots the rest of the crate works under.
#[derive(Debug, Clone)]
pub struct KeepPaths {
    pub keep_home: PathBuf,
    pub media_dir: PathBuf,
    pub ledger_dir: PathBuf,
    pub logs_dir: PathBuf,
}

fn env_or_default_path(var: &str, default: PathBuf) -> PathBuf {
    match env::var_os(var) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => default,
    }
}

pub fn resolve_paths() -> Result<KeepPaths> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let keep_home = env_or_default_path("NOTEKEEP_HOME", home.join(".notekeep"));
    let media_dir = env_or_default_path("NOTEKEEP_MEDIA_DIR", keep_home.join("media"));
    let ledger_dir = env_or_default_path("NOTEKEEP_LEDGER_DIR", keep_home.join("ledgers"));
    let logs_dir = env_or_default_path("NOTEKEEP_LOGS_DIR", keep_home.join("logs"));
    Ok(KeepPaths {
        keep_home,
        media_dir,
        ledger_dir,
        logs_dir,
    })
}
