pub mod archive_notes;
pub mod archive_search;
pub mod archive_user;
pub mod verify;

use std::sync::atomic::AtomicBool;

use anyhow::{Result, bail};

use crate::keep::config::{self, KeepConfig};
use crate::keep::fetch::HttpMediaFetcher;
use crate::keep::note::NoteRef;
use crate::keep::paths::{self, KeepPaths};
use crate::notify::{self, Notifier};
use crate::platform::client::HttpMetadataSource;

/// Outcome of one CLI command: human-readable detail lines for stdout and
/// issue lines for stderr, plus the overall verdict.
#[derive(Debug)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: &str) -> Self {
        CommandReport {
            command: command.to_string(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, line: impl Into<String>) {
        self.details.push(line.into());
    }

    pub fn issue(&mut self, line: impl Into<String>) {
        self.ok = false;
        self.issues.push(line.into());
    }
}

/// Everything a command needs, built once per invocation.
pub struct Wiring {
    pub paths: KeepPaths,
    pub config: KeepConfig,
    pub fetcher: HttpMediaFetcher,
    pub notifier: Box<dyn Notifier>,
    pub cancel: AtomicBool,
}

impl Wiring {
    pub fn build() -> Result<Self> {
        let paths = paths::resolve_paths()?;
        let config = config::load_config()?;
        let fetcher = HttpMediaFetcher::new(&config.fetch)
            .map_err(|err| anyhow::anyhow!("failed to build http client: {err}"))?;
        let notifier = notify::notifier_from_config(&config);
        Ok(Wiring {
            paths,
            config,
            fetcher,
            notifier,
            cancel: AtomicBool::new(false),
        })
    }

    pub fn metadata_source(&self) -> Result<HttpMetadataSource> {
        HttpMetadataSource::new(&self.config)
            .map_err(|err| anyhow::anyhow!("failed to build metadata client: {err}"))
    }
}

fn strip_url_noise(segment: &str) -> &str {
    segment
        .split(['?', '#'])
        .next()
        .unwrap_or(segment)
        .trim_end_matches('/')
}

/// Pull the note id out of a note page URL. Both the explore and the
/// discovery URL shapes are accepted.
pub fn parse_note_ref(url: &str) -> Result<NoteRef> {
    for marker in ["/explore/", "/discovery/item/"] {
        if let Some(rest) = url.split_once(marker).map(|(_, rest)| rest) {
            let note_id = strip_url_noise(rest);
            if !note_id.is_empty() {
                return Ok(NoteRef {
                    note_id: note_id.to_string(),
                    url: url.to_string(),
                    owner_id: None,
                });
            }
        }
    }
    bail!("could not find a note id in {url}");
}

/// Pull the user id out of a profile URL.
pub fn parse_user_id(url: &str) -> Result<String> {
    if let Some(rest) = url.split_once("/user/profile/").map(|(_, rest)| rest) {
        let user_id = strip_url_noise(rest);
        if !user_id.is_empty() {
            return Ok(user_id.to_string());
        }
    }
    bail!("could not find a user id in {url}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_refs_parse_from_both_url_shapes() {
        let r = parse_note_ref("https://www.xiaohongshu.com/explore/abc123?xsec_token=t").unwrap();
        assert_eq!(r.note_id, "abc123");
        assert!(r.owner_id.is_none());

        let r = parse_note_ref("https://www.xiaohongshu.com/discovery/item/def456").unwrap();
        assert_eq!(r.note_id, "def456");

        assert!(parse_note_ref("https://www.xiaohongshu.com/").is_err());
    }

    #[test]
    fn user_ids_parse_from_profile_urls() {
        let id = parse_user_id("https://www.xiaohongshu.com/user/profile/u789?tab=note").unwrap();
        assert_eq!(id, "u789");
        assert!(parse_user_id("https://www.xiaohongshu.com/explore/abc").is_err());
    }

    #[test]
    fn issues_flip_the_verdict() {
        let mut report = CommandReport::new("verify");
        report.detail("checked 3 notes");
        assert!(report.ok);
        report.issue("note n1 mismatch");
        assert!(!report.ok);
    }
}
