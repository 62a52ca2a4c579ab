//! Push notifications for batch runs.
//!
//! Delivery is strictly best-effort: a notification failure is warned and
//! dropped, never propagated into the archival pipeline.

use reqwest::blocking::Client;
use std::time::Duration;

use crate::keep::config::KeepConfig;
use crate::keep::note::Note;
use crate::keep::warn;

#[derive(Debug, Clone)]
pub struct FailedNote {
    pub label: String,
    pub error: String,
}

pub trait Notifier {
    fn startup(&self, detail: &str);
    fn new_notes(&self, source_label: &str, notes: &[Note]);
    fn batch_result(&self, source_label: &str, total: usize, succeeded: usize, failed: &[FailedNote]);
    fn error(&self, category: &str, detail: &str);
}

/// Default when no push key is configured.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn startup(&self, _detail: &str) {}
    fn new_notes(&self, _source_label: &str, _notes: &[Note]) {}
    fn batch_result(&self, _source_label: &str, _total: usize, _succeeded: usize, _failed: &[FailedNote]) {}
    fn error(&self, _category: &str, _detail: &str) {}
}

const PUSHDEER_ENDPOINT: &str = "https://api2.pushdeer.com/message/push";
const MAX_LISTED_NOTES: usize = 10;
const MAX_LISTED_FAILURES: usize = 5;

fn render_new_notes(source_label: &str, notes: &[Note]) -> String {
    let mut lines = vec![format!("## New notes from {source_label}"), String::new()];
    for note in notes.iter().take(MAX_LISTED_NOTES) {
        lines.push(format!("- {} ({})", note.title, note.note_id));
    }
    if notes.len() > MAX_LISTED_NOTES {
        lines.push(format!("- … and {} more", notes.len() - MAX_LISTED_NOTES));
    }
    lines.join("\n")
}

fn render_batch_result(
    source_label: &str,
    total: usize,
    succeeded: usize,
    failed: &[FailedNote],
) -> String {
    let rate = if total == 0 {
        100
    } else {
        succeeded * 100 / total
    };
    let mut lines = vec![
        format!("## Batch finished: {source_label}"),
        String::new(),
        format!("{succeeded}/{total} notes complete ({rate}%)"),
    ];
    if !failed.is_empty() {
        lines.push(String::new());
        lines.push("Failures:".to_string());
        for f in failed.iter().take(MAX_LISTED_FAILURES) {
            lines.push(format!("- {}: {}", f.label, f.error));
        }
        if failed.len() > MAX_LISTED_FAILURES {
            lines.push(format!("- … and {} more", failed.len() - MAX_LISTED_FAILURES));
        }
    }
    lines.join("\n")
}

/// Sends markdown messages through the PushDeer API.
pub struct PushDeerNotifier {
    client: Client,
    push_key: String,
}

impl PushDeerNotifier {
    pub fn new(push_key: String) -> Option<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(PushDeerNotifier { client, push_key })
    }

    fn push(&self, text: &str, desp: &str) {
        let result = self
            .client
            .post(PUSHDEER_ENDPOINT)
            .form(&[
                ("pushkey", self.push_key.as_str()),
                ("text", text),
                ("desp", desp),
                ("type", "markdown"),
            ])
            .send();
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn::emit("notify_failed", "push", "", "", "", &err.to_string());
                return;
            }
        };
        let body: serde_json::Value = match response.json() {
            Ok(body) => body,
            Err(err) => {
                warn::emit("notify_failed", "push", "", "", "", &err.to_string());
                return;
            }
        };
        if body.get("code").and_then(serde_json::Value::as_i64) != Some(0) {
            warn::emit("notify_rejected", "push", "", "", "", &body.to_string());
        }
    }
}

impl Notifier for PushDeerNotifier {
    fn startup(&self, detail: &str) {
        self.push("notekeep started", detail);
    }

    fn new_notes(&self, source_label: &str, notes: &[Note]) {
        if notes.is_empty() {
            return;
        }
        self.push(
            &format!("{} new notes from {source_label}", notes.len()),
            &render_new_notes(source_label, notes),
        );
    }

    fn batch_result(&self, source_label: &str, total: usize, succeeded: usize, failed: &[FailedNote]) {
        self.push(
            &format!("batch {source_label}: {succeeded}/{total}"),
            &render_batch_result(source_label, total, succeeded, failed),
        );
    }

    fn error(&self, category: &str, detail: &str) {
        self.push(&format!("notekeep error: {category}"), detail);
    }
}

pub fn notifier_from_config(config: &KeepConfig) -> Box<dyn Notifier> {
    match config.push_key.as_ref().and_then(|key| PushDeerNotifier::new(key.clone())) {
        Some(notifier) => Box::new(notifier),
        None => Box::new(NoopNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keep::note::sample_note;

    #[test]
    fn new_note_list_is_capped() {
        let notes: Vec<Note> = (0..13)
            .map(|i| {
                let mut note = sample_note();
                note.note_id = format!("n{i}");
                note.title = format!("title {i}");
                note
            })
            .collect();
        let rendered = render_new_notes("alice", &notes);
        assert!(rendered.contains("title 9"));
        assert!(!rendered.contains("title 10"));
        assert!(rendered.contains("and 3 more"));
    }

    #[test]
    fn batch_summary_reports_rate_and_failures() {
        let failed = vec![FailedNote {
            label: "n3".to_string(),
            error: "empty body".to_string(),
        }];
        let rendered = render_batch_result("search:cats", 4, 3, &failed);
        assert!(rendered.contains("3/4 notes complete (75%)"));
        assert!(rendered.contains("- n3: empty body"));
    }

    #[test]
    fn empty_batch_counts_as_full_success() {
        let rendered = render_batch_result("alice", 0, 0, &[]);
        assert!(rendered.contains("0/0 notes complete (100%)"));
    }
}
