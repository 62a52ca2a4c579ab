//! Batch archival over a list of note refs.
//!
//! The coordinator's job is cost avoidance: a note whose archive is already
//! verified complete is skipped before any metadata fetch, and pacing delays
//! only apply where a fetch actually happened.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::MetadataError;
use crate::keep::audit;
use crate::keep::config::KeepConfig;
use crate::keep::evaluate;
use crate::keep::fetch::MediaFetcher;
use crate::keep::note::{Note, NoteRef};
use crate::keep::paths::KeepPaths;
use crate::keep::reconcile;
use crate::keep::warn;
use crate::notify::{FailedNote, Notifier};

#[derive(Debug)]
pub struct FailedRef {
    pub note_ref: NoteRef,
    pub error: String,
    pub auth_failure: bool,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Notes whose archive is verified complete after this run.
    pub archived: Vec<Note>,
    pub failed: Vec<FailedRef>,
    /// Notes skipped by the pre-check, with zero metadata fetches.
    pub skipped: usize,
    /// Metadata requests actually issued.
    pub metadata_fetches: usize,
    /// True when the cancel flag stopped the run early.
    pub cancelled: bool,
}

/// The audit log is observability, not correctness; an append failure must
/// not stop a batch.
fn audit_event(paths: &KeepPaths, phase: &str, status: &str, message: &str) {
    if let Err(err) = audit::append_event(paths, phase, status, message) {
        warn::emit("audit_append_failed", phase, "", "", "", &format!("{err:#}"));
    }
}

fn jittered_delay(config: &KeepConfig) -> Duration {
    let jitter = if config.batch.jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=config.batch.jitter_ms)
    };
    Duration::from_millis(config.batch.item_delay_ms + jitter)
}

/// Archive every ref in order. `fetch_metadata` is only invoked for notes
/// the pre-check could not verify; the cancel flag is honored between notes,
/// never mid-note. A failure on one ref lands in the failed list and never
/// stops the rest of the batch.
pub fn archive_batch<F>(
    refs: &[NoteRef],
    mut fetch_metadata: F,
    fetcher: &dyn MediaFetcher,
    notifier: &dyn Notifier,
    cancel: &AtomicBool,
    paths: &KeepPaths,
    config: &KeepConfig,
    batch_label: &str,
) -> BatchOutcome
where
    F: FnMut(&NoteRef) -> Result<Note, MetadataError>,
{
    let mut outcome = BatchOutcome::default();
    audit_event(
        paths,
        "batch",
        "started",
        &format!("{batch_label}: {} notes", refs.len()),
    );

    for (position, note_ref) in refs.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            outcome.cancelled = true;
            audit_event(
                paths,
                "batch",
                "cancelled",
                &format!("{batch_label}: stopped before note {}", note_ref.note_id),
            );
            break;
        }

        let precheck = match evaluate::evaluate(
            &note_ref.note_id,
            note_ref.owner_id.as_deref(),
            &paths.ledger_dir,
            &paths.media_dir,
            config.live_video_rule,
        ) {
            Ok(report) => report,
            Err(err) => {
                audit_event(
                    paths,
                    "evaluate",
                    "failed",
                    &format!("note {}: {err:#}", note_ref.note_id),
                );
                outcome.failed.push(FailedRef {
                    note_ref: note_ref.clone(),
                    error: format!("{err:#}"),
                    auth_failure: false,
                });
                continue;
            }
        };
        if precheck.is_complete {
            outcome.skipped += 1;
            continue;
        }

        outcome.metadata_fetches += 1;
        match fetch_metadata(note_ref) {
            Ok(note) => match reconcile::reconcile(&note, paths, config, fetcher) {
                Ok(result) if result.is_complete => {
                    audit_event(
                        paths,
                        "reconcile",
                        "ok",
                        &format!("note {} complete, {} fetched", note.note_id, result.downloaded),
                    );
                    outcome.archived.push(note);
                }
                Ok(result) => {
                    audit_event(
                        paths,
                        "reconcile",
                        "incomplete",
                        &format!(
                            "note {}: {} artifacts failed",
                            note.note_id,
                            result.failed_artifacts.len()
                        ),
                    );
                    let detail = result
                        .failed_artifacts
                        .iter()
                        .map(|(artifact, reason)| format!("{artifact}: {reason}"))
                        .collect::<Vec<_>>()
                        .join("; ");
                    outcome.failed.push(FailedRef {
                        note_ref: note_ref.clone(),
                        error: detail,
                        auth_failure: false,
                    });
                }
                Err(err) => {
                    audit_event(
                        paths,
                        "reconcile",
                        "failed",
                        &format!("note {}: {err:#}", note.note_id),
                    );
                    outcome.failed.push(FailedRef {
                        note_ref: note_ref.clone(),
                        error: format!("{err:#}"),
                        auth_failure: false,
                    });
                }
            },
            Err(err) => {
                let auth_failure = err.is_auth();
                audit_event(
                    paths,
                    "metadata",
                    "failed",
                    &format!("note {}: {err}", note_ref.note_id),
                );
                if auth_failure {
                    notifier.error("auth", &err.to_string());
                }
                outcome.failed.push(FailedRef {
                    note_ref: note_ref.clone(),
                    error: err.to_string(),
                    auth_failure,
                });
            }
        }

        // Pace only real platform traffic; skips cost nothing.
        if position + 1 < refs.len() {
            thread::sleep(jittered_delay(config));
        }
    }

    audit_event(
        paths,
        "batch",
        "finished",
        &format!(
            "{batch_label}: {} archived, {} failed, {} skipped",
            outcome.archived.len(),
            outcome.failed.len(),
            outcome.skipped
        ),
    );

    let failures: Vec<FailedNote> = outcome
        .failed
        .iter()
        .map(|f| FailedNote {
            label: f.note_ref.note_id.clone(),
            error: f.error.clone(),
        })
        .collect();
    notifier.batch_result(
        batch_label,
        refs.len(),
        outcome.archived.len() + outcome.skipped,
        &failures,
    );

    outcome
}
