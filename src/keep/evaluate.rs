//! Completeness evaluation: counted checks of the filesystem against the
//! manifest, never trusting the ledger's claim alone.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::keep::config::LiveVideoRule;
use crate::keep::layout;
use crate::keep::ledger::{self, LedgerRecord};
use crate::keep::manifest;
use crate::keep::note::{Note, NoteKind};
use crate::keep::warn;

/// One concrete file the note directory should contain but does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingArtifact {
    Image(u32),
    Video,
    LiveVideo { image_index: u32 },
}

impl fmt::Display for MissingArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingArtifact::Image(index) => write!(f, "{}", layout::image_file_name(*index)),
            MissingArtifact::Video => write!(f, "{}", layout::VIDEO_FILE),
            MissingArtifact::LiveVideo { image_index } => {
                write!(f, "{}", layout::live_video_file_name(*image_index))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletenessReason {
    NoPriorRecord,
    RecordIncomplete,
    NoteDirMissing,
    ManifestMissing,
    LedgerFilesystemMismatch,
    Verified,
}

#[derive(Debug, Clone)]
pub struct CompletenessReport {
    pub is_complete: bool,
    pub missing: Vec<MissingArtifact>,
    pub reason: CompletenessReason,
}

impl CompletenessReport {
    fn incomplete(reason: CompletenessReason) -> Self {
        CompletenessReport {
            is_complete: false,
            missing: Vec::new(),
            reason,
        }
    }
}

/// Compute which expected artifacts are absent (or zero-byte) on disk.
///
/// Image sets expect the exact index set `0..images.len()`: a directory with
/// the right number of files but a gap in the indices is incomplete. Hybrid
/// notes additionally expect live videos for the image indices named by the
/// manifest's pairing map; under the subset rule a missing pairing that the
/// platform no longer serves is tolerated only by the caller re-fetching and
/// shrinking the map, so it is always reported here.
pub fn missing_artifacts(note: &Note, note_dir: &Path) -> Result<Vec<MissingArtifact>> {
    let mut missing = Vec::new();
    match note.note_kind {
        NoteKind::ImageSet | NoteKind::ImageSetWithVideo => {
            let present = layout::present_image_indices(note_dir)?;
            for index in 0..note.images.len() as u32 {
                if !present.contains(&index) {
                    missing.push(MissingArtifact::Image(index));
                }
            }
            if note.note_kind == NoteKind::ImageSetWithVideo {
                let present_live = layout::present_live_video_indices(note_dir)?;
                for image_index in note.expected_live_image_indices() {
                    if !present_live.contains(&image_index) {
                        missing.push(MissingArtifact::LiveVideo { image_index });
                    }
                }
            }
        }
        NoteKind::Video => {
            if note.video_source.is_some() && !layout::has_artifact(note_dir, layout::VIDEO_FILE) {
                missing.push(MissingArtifact::Video);
            }
        }
        NoteKind::Unknown => {}
    }
    Ok(missing)
}

/// Live-video files present on disk whose image index the manifest does not
/// expect. Only the exact rule treats these as an incompleteness signal.
fn live_video_orphans(note: &Note, note_dir: &Path) -> Result<BTreeSet<u32>> {
    let present = layout::present_live_video_indices(note_dir)?;
    let expected = note.expected_live_image_indices();
    Ok(present.difference(&expected).copied().collect())
}

fn counted_check(
    note: &Note,
    note_dir: &Path,
    rule: LiveVideoRule,
) -> Result<(bool, Vec<MissingArtifact>)> {
    let missing = missing_artifacts(note, note_dir)?;
    let mut complete = missing.is_empty();
    if complete
        && rule == LiveVideoRule::Exact
        && note.note_kind == NoteKind::ImageSetWithVideo
        && !live_video_orphans(note, note_dir)?.is_empty()
    {
        complete = false;
    }
    Ok((complete, missing))
}

/// Metadata-free pre-check used by the batch coordinator: decide from the
/// ledger, the note directory, and its manifest alone whether this note can
/// be skipped without a metadata fetch.
///
/// The ledger is advisory. A `is_complete = true` record is only honored
/// after the counted filesystem check passes; a disagreement downgrades the
/// verdict and is warned as a mismatch.
pub fn evaluate(
    note_id: &str,
    owner_id: Option<&str>,
    ledger_dir: &Path,
    media_root: &Path,
    rule: LiveVideoRule,
) -> Result<CompletenessReport> {
    let record = match owner_id {
        Some(owner) => ledger::lookup(ledger_dir, owner, note_id)?,
        None => ledger::find_anywhere(ledger_dir, note_id)?,
    };
    let Some(record) = record else {
        return Ok(CompletenessReport::incomplete(CompletenessReason::NoPriorRecord));
    };
    if !record.is_complete {
        return Ok(CompletenessReport::incomplete(CompletenessReason::RecordIncomplete));
    }

    let Some(note_dir) = layout::find_note_dir(media_root, Some(&record.owner_id), note_id) else {
        warn_mismatch(&record, "note_directory_missing");
        return Ok(CompletenessReport::incomplete(CompletenessReason::NoteDirMissing));
    };
    let Some(note) = manifest::load(&note_dir)? else {
        warn_mismatch(&record, "manifest_missing_or_invalid");
        return Ok(CompletenessReport::incomplete(CompletenessReason::ManifestMissing));
    };

    let (complete, missing) = counted_check(&note, &note_dir, rule)?;
    if complete {
        Ok(CompletenessReport {
            is_complete: true,
            missing: Vec::new(),
            reason: CompletenessReason::Verified,
        })
    } else {
        warn_mismatch(&record, "artifacts_missing_despite_complete_record");
        Ok(CompletenessReport {
            is_complete: false,
            missing,
            reason: CompletenessReason::LedgerFilesystemMismatch,
        })
    }
}

fn warn_mismatch(record: &LedgerRecord, reason: &str) {
    warn::emit(
        "ledger_filesystem_mismatch",
        "evaluate",
        &record.note_id,
        &record.owner_id,
        "",
        reason,
    );
}

/// Completeness against freshly fetched metadata, for the orchestrator.
/// `record` is the prior ledger entry, consulted only for its advisory flag;
/// the verdict comes from the counted check.
pub fn evaluate_note_dir(
    note: &Note,
    record: Option<&LedgerRecord>,
    note_dir: &Path,
    rule: LiveVideoRule,
) -> Result<CompletenessReport> {
    if !note_dir.is_dir() {
        return Ok(CompletenessReport::incomplete(CompletenessReason::NoteDirMissing));
    }
    let (complete, missing) = counted_check(note, note_dir, rule)?;
    if complete {
        return Ok(CompletenessReport {
            is_complete: true,
            missing: Vec::new(),
            reason: CompletenessReason::Verified,
        });
    }
    let reason = match record {
        Some(record) if record.is_complete => {
            warn_mismatch(record, "artifacts_missing_despite_complete_record");
            CompletenessReason::LedgerFilesystemMismatch
        }
        Some(_) => CompletenessReason::RecordIncomplete,
        None => CompletenessReason::NoPriorRecord,
    };
    Ok(CompletenessReport {
        is_complete: false,
        missing,
        reason,
    })
}
