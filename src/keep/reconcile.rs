//! The per-note reconcile pipeline: evaluate, fetch only what is missing,
//! re-verify, record.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::keep::config::KeepConfig;
use crate::keep::evaluate::{self, MissingArtifact};
use crate::keep::fetch::MediaFetcher;
use crate::keep::layout;
use crate::keep::ledger::{self, LedgerRecord};
use crate::keep::manifest;
use crate::keep::note::{Note, NoteKind};
use crate::keep::paths::KeepPaths;
use crate::keep::util;
use crate::keep::warn;

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub note_dir: PathBuf,
    pub is_complete: bool,
    /// Artifacts fetched during this run.
    pub downloaded: usize,
    /// Artifacts that could not be fetched, with the reason.
    pub failed_artifacts: Vec<(MissingArtifact, String)>,
    /// True when the note was already complete and nothing was written.
    pub skipped: bool,
}

fn artifact_url<'a>(note: &'a Note, artifact: MissingArtifact) -> Option<&'a str> {
    match artifact {
        MissingArtifact::Image(index) => note.images.get(index as usize).map(String::as_str),
        MissingArtifact::Video => note.video_source.as_deref(),
        MissingArtifact::LiveVideo { image_index } => {
            // The pairing map runs seq -> image index; reverse it to find
            // which source this image's live video comes from.
            let seq = note
                .video_image_map
                .iter()
                .find(|&(_, &img)| img == image_index)
                .map(|(&seq, _)| seq)?;
            note.live_video_url(seq)
        }
    }
}

fn artifact_dest(note_dir: &std::path::Path, artifact: MissingArtifact) -> PathBuf {
    match artifact {
        MissingArtifact::Image(index) => note_dir.join(layout::image_file_name(index)),
        MissingArtifact::Video => note_dir.join(layout::VIDEO_FILE),
        MissingArtifact::LiveVideo { image_index } => {
            note_dir.join(layout::live_video_file_name(image_index))
        }
    }
}

fn expected_video_count(note: &Note) -> u32 {
    match note.note_kind {
        NoteKind::Video => 1,
        NoteKind::ImageSetWithVideo => note.video_image_map.len() as u32,
        NoteKind::ImageSet | NoteKind::Unknown => 0,
    }
}

fn record_for(note: &Note, is_complete: bool) -> LedgerRecord {
    LedgerRecord {
        note_id: note.note_id.clone(),
        owner_id: note.owner_id.clone(),
        note_kind: note.note_kind,
        title: note.title.clone(),
        description: note.description.clone(),
        last_touched_at: util::local_timestamp(),
        is_complete,
        expected_image_count: Some(note.images.len() as u32),
        expected_video_count: Some(expected_video_count(note)),
    }
}

/// Bring one note's directory up to date with its freshly fetched metadata.
///
/// Running this twice in a row is safe: the second run finds nothing missing
/// and returns without writing. Failures fetching one artifact never stop
/// the others, and the ledger entry is rewritten unconditionally so an
/// interrupted run leaves an honest `is_complete = false` behind.
pub fn reconcile(
    note: &Note,
    paths: &KeepPaths,
    config: &KeepConfig,
    fetcher: &dyn MediaFetcher,
) -> Result<ReconcileOutcome> {
    let note_dir = layout::note_dir(&paths.media_dir, note);
    let prior = ledger::lookup(&paths.ledger_dir, &note.owner_id, &note.note_id)?;

    let before =
        evaluate::evaluate_note_dir(note, prior.as_ref(), &note_dir, config.live_video_rule)?;
    if before.is_complete {
        return Ok(ReconcileOutcome {
            note_dir,
            is_complete: true,
            downloaded: 0,
            failed_artifacts: Vec::new(),
            skipped: true,
        });
    }

    // Refresh the manifest first so a crash mid-download still leaves the
    // directory self-describing for the next run.
    manifest::write(&note_dir, note)
        .with_context(|| format!("failed to write manifest for note {}", note.note_id))?;

    let missing = evaluate::missing_artifacts(note, &note_dir)?;
    let mut downloaded = 0;
    let mut failed_artifacts = Vec::new();
    for artifact in missing {
        let Some(url) = artifact_url(note, artifact) else {
            warn::emit(
                "artifact_source_missing",
                "reconcile",
                &note.note_id,
                &note.owner_id,
                &artifact.to_string(),
                "metadata_has_no_source_url",
            );
            failed_artifacts.push((artifact, "no source url in metadata".to_string()));
            continue;
        };
        match fetcher.fetch(url, &artifact_dest(&note_dir, artifact)) {
            Ok(()) => downloaded += 1,
            Err(err) => {
                warn::emit(
                    "artifact_fetch_failed",
                    "reconcile",
                    &note.note_id,
                    &note.owner_id,
                    &artifact.to_string(),
                    &err.to_string(),
                );
                failed_artifacts.push((artifact, err.to_string()));
            }
        }
    }

    // Cover image for video notes, kept outside the completeness contract.
    if note.note_kind == NoteKind::Video
        && !layout::has_artifact(&note_dir, layout::COVER_FILE)
        && let Some(cover_url) = note.images.first()
    {
        let _ = fetcher.fetch(cover_url, &note_dir.join(layout::COVER_FILE));
    }

    let after =
        evaluate::evaluate_note_dir(note, prior.as_ref(), &note_dir, config.live_video_rule)?;
    ledger::upsert(&paths.ledger_dir, &record_for(note, after.is_complete))?;

    Ok(ReconcileOutcome {
        note_dir,
        is_complete: after.is_complete,
        downloaded,
        failed_artifacts,
        skipped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::keep::note::sample_note;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    struct FakeFetcher {
        calls: RefCell<Vec<String>>,
        fail_urls: Vec<String>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            FakeFetcher {
                calls: RefCell::new(Vec::new()),
                fail_urls: Vec::new(),
            }
        }

        fn failing(urls: &[&str]) -> Self {
            FakeFetcher {
                calls: RefCell::new(Vec::new()),
                fail_urls: urls.iter().map(|u| u.to_string()).collect(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl MediaFetcher for FakeFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            if self.fail_urls.iter().any(|u| u == url) {
                return Err(FetchError::EmptyBody {
                    url: url.to_string(),
                });
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(dest, b"payload").unwrap();
            Ok(())
        }
    }

    fn test_paths(root: &Path) -> KeepPaths {
        KeepPaths {
            keep_home: root.to_path_buf(),
            media_dir: root.join("media"),
            ledger_dir: root.join("ledgers"),
            logs_dir: root.join("logs"),
        }
    }

    fn image_note(count: usize) -> Note {
        let mut note = sample_note();
        note.images = (0..count).map(|i| format!("https://cdn.example/img{i}")).collect();
        note
    }

    fn touch(dir: &Path, name: &str, bytes: &[u8]) {
        fs::create_dir_all(dir).unwrap();
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn second_run_writes_nothing() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let note = image_note(3);

        let fetcher = FakeFetcher::new();
        let first = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(first.is_complete);
        assert_eq!(first.downloaded, 3);

        let fetcher = FakeFetcher::new();
        let second = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(second.is_complete);
        assert!(second.skipped);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn partial_archive_fetches_only_the_gap() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let note = image_note(5);
        let note_dir = layout::note_dir(&paths.media_dir, &note);
        manifest::write(&note_dir, &note).unwrap();
        touch(&note_dir, "image_0.jpg", b"x");
        touch(&note_dir, "image_1.jpg", b"x");
        touch(&note_dir, "image_2.jpg", b"x");

        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(
            *fetcher.calls.borrow(),
            vec!["https://cdn.example/img3", "https://cdn.example/img4"]
        );
    }

    #[test]
    fn zero_byte_artifact_is_refetched() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let note = image_note(2);
        let note_dir = layout::note_dir(&paths.media_dir, &note);
        manifest::write(&note_dir, &note).unwrap();
        touch(&note_dir, "image_0.jpg", b"x");
        touch(&note_dir, "image_1.jpg", b"");

        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(*fetcher.calls.borrow(), vec!["https://cdn.example/img1"]);
    }

    #[test]
    fn complete_ledger_claim_is_reverified_against_disk() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let note = image_note(2);

        // A prior run recorded completion, but the files are gone.
        ledger::upsert(&paths.ledger_dir, &record_for(&note, true)).unwrap();

        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(outcome.downloaded, 2);
    }

    #[test]
    fn live_video_pairings_resolve_through_the_map() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();

        // Four images; images 1 and 3 have paired live videos (seqs 0, 1).
        let mut note = image_note(4);
        note.note_kind = NoteKind::ImageSetWithVideo;
        note.live_video_sources =
            vec!["https://cdn.example/lv0".into(), "https://cdn.example/lv1".into()];
        note.video_image_map = BTreeMap::from([(0, 1), (1, 3)]);

        let note_dir = layout::note_dir(&paths.media_dir, &note);
        manifest::write(&note_dir, &note).unwrap();
        for i in 0..4 {
            touch(&note_dir, &format!("image_{i}.jpg"), b"x");
        }
        touch(&note_dir, "live_video_1.mp4", b"x");

        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(*fetcher.calls.borrow(), vec!["https://cdn.example/lv1"]);
        assert!(note_dir.join("live_video_3.mp4").is_file());
    }

    #[test]
    fn externally_deleted_live_video_is_restored_alone() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();

        let mut note = image_note(3);
        note.note_kind = NoteKind::ImageSetWithVideo;
        note.live_video_sources = vec!["https://cdn.example/lv0".into()];
        note.video_image_map = BTreeMap::from([(0, 1)]);

        let fetcher = FakeFetcher::new();
        let first = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(first.is_complete);
        assert_eq!(first.downloaded, 4);

        fs::remove_file(first.note_dir.join("live_video_1.mp4")).unwrap();

        let fetcher = FakeFetcher::new();
        let second = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(second.is_complete);
        assert_eq!(*fetcher.calls.borrow(), vec!["https://cdn.example/lv0"]);
        let record = ledger::lookup(&paths.ledger_dir, "u1", "n1").unwrap().unwrap();
        assert!(record.is_complete);
    }

    #[test]
    fn artifact_failures_are_isolated_and_recorded_honestly() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let note = image_note(3);

        let fetcher = FakeFetcher::failing(&["https://cdn.example/img1"]);
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(!outcome.is_complete);
        assert_eq!(outcome.downloaded, 2);
        assert_eq!(outcome.failed_artifacts.len(), 1);
        assert_eq!(outcome.failed_artifacts[0].0, MissingArtifact::Image(1));

        let record = ledger::lookup(&paths.ledger_dir, "u1", "n1").unwrap().unwrap();
        assert!(!record.is_complete);

        // The next run only retries the failed artifact.
        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(*fetcher.calls.borrow(), vec!["https://cdn.example/img1"]);
        let record = ledger::lookup(&paths.ledger_dir, "u1", "n1").unwrap().unwrap();
        assert!(record.is_complete);
    }

    #[test]
    fn video_note_gets_best_effort_cover() {
        let root = tempdir().unwrap();
        let paths = test_paths(root.path());
        let config = KeepConfig::default();
        let mut note = sample_note();
        note.note_kind = NoteKind::Video;
        note.video_source = Some("https://cdn.example/v".into());
        note.images = vec!["https://cdn.example/cover".into()];

        let fetcher = FakeFetcher::new();
        let outcome = reconcile(&note, &paths, &config, &fetcher).unwrap();
        assert!(outcome.is_complete);
        assert_eq!(outcome.downloaded, 1);
        assert!(outcome.note_dir.join(layout::COVER_FILE).is_file());
    }
}
