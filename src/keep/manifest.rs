//! The per-note `info.json` manifest, the authoritative record of what a
//! note is expected to contain.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::keep::note::{Note, NoteKind};
use crate::keep::warn;

pub const MANIFEST_FILE: &str = "info.json";

pub fn write(note_dir: &Path, note: &Note) -> Result<()> {
    fs::create_dir_all(note_dir)
        .with_context(|| format!("failed to create {}", note_dir.display()))?;
    let path = note_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(note).context("failed to encode note manifest")?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load and validate the manifest. Absent manifests read as `None`; so do
/// unparseable ones and ones whose `video_image_map` points outside the
/// image list, each with a warn, so the caller falls back to a full refetch
/// instead of trusting bad expectations.
pub fn load(note_dir: &Path) -> Result<Option<Note>> {
    let path = note_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut note: Note = match serde_json::from_str(&raw) {
        Ok(note) => note,
        Err(err) => {
            warn::emit(
                "manifest_unreadable",
                "manifest_load",
                "",
                "",
                MANIFEST_FILE,
                &err.to_string(),
            );
            return Ok(None);
        }
    };

    let image_count = note.images.len() as u32;
    if note.video_image_map.values().any(|&idx| idx >= image_count) {
        warn::emit(
            "manifest_map_out_of_range",
            "manifest_load",
            &note.note_id,
            &note.owner_id,
            MANIFEST_FILE,
            "video_image_map_index_exceeds_image_list",
        );
        return Ok(None);
    }

    // The map is part of the kind's definition, so re-derive rather than
    // trust a stale label.
    if !note.video_image_map.is_empty() {
        note.note_kind = NoteKind::ImageSetWithVideo;
    }
    Ok(Some(note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keep::note::sample_note;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn round_trips_a_note() {
        let dir = tempdir().unwrap();
        let mut note = sample_note();
        note.images = vec!["https://cdn.example/a".into(), "https://cdn.example/b".into()];
        write(dir.path(), &note).unwrap();

        let got = load(dir.path()).unwrap().unwrap();
        assert_eq!(got.note_id, note.note_id);
        assert_eq!(got.images, note.images);
        assert_eq!(got.note_kind, NoteKind::ImageSet);
    }

    #[test]
    fn absent_manifest_is_none() {
        let dir = tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn corrupt_manifest_is_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn out_of_range_map_is_rejected() {
        let dir = tempdir().unwrap();
        let mut note = sample_note();
        note.images = vec!["https://cdn.example/a".into()];
        note.video_image_map = BTreeMap::from([(0, 5)]);
        write(dir.path(), &note).unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn non_empty_map_forces_hybrid_kind() {
        let dir = tempdir().unwrap();
        let mut note = sample_note();
        note.images = vec!["https://cdn.example/a".into(), "https://cdn.example/b".into()];
        note.live_video_sources = vec!["https://cdn.example/lv0".into()];
        note.video_image_map = BTreeMap::from([(0, 1)]);
        note.note_kind = NoteKind::ImageSet;
        write(dir.path(), &note).unwrap();

        let got = load(dir.path()).unwrap().unwrap();
        assert_eq!(got.note_kind, NoteKind::ImageSetWithVideo);
    }
}
