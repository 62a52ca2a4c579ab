//! Canonical on-disk layout for archived notes.
//!
//! One directory per note: `<media_root>/<nick>_<owner_id>/<title>_<note_id>/`
//! containing numbered image files, an optional `video.mp4`, numbered
//! `live_video_<i>` files keyed by image index, and the `info.json` manifest.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::keep::normalize::normalize_component;
use crate::keep::note::Note;

pub const VIDEO_FILE: &str = "video.mp4";
pub const COVER_FILE: &str = "cover.jpg";

pub fn image_file_name(index: u32) -> String {
    format!("image_{index}.jpg")
}

pub fn live_video_file_name(image_index: u32) -> String {
    format!("live_video_{image_index}.mp4")
}

pub fn owner_dir_name(display_name: &str, owner_id: &str) -> String {
    let nick = normalize_component(display_name);
    let nick = if nick.is_empty() { "owner" } else { &nick };
    format!("{nick}_{owner_id}")
}

pub fn note_dir_name(title: &str, note_id: &str) -> String {
    let slug = normalize_component(title);
    let slug = if slug.is_empty() { "untitled" } else { &slug };
    format!("{slug}_{note_id}")
}

pub fn note_dir(media_root: &Path, note: &Note) -> PathBuf {
    media_root
        .join(owner_dir_name(&note.owner_display_name, &note.owner_id))
        .join(note_dir_name(&note.title, &note.note_id))
}

/// An artifact counts as present only when the file exists and is non-empty.
/// Zero-byte files are failed downloads and must be treated as missing.
pub fn has_artifact(dir: &Path, file_name: &str) -> bool {
    match fs::metadata(dir.join(file_name)) {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

fn indexed_files(dir: &Path, prefix: &str) -> Result<BTreeSet<u32>> {
    let mut found = BTreeSet::new();
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let stem = name.split('.').next().unwrap_or(name);
        if let Some(rest) = stem.strip_prefix(prefix)
            && let Ok(index) = rest.parse::<u32>()
        {
            found.insert(index);
        }
    }
    Ok(found)
}

/// Indices of non-empty image files in the note directory, regardless of
/// extension (older archives may hold `.png` or `.webp`).
pub fn present_image_indices(dir: &Path) -> Result<BTreeSet<u32>> {
    indexed_files(dir, "image_")
}

/// Image indices that have a non-empty paired live-video file.
pub fn present_live_video_indices(dir: &Path) -> Result<BTreeSet<u32>> {
    indexed_files(dir, "live_video_")
}

/// Locate an existing note directory without metadata, by id suffix. When
/// `owner_id` is unknown (search results) every owner directory is scanned.
pub fn find_note_dir(media_root: &Path, owner_id: Option<&str>, note_id: &str) -> Option<PathBuf> {
    let owner_dirs = dirs_matching_suffix(media_root, owner_id)?;
    let note_suffix = format!("_{note_id}");
    for owner_dir in owner_dirs {
        let Ok(entries) = fs::read_dir(&owner_dir) else { continue };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(&note_suffix) && entry.path().is_dir() {
                return Some(entry.path());
            }
        }
    }
    None
}

fn dirs_matching_suffix(media_root: &Path, owner_id: Option<&str>) -> Option<Vec<PathBuf>> {
    let entries = fs::read_dir(media_root).ok()?;
    let owner_suffix = owner_id.map(|id| format!("_{id}"));
    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match &owner_suffix {
            Some(suffix) if !name.ends_with(suffix) => continue,
            _ => dirs.push(entry.path()),
        }
    }
    Some(dirs)
}
