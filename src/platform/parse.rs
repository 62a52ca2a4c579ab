//! Conversion of raw platform payloads into the note model.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::MetadataError;
use crate::keep::note::{Note, NoteKind, NoteRef};

const VIDEO_CDN_BASE: &str = "https://sns-video-bd.xhscdn.com/";

pub fn explore_url(note_id: &str, xsec_token: &str) -> String {
    format!("https://www.xiaohongshu.com/explore/{note_id}?xsec_token={xsec_token}")
}

fn path_value<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(segment)?,
        };
    }
    Some(current)
}

fn path_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    path_value(root, path).and_then(Value::as_str)
}

fn first_non_empty<'a>(root: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| path_str(root, path).filter(|s| !s.is_empty()))
}

fn image_url(image: &Value) -> Option<String> {
    // info_list usually carries two renditions; the second is the larger.
    let url = first_non_empty(
        image,
        &[&["info_list", "1", "url"], &["info_list", "0", "url"], &["url"]],
    )?;
    Some(url.to_string())
}

fn live_video_url(image: &Value) -> Option<String> {
    if path_value(image, &["live_photo"]).and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let url = first_non_empty(
        image,
        &[
            &["stream", "h264", "0", "master_url"],
            &["stream", "h265", "0", "master_url"],
            &["video_addr"],
        ],
    )?;
    Some(url.to_string())
}

fn main_video_url(note_card: &Value) -> Option<String> {
    if let Some(key) = path_str(note_card, &["video", "consumer", "origin_video_key"])
        && !key.is_empty()
    {
        return Some(format!("{VIDEO_CDN_BASE}{key}"));
    }
    first_non_empty(
        note_card,
        &[
            &["video", "media", "stream", "h264", "0", "master_url"],
            &["video", "url"],
        ],
    )
    .map(str::to_string)
}

fn stated_kind(note_card: &Value) -> NoteKind {
    match path_str(note_card, &["type"]) {
        Some("normal") => NoteKind::ImageSet,
        Some("video") => NoteKind::Video,
        _ => NoteKind::Unknown,
    }
}

fn tags(note_card: &Value) -> Vec<String> {
    path_value(note_card, &["tag_list"])
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build a `Note` from a feed payload's `data` object.
///
/// Image URLs come from the per-image rendition list. A hybrid note is
/// detected from per-image live-photo streams: each live image contributes
/// one source, and the pairing map records which image index each source
/// belongs to. The stated type never overrides that evidence.
pub fn parse_note(data: &Value, note_ref: &NoteRef) -> Result<Note, MetadataError> {
    let note_card = path_value(data, &["items", "0", "note_card"])
        .ok_or_else(|| MetadataError::Parse("payload has no note card".to_string()))?;

    let note_id = path_str(data, &["items", "0", "id"])
        .or(path_str(note_card, &["note_id"]))
        .unwrap_or(&note_ref.note_id)
        .to_string();
    let owner_id = path_str(note_card, &["user", "user_id"])
        .ok_or_else(|| MetadataError::Parse("note card has no owner id".to_string()))?
        .to_string();
    let owner_display_name = path_str(note_card, &["user", "nickname"])
        .unwrap_or_default()
        .to_string();
    let title = match path_str(note_card, &["title"]) {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => "untitled".to_string(),
    };
    let description = path_str(note_card, &["desc"]).unwrap_or_default().to_string();
    let posted_at = path_value(note_card, &["time"])
        .and_then(Value::as_i64)
        .map(|t| t.to_string());

    let mut images = Vec::new();
    let mut live_video_sources = Vec::new();
    let mut video_image_map = BTreeMap::new();
    if let Some(list) = path_value(note_card, &["image_list"]).and_then(Value::as_array) {
        for (index, image) in list.iter().enumerate() {
            let Some(url) = image_url(image) else {
                return Err(MetadataError::Parse(format!(
                    "image {index} of note {note_id} has no url"
                )));
            };
            images.push(url);
            if let Some(live_url) = live_video_url(image) {
                let seq = live_video_sources.len() as u32;
                live_video_sources.push(live_url);
                video_image_map.insert(seq, index as u32);
            }
        }
    }

    let stated = stated_kind(note_card);
    let video_source = if stated == NoteKind::Video {
        main_video_url(note_card)
    } else {
        None
    };
    let note_kind = NoteKind::classify(
        stated,
        images.len(),
        video_source.is_some(),
        live_video_sources.len(),
    );

    Ok(Note {
        note_id,
        note_url: note_ref.url.clone(),
        owner_id,
        owner_display_name,
        title,
        description,
        note_kind,
        images,
        video_source,
        video_image_map,
        live_video_sources,
        tags: tags(note_card),
        posted_at,
    })
}

/// Refs from a user's posted-notes page.
pub fn parse_user_notes(data: &Value, owner_id: &str) -> Vec<NoteRef> {
    let Some(list) = path_value(data, &["notes"]).and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| {
            let note_id = item.get("note_id").and_then(Value::as_str)?;
            let token = item.get("xsec_token").and_then(Value::as_str).unwrap_or_default();
            Some(NoteRef {
                note_id: note_id.to_string(),
                url: explore_url(note_id, token),
                owner_id: Some(owner_id.to_string()),
            })
        })
        .collect()
}

pub fn user_notes_cursor(data: &Value) -> Option<String> {
    if path_value(data, &["has_more"]).and_then(Value::as_bool) != Some(true) {
        return None;
    }
    path_str(data, &["cursor"]).filter(|c| !c.is_empty()).map(str::to_string)
}

/// Refs from one page of search results. Owner ids are not part of search
/// payloads we trust, so refs come back owner-unknown.
pub fn parse_search_notes(data: &Value) -> Vec<NoteRef> {
    let Some(list) = path_value(data, &["items"]).and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| {
            // Search pages interleave non-note cards (users, queries).
            if item.get("model_type").and_then(Value::as_str) != Some("note") {
                return None;
            }
            let note_id = item.get("id").and_then(Value::as_str)?;
            let token = item.get("xsec_token").and_then(Value::as_str).unwrap_or_default();
            Some(NoteRef {
                note_id: note_id.to_string(),
                url: explore_url(note_id, token),
                owner_id: None,
            })
        })
        .collect()
}
