use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The kind of media a note carries. `ImageSetWithVideo` is the hybrid
/// form: an image set where some images have a paired short video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    ImageSet,
    Video,
    ImageSetWithVideo,
    Unknown,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::ImageSet => "image_set",
            NoteKind::Video => "video",
            NoteKind::ImageSetWithVideo => "image_set_with_video",
            NoteKind::Unknown => "unknown",
        }
    }

    pub fn parse(text: &str) -> NoteKind {
        match text {
            "image_set" => NoteKind::ImageSet,
            "video" => NoteKind::Video,
            "image_set_with_video" => NoteKind::ImageSetWithVideo,
            _ => NoteKind::Unknown,
        }
    }

    /// Reconcile the platform's stated kind with the media actually present
    /// in the payload. Live-video evidence always wins: a note with paired
    /// videos is a hybrid no matter what the platform labels it.
    pub fn classify(
        stated: NoteKind,
        image_count: usize,
        has_video: bool,
        live_video_count: usize,
    ) -> NoteKind {
        if live_video_count > 0 {
            return NoteKind::ImageSetWithVideo;
        }
        match stated {
            NoteKind::Unknown => {
                if has_video {
                    NoteKind::Video
                } else if image_count > 0 {
                    NoteKind::ImageSet
                } else {
                    NoteKind::Unknown
                }
            }
            other => other,
        }
    }
}

impl Default for NoteKind {
    fn default() -> Self {
        NoteKind::Unknown
    }
}

/// Full metadata for one note, as fetched from the platform and persisted
/// in the per-note `info.json` manifest.
///
/// `video_image_map` keys are live-video sequence numbers into
/// `live_video_sources`; values are indices into `images`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub note_id: String,
    pub note_url: String,
    pub owner_id: String,
    #[serde(default)]
    pub owner_display_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub note_kind: NoteKind,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub video_source: Option<String>,
    #[serde(default)]
    pub video_image_map: BTreeMap<u32, u32>,
    #[serde(default)]
    pub live_video_sources: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
}

impl Note {
    /// Source URL for the live video paired with sequence `seq`.
    pub fn live_video_url(&self, seq: u32) -> Option<&str> {
        self.live_video_sources.get(seq as usize).map(String::as_str)
    }

    /// Image indices that are expected to have a paired live video.
    pub fn expected_live_image_indices(&self) -> BTreeSet<u32> {
        self.video_image_map.values().copied().collect()
    }
}

/// Lightweight handle to a note before its metadata has been fetched.
/// `owner_id` is known for user listings but not for search results.
#[derive(Debug, Clone)]
pub struct NoteRef {
    pub note_id: String,
    pub url: String,
    pub owner_id: Option<String>,
}

#[cfg(test)]
pub(crate) fn sample_note() -> Note {
    Note {
        note_id: "n1".to_string(),
        note_url: "https://example.com/explore/n1".to_string(),
        owner_id: "u1".to_string(),
        owner_display_name: "alice".to_string(),
        title: "trip".to_string(),
        description: String::new(),
        note_kind: NoteKind::ImageSet,
        images: vec![],
        video_source: None,
        video_image_map: BTreeMap::new(),
        live_video_sources: vec![],
        tags: vec![],
        posted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_evidence_overrides_stated_kind() {
        assert_eq!(
            NoteKind::classify(NoteKind::ImageSet, 4, false, 2),
            NoteKind::ImageSetWithVideo
        );
        assert_eq!(
            NoteKind::classify(NoteKind::Video, 1, true, 1),
            NoteKind::ImageSetWithVideo
        );
    }

    #[test]
    fn stated_kind_kept_without_live_evidence() {
        assert_eq!(NoteKind::classify(NoteKind::Video, 1, true, 0), NoteKind::Video);
        assert_eq!(NoteKind::classify(NoteKind::ImageSet, 3, false, 0), NoteKind::ImageSet);
    }

    #[test]
    fn unknown_falls_back_on_media_presence() {
        assert_eq!(NoteKind::classify(NoteKind::Unknown, 2, true, 0), NoteKind::Video);
        assert_eq!(NoteKind::classify(NoteKind::Unknown, 2, false, 0), NoteKind::ImageSet);
        assert_eq!(NoteKind::classify(NoteKind::Unknown, 0, false, 0), NoteKind::Unknown);
    }

    #[test]
    fn kind_round_trips_through_ledger_text() {
        for kind in [
            NoteKind::ImageSet,
            NoteKind::Video,
            NoteKind::ImageSetWithVideo,
            NoteKind::Unknown,
        ] {
            assert_eq!(NoteKind::parse(kind.as_str()), kind);
        }
        assert_eq!(NoteKind::parse("normal"), NoteKind::Unknown);
    }

    #[test]
    fn expected_live_indices_are_the_map_values() {
        let mut note = sample_note();
        note.video_image_map = BTreeMap::from([(0, 2), (1, 5)]);
        let want: BTreeSet<u32> = BTreeSet::from([2, 5]);
        assert_eq!(note.expected_live_image_indices(), want);
    }
}
