pub mod client;
pub mod parse;

use crate::error::MetadataError;
use crate::keep::note::{Note, NoteRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    General,
    TimeDescending,
    PopularityDescending,
}

impl SearchSort {
    pub fn parse(text: &str) -> Option<SearchSort> {
        match text {
            "general" => Some(SearchSort::General),
            "time" => Some(SearchSort::TimeDescending),
            "popularity" => Some(SearchSort::PopularityDescending),
            _ => None,
        }
    }

    pub(crate) fn wire_value(self) -> &'static str {
        match self {
            SearchSort::General => "general",
            SearchSort::TimeDescending => "time_descending",
            SearchSort::PopularityDescending => "popularity_descending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKindFilter {
    All,
    Video,
    Image,
}

impl SearchKindFilter {
    pub fn parse(text: &str) -> Option<SearchKindFilter> {
        match text {
            "all" => Some(SearchKindFilter::All),
            "video" => Some(SearchKindFilter::Video),
            "image" => Some(SearchKindFilter::Image),
            _ => None,
        }
    }

    pub(crate) fn wire_value(self) -> u8 {
        match self {
            SearchKindFilter::All => 0,
            SearchKindFilter::Video => 1,
            SearchKindFilter::Image => 2,
        }
    }
}

/// Where note metadata comes from. The archival pipeline only sees this
/// trait, so tests drive it with closures and canned payloads.
pub trait MetadataSource {
    fn note_metadata(&self, note_ref: &NoteRef) -> Result<Note, MetadataError>;
    fn user_notes(&self, user_id: &str) -> Result<Vec<NoteRef>, MetadataError>;
    fn user_display_name(&self, user_id: &str) -> Result<Option<String>, MetadataError>;
    fn search_notes(
        &self,
        query: &str,
        count: usize,
        sort: SearchSort,
        kind: SearchKindFilter,
    ) -> Result<Vec<NoteRef>, MetadataError>;
}
