//! Thin blocking HTTP client for the note platform's web API.

use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::error::MetadataError;
use crate::keep::config::KeepConfig;
use crate::keep::note::{Note, NoteRef};
use crate::platform::parse;
use crate::platform::{MetadataSource, SearchKindFilter, SearchSort};

const DEFAULT_API_BASE: &str = "https://edith.xiaohongshu.com";
const USER_PAGE_SIZE: u32 = 30;
const SEARCH_PAGE_SIZE: usize = 20;

pub struct HttpMetadataSource {
    client: Client,
    api_base: String,
    cookie: Option<String>,
}

impl HttpMetadataSource {
    pub fn new(config: &KeepConfig) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .build()
            .map_err(|err| MetadataError::Http(err.to_string()))?;
        let api_base = match env::var("NOTEKEEP_API_BASE") {
            Ok(base) if !base.is_empty() => base.trim_end_matches('/').to_string(),
            _ => DEFAULT_API_BASE.to_string(),
        };
        Ok(HttpMetadataSource {
            client,
            api_base,
            cookie: config.cookie.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.api_base));
        if let Some(cookie) = &self.cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie.as_str());
        }
        builder
    }

    /// Send a request and unwrap the platform's `{success, msg, data}`
    /// envelope. A declined envelope maps through the auth-phrase check so
    /// expired sessions surface as `AuthInvalid`.
    fn envelope(&self, builder: reqwest::blocking::RequestBuilder) -> Result<Value, MetadataError> {
        let response = builder.send().map_err(|err| MetadataError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Http(format!("status {status}")));
        }
        let body: Value = response
            .json()
            .map_err(|err| MetadataError::Parse(err.to_string()))?;
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(false)
            || body.get("code").and_then(Value::as_i64) == Some(0);
        if !success {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("platform declined the request");
            return Err(MetadataError::from_platform_message(msg));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

impl MetadataSource for HttpMetadataSource {
    fn note_metadata(&self, note_ref: &NoteRef) -> Result<Note, MetadataError> {
        let data = self.envelope(
            self.request(reqwest::Method::POST, "/api/sns/web/v1/feed")
                .json(&json!({"source_note_id": note_ref.note_id})),
        )?;
        parse::parse_note(&data, note_ref)
    }

    fn user_notes(&self, user_id: &str) -> Result<Vec<NoteRef>, MetadataError> {
        let mut refs = Vec::new();
        let mut cursor = String::new();
        let page_size = USER_PAGE_SIZE.to_string();
        loop {
            let data = self.envelope(
                self.request(reqwest::Method::GET, "/api/sns/web/v1/user_posted").query(&[
                    ("user_id", user_id),
                    ("num", page_size.as_str()),
                    ("cursor", cursor.as_str()),
                ]),
            )?;
            refs.extend(parse::parse_user_notes(&data, user_id));
            match parse::user_notes_cursor(&data) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(refs)
    }

    fn user_display_name(&self, user_id: &str) -> Result<Option<String>, MetadataError> {
        let data = self.envelope(
            self.request(reqwest::Method::GET, "/api/sns/web/v1/user/otherinfo")
                .query(&[("target_user_id", user_id)]),
        )?;
        Ok(data
            .get("basic_info")
            .and_then(|info| info.get("nickname"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn search_notes(
        &self,
        query: &str,
        count: usize,
        sort: SearchSort,
        kind: SearchKindFilter,
    ) -> Result<Vec<NoteRef>, MetadataError> {
        let mut refs = Vec::new();
        let mut page = 1u32;
        while refs.len() < count {
            let data = self.envelope(
                self.request(reqwest::Method::POST, "/api/sns/web/v1/search/notes").json(&json!({
                    "keyword": query,
                    "page": page,
                    "page_size": SEARCH_PAGE_SIZE,
                    "sort": sort.wire_value(),
                    "note_type": kind.wire_value(),
                })),
            )?;
            let page_refs = parse::parse_search_notes(&data);
            if page_refs.is_empty() {
                break;
            }
            refs.extend(page_refs);
            page += 1;
        }
        refs.truncate(count);
        Ok(refs)
    }
}
