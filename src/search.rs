//!
//! src/search.rs  Andrew Belles  Oct 19th, 2026
//!
//! Metadata query service: asks the generative backend for songs
//! matching a free-text query and reshapes its answer into records
//!

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::SearchError;
use crate::types::{Provenance, SearchOutcome, TrackRecord};

/// Hard cap on records kept from one reply
pub const MAX_RESULTS: usize = 8;

/// Fields a record must carry to be shown
pub const REQUIRED_FIELDS: [&str; 6] = ["title", "artist", "album", "year", "genre", "duration"];

/// What the backend is asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub target: u8,
    pub grounding: bool,
}

/// Raw answer: the model's text plus any cited sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub sources: Vec<Provenance>,
}

#[async_trait]
pub trait MetadataBackend: Send + Sync {
    async fn generate(&self, request: &SearchRequest) -> Result<BackendReply, SearchError>;
}

pub struct MetadataQueryService<B> {
    backend: B,
    target: u8,
    grounding: bool,
}

impl<B: MetadataBackend> MetadataQueryService<B> {
    pub fn new(backend: B, target: u8, grounding: bool) -> Self {
        Self { backend, target, grounding }
    }

    /// Blank queries never reach the backend. No retry on failure.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let request = SearchRequest {
            query: query.to_string(),
            target: self.target,
            grounding: self.grounding,
        };
        info!(query = %request.query, target = request.target, "search.start");

        let reply = match self.backend.generate(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "search.backend");
                return Err(e);
            }
        };

        let items = match extract_json_array(&reply.text) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "search.parse");
                return Err(e);
            }
        };

        let stamp = chrono::Utc::now().timestamp_millis();
        let records: Vec<TrackRecord> = items.iter()
            .enumerate()
            .filter_map(|(index, item)| normalize_record(index, item, stamp))
            .take(MAX_RESULTS)
            .collect();
        let sources = dedupe_sources(reply.sources);

        info!(
            returned = items.len(), kept = records.len(),
            sources = sources.len(), "search.done"
        );
        Ok(SearchOutcome { records, sources })
    }
}

/// Pulls the record array out of the model's text. Grounded replies are
/// not guaranteed to be bare JSON, so fenced blocks and surrounding prose
/// are tolerated.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>, SearchError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(SearchError::MalformedResponse("empty reply".to_string()));
    }

    if let Some(items) = parse_array_segment(raw) {
        return Ok(items);
    }

    let unfenced = raw.split_once("```")
        .and_then(|(_, rest)| rest.split_once("```"))
        .map(|(inside, _)| inside.trim_start_matches("json").trim());
    if let Some(items) = unfenced.and_then(parse_array_segment) {
        return Ok(items);
    }

    for (idx, ch) in raw.char_indices() {
        if ch != '[' && ch != '{' {
            continue;
        }
        // citation markers like `[1]` parse too; keep looking for records
        match parse_array_segment(&raw[idx..]) {
            Some(items) if items.iter().any(Value::is_object) => return Ok(items),
            _ => {}
        }
    }

    Err(SearchError::MalformedResponse(format!(
        "no JSON array in reply: {}",
        raw.chars().take(120).collect::<String>()
    )))
}

/// Parses the leading JSON value of `text`; accepts a bare array or an
/// object wrapping one under `results`.
fn parse_array_segment(text: &str) -> Option<Vec<Value>> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next()?.ok()? {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// String field, accepting numbers for fields like `year`
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match object.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn normalize_record(index: usize, item: &Value, stamp: i64) -> Option<TrackRecord> {
    let Some(object) = item.as_object() else {
        debug!(index, "search.skip.not_object");
        return None;
    };

    let missing: Vec<&str> = REQUIRED_FIELDS.iter()
        .copied()
        .filter(|k| text_field(object, k).is_none())
        .collect();
    if !missing.is_empty() {
        warn!(index, missing = ?missing, "search.skip.incomplete");
        return None;
    }

    let field = |k: &str| text_field(object, k).unwrap_or_default();
    Some(TrackRecord {
        id: text_field(object, "id")
            .unwrap_or_else(|| format!("song-{stamp}-{index}")),
        title: field("title"),
        artist: field("artist"),
        album: field("album"),
        year: normalize_year(&field("year")),
        genre: field("genre"),
        duration: normalize_duration(&field("duration")),
        thumbnail_url: text_field(object, "thumbnailUrl"),
        sample_rate: text_field(object, "sampleRate"),
        bit_depth: text_field(object, "bitDepth"),
    })
}

/// "215" -> "3:35"; anything else is left as given
pub fn normalize_duration(raw: &str) -> String {
    match raw.parse::<u32>() {
        Ok(secs) => format!("{}:{:02}", secs / 60, secs % 60),
        Err(_) => raw.to_string(),
    }
}

/// "2024-03-01" -> "2024"
pub fn normalize_year(raw: &str) -> String {
    let head: String = raw.chars().take(4).collect();
    if raw.len() > 4 && head.len() == 4 && head.chars().all(|c| c.is_ascii_digit()) {
        head
    } else {
        raw.to_string()
    }
}

/// First occurrence of each uri wins
pub fn dedupe_sources(sources: Vec<Provenance>) -> Vec<Provenance> {
    let mut seen = HashSet::new();
    sources.into_iter()
        .filter(|s| seen.insert(s.uri.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}};

    use super::*;

    /// Replays canned replies and counts calls
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        replies: Arc<Mutex<Vec<Result<BackendReply, SearchError>>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        pub fn with(reply: Result<BackendReply, SearchError>) -> Self {
            let fake = Self::default();
            fake.push(reply);
            fake
        }

        pub fn push(&self, reply: Result<BackendReply, SearchError>) {
            if let Ok(mut replies) = self.replies.lock() {
                replies.push(reply);
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetadataBackend for FakeBackend {
        async fn generate(&self, _request: &SearchRequest) -> Result<BackendReply, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock()
                .map_err(|_| SearchError::BackendUnavailable("poisoned".to_string()))?;
            if replies.is_empty() {
                return Err(SearchError::BackendUnavailable("no canned reply".to_string()));
            }
            replies.remove(0)
        }
    }

    pub fn song(i: usize) -> Value {
        serde_json::json!({
            "title": format!("Song {i}"),
            "artist": format!("Artist {i}"),
            "album": "Top Hits 2024",
            "year": "2024",
            "genre": "Pop",
            "duration": "3:21",
            "thumbnailUrl": format!("https://example.com/{i}.jpg"),
            "sampleRate": "96kHz",
            "bitDepth": "24-bit"
        })
    }

    pub fn reply_with(count: usize) -> BackendReply {
        let songs: Vec<Value> = (0..count).map(song).collect();
        BackendReply { text: Value::Array(songs).to_string(), sources: vec![] }
    }
}
