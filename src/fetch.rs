//!
//! src/fetch.rs  Andrew Belles  Oct 19th, 2026
//!
//! Builds the http client for the generative backend and speaks its
//! generateContent wire format
//!

use async_trait::async_trait;
use reqwest::{Client, header, redirect, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::{GeminiConfig, HttpConfig};
use crate::errors::SearchError;
use crate::search::{BackendReply, MetadataBackend, SearchRequest, REQUIRED_FIELDS};
use crate::types::Provenance;
use crate::SonicError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder  {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, SonicError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| SonicError::Http(format!("build client: {e}")))
}

pub fn gemini_client(http: &HttpConfig, cfg: &GeminiConfig) ->
    Result<Client, SonicError> {

    let mut key = header::HeaderValue::from_str(&cfg.api_key)
        .map_err(|e| SonicError::Config(format!("invalid api key {e}")))?;
    key.set_sensitive(true);

    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    h.insert("x-goog-api-key", key);
    client_with_headers(http, h)
}

#[derive(Clone, Debug)]
pub struct GeminiClient {
    pub http: Client,
    pub endpoint: Url
}

impl GeminiClient {
    pub fn new(http_config: &HttpConfig, cfg: &GeminiConfig) ->
        Result<Self, SonicError> {

        let http = gemini_client(http_config, cfg)?;
        let endpoint = cfg.base_url
            .join(&format!("models/{}:generateContent", cfg.model))
            .map_err(|e| SonicError::Config(format!("invalid model {}: {e}", cfg.model)))?;
        Ok( Self { http, endpoint } )
    }

    /// POST {base}/models/{model}:generateContent
    pub fn generate_content(&self, body: &Value) -> RequestBuilder {
        self.http.post(self.endpoint.clone()).json(body)
    }
}

#[async_trait]
impl MetadataBackend for GeminiClient {
    async fn generate(&self, request: &SearchRequest) -> Result<BackendReply, SearchError> {
        let body = request_body(request);
        let response = self.generate_content(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendUnavailable(format!(
                "status {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let envelope: Value = response.json().await
            .map_err(|e| SearchError::MalformedResponse(format!("envelope: {e}")))?;

        if let Some(reason) = envelope.pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str) {
            return Err(SearchError::MalformedResponse(format!("prompt blocked: {reason}")));
        }

        let text = reply_text(&envelope);
        let sources = grounding_sources(&envelope);
        debug!(chars = text.len(), sources = sources.len(), "gemini.reply");
        Ok(BackendReply { text, sources })
    }
}

pub fn build_prompt(query: &str, target: u8) -> String {
    format!(
        "Perform a professional music search for: \"{query}\".\n\
         Return exactly {target} real songs with their full metadata.\n\
         \n\
         For each song provide:\n\
         - title: the full song title\n\
         - artist: the primary artist\n\
         - album: the album name\n\
         - year: the release year\n\
         - genre: the primary genre\n\
         - duration: formatted mm:ss\n\
         - thumbnailUrl: a direct URL to official album artwork, at least 600x600\n\
         - sampleRate: a suggested audiophile sample rate such as 96kHz\n\
         - bitDepth: a suggested bit depth such as 24-bit\n\
         \n\
         Return the data strictly as a JSON array."
    )
}

pub fn response_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for key in ["id", "title", "artist", "album", "year", "genre", "duration",
                "thumbnailUrl", "sampleRate", "bitDepth"] {
        properties.insert(key.to_string(), json!({ "type": "STRING" }));
    }
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": properties,
            "required": REQUIRED_FIELDS,
        }
    })
}

pub fn request_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "contents": [
            {
                "role": "user",
                "parts": [{ "text": build_prompt(&request.query, request.target) }]
            }
        ],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    });
    if request.grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

/// Joined text parts of the first candidate
pub fn reply_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts.iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("")
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

/// Web chunks of the first candidate's grounding metadata, in order
pub fn grounding_sources(response: &Value) -> Vec<Provenance> {
    response
        .pointer("/candidates/0/groundingMetadata/groundingChunks")
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks.iter()
                .filter_map(|chunk| chunk.get("web"))
                .filter_map(|web| {
                    let uri = web.get("uri").and_then(Value::as_str)?;
                    let title = web.get("title")
                        .and_then(Value::as_str)
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or("Source");
                    Some(Provenance { title: title.to_string(), uri: uri.to_string() })
                })
                .collect()
        })
        .unwrap_or_default()
}
