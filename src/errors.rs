//!
//! src/errors.rs  Andrew Belles  Oct 19th, 2026
//!
//! Defines enums and methods of error conversion
//! for errors the discovery service uses
//!
//!

use thiserror::Error;

/// Failures of a single metadata search. Kept apart from `SonicError` so
/// callers can tell "no matches" from "service failed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("empty query")]
    EmptyQuery,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum SonicError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
    #[error("busy: export {0} is still active")]
    Busy(uuid::Uuid),
    #[error("no active export")]
    NoActiveExport,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("task error: {0}")]
    Task(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SonicError {
    fn from(e: reqwest::Error) -> Self { SonicError::Http(e.to_string()) }
}

impl From<serde_json::Error> for SonicError {
    fn from(e: serde_json::Error) -> Self { SonicError::Parse(e.to_string()) }
}

impl From<tokio::task::JoinError> for SonicError {
    fn from(e: tokio::task::JoinError) -> Self { SonicError::Task(e.to_string()) }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::BackendUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::MalformedResponse(e.to_string())
    }
}
