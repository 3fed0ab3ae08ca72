// Remote API seams.
//
// `RemoteApi` covers the public user endpoints; the admin surface with its
// session/CSRF handshake lives in `admin`. Both sides report failures as
// `ApiError`, whose `Http` display matches the server-facing message format
// `API error {status}: {path} - {details}`.

pub mod admin;
pub mod client;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use ballot_core::model::{FilmId, NomineeSnapshot, UserRecord, YearEntry};

pub use client::HttpApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Admin login required.")]
    AuthRequired,

    #[error("API error {status}: {path}{}", detail_suffix(.details))]
    Http {
        status: u16,
        path: String,
        details: String,
    },

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

fn detail_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!(" - {details}")
    }
}

impl ApiError {
    pub fn http(status: u16, path: &str, details: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            path: path.to_string(),
            details: details.into(),
        }
    }

    /// True for a plain 403 (for picks: voting is closed).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Http { status: 403, .. })
    }
}

/// Body of `PUT /api/user-state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenUpdate {
    pub year: u32,
    pub user_key: String,
    pub film_id: FilmId,
    pub seen: bool,
}

/// Body of `PUT /api/user-pick`. `picked = false` clears the category's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickUpdate {
    pub year: u32,
    pub user_key: String,
    pub category: String,
    pub film_id: FilmId,
    pub picked: bool,
}

/// The public endpoints a user client reads and writes.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_years(&self) -> Result<Vec<YearEntry>, ApiError>;

    async fn fetch_nominees(&self, year: u32, category: &str)
        -> Result<NomineeSnapshot, ApiError>;

    async fn fetch_user_record(&self, year: u32, user_key: &str)
        -> Result<UserRecord, ApiError>;

    async fn put_seen(&self, update: &SeenUpdate) -> Result<(), ApiError>;

    /// Fails with a 403 `Http` error while voting is locked.
    async fn put_pick(&self, update: &PickUpdate) -> Result<(), ApiError>;
}
