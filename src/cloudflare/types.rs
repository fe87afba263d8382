use serde::{Deserialize, Serialize};

/// Envelope returned by `GET zones?name=...`.
#[derive(Debug, Deserialize)]
pub struct ZoneList {
    #[serde(default)]
    pub result: Vec<ZoneSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Body for `POST zones/{id}/purge_cache`.
#[derive(Debug, Serialize)]
pub struct PurgeCacheRequest {
    pub purge_everything: bool,
}

/// Error envelope Cloudflare attaches to failed calls.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorEntry {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}
