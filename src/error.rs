// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::purge::PurgeError;
use crate::resolver::ResolveError;

pub const CONNECT_FAILED: &str =
    "There was a problem saving Cloudflare settings. Check logs for details.";
pub const PURGE_FAILED: &str = "There was a problem purging Cloudflare cache. Check logs for details.";
pub const CLEAR_FAILED: &str = "Failed to clear settings. Check logs for details.";
pub const STATUS_FAILED: &str = "Failed to read Cloudflare settings. Check logs for details.";

#[derive(Debug, Serialize)]
pub struct ErrorResponseBody {
    pub success: bool,
    pub message: String,
}

/// Failure of an admin action, carrying the message shown to the admin.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{public}")]
    Internal {
        public: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ActionError {
    pub fn internal<E: std::error::Error + Send + Sync + 'static>(
        public: &'static str,
        err: E,
    ) -> Self {
        ActionError::Internal {
            public,
            source: anyhow::Error::new(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ActionError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ActionError::NotFound(_) => StatusCode::NOT_FOUND,
            ActionError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ActionError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the full cause of internal failures; the user only sees `public`.
    pub fn log(&self) {
        if let ActionError::Internal { public, source } = self {
            error!(error = ?source, "{public}");
        }
    }
}

impl From<ResolveError> for ActionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoDomainConfigured | ResolveError::NoValidDomains => {
                ActionError::BadRequest(err.to_string())
            }
            ResolveError::NothingResolved(_) => ActionError::NotFound(err.to_string()),
            ResolveError::Settings(source) => ActionError::internal(CONNECT_FAILED, source),
        }
    }
}

impl From<PurgeError> for ActionError {
    fn from(err: PurgeError) -> Self {
        match err {
            PurgeError::NotConnected => ActionError::BadRequest(err.to_string()),
            PurgeError::AllFailed(_) => ActionError::Upstream(err.to_string()),
            PurgeError::Settings(source) => ActionError::internal(PURGE_FAILED, source),
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        self.log();
        let body = Json(ErrorResponseBody {
            success: false,
            message: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}
