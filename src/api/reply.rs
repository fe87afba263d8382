//! Replies for admin actions: JSON for AJAX callers, redirect-with-flash otherwise.
use std::convert::Infallible;
use std::future::Future;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use url::{Url, form_urlencoded};

use crate::error::ActionError;

pub const FLASH_STATUS_PARAM: &str = "cloudburst_status";
pub const FLASH_MESSAGE_PARAM: &str = "cloudburst_message";

/// How the caller wants the outcome delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Redirect { back: String },
}

impl ResponseMode {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if wants_json(headers) {
            ResponseMode::Json
        } else {
            ResponseMode::Redirect {
                back: back_path(headers),
            }
        }
    }

    pub fn reply(self, result: Result<ActionBody, ActionError>) -> ActionReply {
        match result {
            Ok(body) => ActionReply {
                mode: self,
                status: StatusCode::OK,
                body,
            },
            Err(err) => {
                err.log();
                ActionReply {
                    mode: self,
                    status: err.status(),
                    body: ActionBody::failed(err.to_string()),
                }
            }
        }
    }
}

impl<S> FromRequestParts<S> for ResponseMode
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        std::future::ready(Ok(ResponseMode::from_headers(&parts.headers)))
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    let is_ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    accepts_json || is_ajax
}

/// Same-origin path of the referring page, `/` when unknown.
fn back_path(headers: &HeaderMap) -> String {
    let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) else {
        return "/".into();
    };

    let path = match Url::parse(referer) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
        Ok(_) => return "/".into(),
        Err(_) => referer
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    if is_local_path(&path) { path } else { "/".into() }
}

/// A path that starts with exactly one `/`, so it cannot name another host.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

/// Body shared by every admin action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionBody {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            reload: None,
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    pub fn with_reload(mut self) -> Self {
        self.reload = Some(true);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub struct ActionReply {
    pub mode: ResponseMode,
    pub status: StatusCode,
    pub body: ActionBody,
}

impl IntoResponse for ActionReply {
    fn into_response(self) -> Response {
        match self.mode {
            ResponseMode::Json => (self.status, Json(self.body)).into_response(),
            ResponseMode::Redirect { back } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(
                        FLASH_STATUS_PARAM,
                        if self.body.success { "success" } else { "error" },
                    )
                    .append_pair(FLASH_MESSAGE_PARAM, &self.body.message)
                    .finish();
                let location = format!("{back}?{query}");

                match HeaderValue::from_str(&location) {
                    Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
                    Err(_) => (StatusCode::SEE_OTHER, [(header::LOCATION, HeaderValue::from_static("/"))])
                        .into_response(),
                }
            }
        }
    }
}
