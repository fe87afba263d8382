//! Basic-auth based admin extractor plus password helpers.
use axum::{
    Extension,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Response},
};
use std::future::Future;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand_core::OsRng;
use tracing::warn;
use url::Url;

use crate::SharedState;

const REALM: &str = "Basic realm=\"cloudburst\"";

/// Axum extractor that verifies Basic credentials against the configured admin.
pub struct Authenticated(pub String);

fn reject(status: StatusCode, msg: &'static str) -> Response {
    if status == StatusCode::UNAUTHORIZED {
        (status, [(header::WWW_AUTHENTICATE, REALM)], msg).into_response()
    } else {
        (status, msg).into_response()
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        Box::pin(async move {
            let Extension(app_state): Extension<SharedState> =
                Extension::from_request_parts(parts, state)
                    .await
                    .map_err(|_| reject(StatusCode::INTERNAL_SERVER_ERROR, "missing state"))?;

            let auth_header = parts
                .headers
                .get(header::AUTHORIZATION)
                .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "missing Authorization header"))?
                .to_str()
                .map_err(|_| reject(StatusCode::BAD_REQUEST, "invalid Authorization header"))?;

            let Some(b64) = auth_header.strip_prefix("Basic ") else {
                return Err(reject(StatusCode::UNAUTHORIZED, "expected Basic auth"));
            };

            let decoded = BASE64
                .decode(b64)
                .map_err(|_| reject(StatusCode::BAD_REQUEST, "invalid Base64"))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| reject(StatusCode::BAD_REQUEST, "invalid UTF-8"))?;

            let (username, password) = decoded
                .split_once(':')
                .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "invalid Basic payload"))?;

            let config = &app_state.config;
            let valid = username == config.admin_user
                && verify_password(&config.admin_password_hash, password).map_err(|e| {
                    warn!("admin password hash is unusable: {e}");
                    reject(StatusCode::INTERNAL_SERVER_ERROR, "hash error")
                })?;

            if !valid {
                return Err(reject(StatusCode::UNAUTHORIZED, "invalid credentials"));
            }

            Ok(Authenticated(username.to_string()))
        })
    }
}

/// Refuses browser requests coming from another origin.
///
/// Browsers replay cached Basic credentials on cross-site form posts, so every
/// state-changing action takes this alongside [`Authenticated`]. The `Origin`
/// header is checked first, then `Referer`; requests carrying neither (curl,
/// scripts) are let through.
pub struct SameOrigin;

impl<S> FromRequestParts<S> for SameOrigin
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let checked = check_same_origin(&parts.headers, &parts.uri)
            .map(|()| SameOrigin)
            .map_err(|source| {
                warn!(%source, "refused cross-origin request");
                reject(StatusCode::FORBIDDEN, "cross-origin request refused")
            });
        std::future::ready(checked)
    }
}

/// `Err` carries the offending source for logging.
fn check_same_origin(headers: &HeaderMap, uri: &Uri) -> Result<(), String> {
    let Some(source) = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
    else {
        return Ok(());
    };

    let source = source.to_str().map_err(|_| "<non-ascii>".to_string())?;
    let source_url = Url::parse(source).map_err(|_| source.to_string())?;

    let target_authority = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .ok_or_else(|| source.to_string())?;
    let target_url = Url::parse(&format!("{}://{target_authority}", source_url.scheme()))
        .map_err(|_| source.to_string())?;

    let same_host = source_url
        .host_str()
        .zip(target_url.host_str())
        .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b));
    let same_port = source_url.port_or_known_default() == target_url.port_or_known_default();

    if same_host && same_port {
        Ok(())
    } else {
        Err(source.to_string())
    }
}

/// Hash a plaintext password using Argon2 + random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("Failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored Argon2 hash.
pub fn verify_password(hash: &str, plain: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| anyhow::anyhow!("Failed to instantiate PasswordHash"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
