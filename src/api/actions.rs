//! Admin actions: connect, purge, clear, and the widget status feed.
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::json;

use super::reply::{ActionBody, ActionReply, ResponseMode};
use crate::error::{ActionError, CLEAR_FAILED, STATUS_FAILED};
use crate::settings::{ClearOutcome, ZoneRecord};
use crate::auth::{Authenticated, SameOrigin};
use crate::{AppState, SharedState, purge, resolver};

// POST /cloudburst/find-zone-id
pub async fn connect(
    Authenticated(_admin): Authenticated,
    _same_origin: SameOrigin,
    mode: ResponseMode,
    Extension(state): Extension<SharedState>,
) -> ActionReply {
    mode.reply(connect_zones(&state).await)
}

async fn connect_zones(state: &AppState) -> Result<ActionBody, ActionError> {
    let domains = state.config.connect_domains()?;

    let report = {
        let mut client = state.cloudflare.lock().await;
        resolver::resolve(&mut client, &state.settings, domains.as_slice()).await?
    };

    Ok(ActionBody::ok(report.message())
        .with_reload()
        .with_data(json!({
            "zones": report.resolved,
            "domain_count": report.resolved.len(),
        })))
}

// POST /cloudburst/purge
pub async fn purge(
    Authenticated(_admin): Authenticated,
    _same_origin: SameOrigin,
    mode: ResponseMode,
    Extension(state): Extension<SharedState>,
) -> ActionReply {
    mode.reply(purge_zones(&state).await)
}

async fn purge_zones(state: &AppState) -> Result<ActionBody, ActionError> {
    let summary = {
        let mut client = state.cloudflare.lock().await;
        purge::purge_all(&mut client, &state.settings).await?
    };

    Ok(ActionBody::ok(summary.message()).with_data(json!(summary)))
}

// POST /cloudburst/clear
pub async fn clear(
    Authenticated(_admin): Authenticated,
    _same_origin: SameOrigin,
    mode: ResponseMode,
    Extension(state): Extension<SharedState>,
) -> ActionReply {
    mode.reply(clear_settings(&state).await)
}

async fn clear_settings(state: &AppState) -> Result<ActionBody, ActionError> {
    let outcome = state
        .settings
        .clear()
        .await
        .map_err(|e| ActionError::internal(CLEAR_FAILED, e))?;

    let message = match outcome {
        ClearOutcome::Removed => {
            "Cloudflare settings cleared successfully. You can now reconnect with a different domain."
        }
        ClearOutcome::NothingToClear => "No settings found to clear.",
    };

    Ok(ActionBody::ok(message).with_reload())
}

#[derive(Serialize)]
pub struct StatusDto {
    pub connected: bool,
    pub zones: Vec<ZoneRecord>,
}

// GET /cloudburst/status
pub async fn status(
    Authenticated(_admin): Authenticated,
    Extension(state): Extension<SharedState>,
) -> Result<Json<StatusDto>, ActionError> {
    let settings = state
        .settings
        .load()
        .await
        .map_err(|e| ActionError::internal(STATUS_FAILED, e))?;

    Ok(Json(StatusDto {
        connected: settings.is_connected(),
        zones: settings.zones.into_iter().collect(),
    }))
}
