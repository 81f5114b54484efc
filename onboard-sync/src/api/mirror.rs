//! Explicit CRM mirror sync endpoint
//!
//! POST /mirror/sync (privileged). Mirror failures are reported with
//! `ok: false` in a 200 body; only an unknown application or a bad action name
//! is an HTTP error.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_id, Actor};
use crate::models::{ApplicationFields, SyncAction};
use crate::services::MirrorSyncOutcome;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct MirrorSyncRequest {
    #[serde(alias = "applicationId")]
    pub application_id: String,
    pub action: String,
    /// Field snapshot to mirror; the stored record is used when absent
    #[serde(default)]
    pub fields: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct MirrorSyncResponse {
    pub ok: bool,
    pub outcome: MirrorSyncOutcome,
}

/// POST /mirror/sync
pub async fn sync_mirror(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<MirrorSyncRequest>,
) -> ApiResult<Json<MirrorSyncResponse>> {
    let application_id = parse_id(&request.application_id)?;
    let action: SyncAction = request.action.parse().map_err(ApiError::BadRequest)?;
    let fields = request
        .fields
        .as_ref()
        .map(ApplicationFields::from_raw)
        .transpose()?;

    tracing::info!(
        %application_id,
        action = action.as_str(),
        actor = %actor.email,
        "Mirror sync requested"
    );

    let outcome = state
        .pipeline
        .sync_mirror(application_id, action, fields)
        .await?;

    Ok(Json(MirrorSyncResponse {
        ok: outcome.is_ok(),
        outcome,
    }))
}

/// Build mirror routes
pub fn mirror_routes() -> Router<AppState> {
    Router::new().route("/mirror/sync", post(sync_mirror))
}
