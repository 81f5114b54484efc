//! Batch invite endpoint
//!
//! POST /invites/batch (privileged)

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::Actor;
use crate::config::SendStrategy;
use crate::models::BatchInviteResult;
use crate::services::normalize_invite_inputs;
use crate::{ApiError, ApiResult, AppState};

/// Addresses as a JSON array or one delimited string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmailList {
    Many(Vec<String>),
    One(String),
}

impl EmailList {
    fn into_vec(self) -> Vec<String> {
        match self {
            EmailList::Many(list) => list,
            EmailList::One(raw) => vec![raw],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchInviteRequest {
    pub emails: EmailList,
    /// Overrides `pipeline.send_strategy`
    #[serde(default)]
    pub strategy: Option<SendStrategy>,
}

#[derive(Debug, Serialize)]
pub struct BatchInviteResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: BatchInviteResult,
}

/// POST /invites/batch
pub async fn batch_invite(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<BatchInviteRequest>,
) -> ApiResult<Json<BatchInviteResponse>> {
    let raw = request.emails.into_vec();
    if normalize_invite_inputs(&raw).is_empty() {
        return Err(ApiError::BadRequest(
            "No valid email addresses supplied".to_string(),
        ));
    }

    let result = state
        .invites
        .dispatch(&raw, &actor.email, request.strategy)
        .await?;

    Ok(Json(BatchInviteResponse {
        success: true,
        result,
    }))
}

/// Build invite routes
pub fn invite_routes() -> Router<AppState> {
    Router::new().route("/invites/batch", post(batch_invite))
}
