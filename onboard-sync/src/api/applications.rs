//! Application lifecycle endpoints
//!
//! - GET  /applications            list (privileged)
//! - GET  /applications/:id        record plus its document rows
//! - POST /applications/draft      save fields without submitting
//! - POST /applications/prefill    agent prefill and invite (privileged)
//! - POST /applications/:id/opened merchant opened the invite link
//! - POST /applications/:id/resend re-issue a fresh copy (privileged)

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{parse_id, Actor};
use crate::db::ApplicationFilter;
use crate::models::{ApplicationFields, ApplicationRecord, ApplicationStatus};
use crate::services::{ApplicationDetail, LifecycleResponse, ResendResponse};
use crate::{ApiError, ApiResult, AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /applications
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub agent_email: Option<String>,
    pub merchant_email: Option<String>,
    /// RFC 3339
    pub created_after: Option<String>,
    /// RFC 3339
    pub created_before: Option<String>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn into_filter(self) -> ApiResult<ApplicationFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ApplicationStatus>)
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(ApplicationFilter {
            status,
            agent_email: self.agent_email.map(|e| onboard_common::email::normalize_email(&e)),
            merchant_email: self
                .merchant_email
                .map(|e| onboard_common::email::normalize_email(&e)),
            created_after: parse_bound("created_after", self.created_after.as_deref())?,
            created_before: parse_bound("created_before", self.created_before.as_deref())?,
            limit: self.limit,
        })
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> ApiResult<Option<chrono::DateTime<chrono::Utc>>> {
    match raw {
        None => Ok(None),
        Some(raw) => onboard_common::time::parse_rfc3339(raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("{} is not an RFC 3339 timestamp", name))),
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub applications: Vec<ApplicationRecord>,
    pub count: usize,
}

/// Body for draft saves and agent prefills
///
/// `fields` may be omitted, in which case the remaining top-level keys are
/// taken as the field map.
#[derive(Debug, Deserialize)]
pub struct FieldsRequest {
    #[serde(default, alias = "applicationId")]
    pub application_id: Option<Uuid>,
    #[serde(default)]
    pub fields: Option<Value>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl FieldsRequest {
    fn into_parts(self) -> ApiResult<(Option<Uuid>, ApplicationFields)> {
        let raw = match self.fields {
            Some(fields) => fields,
            None => Value::Object(self.rest),
        };
        let fields = ApplicationFields::from_raw(&raw)?;
        Ok((self.application_id, fields))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /applications
pub async fn list_applications(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let filter = query.into_filter()?;
    let applications = state.pipeline.list(&filter).await?;
    Ok(Json(ListResponse {
        count: applications.len(),
        applications,
    }))
}

/// GET /applications/:id
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApplicationDetail>> {
    let id = parse_id(&id)?;
    Ok(Json(state.pipeline.get(id).await?))
}

/// POST /applications/draft
pub async fn save_draft(
    State(state): State<AppState>,
    Json(request): Json<FieldsRequest>,
) -> ApiResult<Json<LifecycleResponse>> {
    let (application_id, fields) = request.into_parts()?;
    Ok(Json(state.pipeline.save_draft(application_id, fields).await?))
}

/// POST /applications/prefill
pub async fn prefill_and_send(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<FieldsRequest>,
) -> ApiResult<Json<LifecycleResponse>> {
    let (application_id, fields) = request.into_parts()?;
    Ok(Json(
        state
            .pipeline
            .prefill_and_send(&actor.email, application_id, fields)
            .await?,
    ))
}

/// POST /applications/:id/opened
pub async fn mark_opened(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LifecycleResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(state.pipeline.mark_opened(id).await?))
}

/// POST /applications/:id/resend
pub async fn resend_application(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<ResendResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(state.pipeline.resend(&actor.email, id).await?))
}

/// Build application lifecycle routes
pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/applications", get(list_applications))
        .route("/applications/draft", post(save_draft))
        .route("/applications/prefill", post(prefill_and_send))
        .route("/applications/:id", get(get_application))
        .route("/applications/:id/opened", post(mark_opened))
        .route("/applications/:id/resend", post(resend_application))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let query = ListQuery {
            status: Some("archived".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_filter(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_list_query_normalizes_emails() {
        let query = ListQuery {
            agent_email: Some(" Agent@Example.COM ".to_string()),
            created_after: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.agent_email.as_deref(), Some("agent@example.com"));
        assert!(filter.created_after.is_some());
    }

    #[test]
    fn test_fields_request_accepts_flat_body() {
        let request: FieldsRequest = serde_json::from_value(json!({
            "applicationId": "6f1f2a50-8a5e-4c4b-9d8e-0f6d2f3b9a11",
            "legal_name": "Acme LLC",
            "merchant_email": "owner@acme.test"
        }))
        .unwrap();
        let (id, fields) = request.into_parts().unwrap();
        assert!(id.is_some());
        assert_eq!(fields.legal_name.as_deref(), Some("Acme LLC"));
    }
}
