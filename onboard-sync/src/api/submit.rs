//! Multipart submission endpoint
//!
//! POST /applications/submit
//!
//! Parts:
//! - `payload`: JSON object, either `{ "application_id": ..., "fields": {...} }`
//!   or a flat field map
//! - `application_id`: optional plain-text override
//! - every part carrying a file name is a document, keyed by its part name
//!   (the document type)

use axum::{
    extract::{multipart::Field, Multipart, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use uuid::Uuid;

use super::{parse_id, OptionalActor};
use crate::models::{ApplicationFields, FilePayload};
use crate::services::{SubmitRequest, SubmitResponse};
use crate::{ApiError, ApiResult, AppState};

const PAYLOAD_PART: &str = "payload";
const APPLICATION_ID_PART: &str = "application_id";

/// POST /applications/submit
pub async fn submit_application(
    State(state): State<AppState>,
    OptionalActor(actor): OptionalActor,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let request = read_submission(multipart).await?;

    tracing::info!(
        application_id = ?request.application_id,
        files = request.files.len(),
        "Submission received"
    );

    let response = state.pipeline.submit(actor.as_deref(), request).await?;
    Ok(Json(response))
}

async fn read_submission(mut multipart: Multipart) -> ApiResult<SubmitRequest> {
    let mut payload: Option<Value> = None;
    let mut explicit_id: Option<Uuid> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            if let Some(file) = read_file(name, field).await? {
                files.push(file);
            }
            continue;
        }

        match name.as_str() {
            PAYLOAD_PART => {
                let text = field.text().await.map_err(bad_multipart)?;
                let value = serde_json::from_str(&text)
                    .map_err(|e| ApiError::BadRequest(format!("payload is not valid JSON: {}", e)))?;
                payload = Some(value);
            }
            APPLICATION_ID_PART | "applicationId" => {
                let text = field.text().await.map_err(bad_multipart)?;
                if !text.trim().is_empty() {
                    explicit_id = Some(parse_id(text.trim())?);
                }
            }
            other => {
                tracing::debug!(part = other, "Ignoring unrecognized multipart text part");
            }
        }
    }

    let payload = payload
        .ok_or_else(|| ApiError::BadRequest("Missing multipart part 'payload'".to_string()))?;
    let (payload_id, raw_fields) = split_payload(payload)?;
    let fields = ApplicationFields::from_raw(&raw_fields)?;

    Ok(SubmitRequest {
        application_id: explicit_id.or(payload_id),
        fields,
        files,
    })
}

/// Read one file part; an empty part (no file chosen in the form) is dropped
async fn read_file(document_type: String, field: Field<'_>) -> ApiResult<Option<FilePayload>> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(bad_multipart)?;

    if bytes.is_empty() && file_name.is_empty() {
        return Ok(None);
    }
    if document_type.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "File part '{}' has no document type name",
            file_name
        )));
    }

    Ok(Some(FilePayload {
        document_type,
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    }))
}

/// Separate the optional application id from the field map
fn split_payload(payload: Value) -> ApiResult<(Option<Uuid>, Value)> {
    let Value::Object(mut map) = payload else {
        return Err(ApiError::BadRequest("payload must be a JSON object".to_string()));
    };

    let id = match map
        .remove("application_id")
        .or_else(|| map.remove("applicationId"))
    {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(parse_id(s.trim())?),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "application_id must be a string, got {}",
                other
            )))
        }
    };

    let fields = match map.remove("fields") {
        Some(fields) => fields,
        None => Value::Object(map),
    };
    Ok((id, fields))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Malformed multipart body: {}", err))
}

/// Build submission routes
pub fn submit_routes() -> Router<AppState> {
    Router::new().route("/applications/submit", post(submit_application))
}
