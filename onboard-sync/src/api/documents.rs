//! Remote document proxy
//!
//! GET /documents/proxy?url=... streams back a stored document so browsers
//! can preview it without direct bucket access. Only URLs under the configured
//! public object prefix are fetched.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::services::FetchError;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotAllowed(_) => ApiError::BadRequest(err.to_string()),
            FetchError::Timeout(_) => ApiError::GatewayTimeout(err.to_string()),
            FetchError::NetworkError(_) | FetchError::Status(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}

/// GET /documents/proxy
pub async fn proxy_document(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ApiResult<Response> {
    let document = state.fetcher.fetch(&query.url).await?;

    let content_type = document
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=60")),
        ],
        document.bytes,
    )
        .into_response())
}

/// Build document routes
pub fn document_routes() -> Router<AppState> {
    Router::new().route("/documents/proxy", get(proxy_document))
}
