//! HTTP API handlers for onboard-sync
//!
//! Partial satellite failures are reported inside 200 responses; only
//! precondition and persistence failures produce 4xx/5xx (see `ApiError`).

pub mod applications;
pub mod auth;
pub mod documents;
pub mod health;
pub mod invites;
pub mod mirror;
pub mod sse;
pub mod submit;

pub use applications::application_routes;
pub use auth::{Actor, OptionalActor, ACTOR_HEADER};
pub use documents::document_routes;
pub use health::health_routes;
pub use invites::invite_routes;
pub use mirror::mirror_routes;
pub use sse::event_stream;
pub use submit::submit_routes;

/// Parse an id path segment, mapping garbage to 400
pub(crate) fn parse_id(raw: &str) -> crate::ApiResult<uuid::Uuid> {
    Ok(onboard_common::uuid_utils::parse(raw)?)
}
