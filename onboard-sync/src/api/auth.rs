//! Identity gate extractors
//!
//! Privileged handlers take an `Actor`: the `x-actor-email` header must hold a
//! valid address and, when an API token is configured, `Authorization` must
//! carry it as a bearer token. Rejections happen before any pipeline work.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use onboard_common::api::{validate_actor_email, validate_bearer_token};

use crate::{error::ApiError, AppState};

/// Header naming the acting user
pub const ACTOR_HEADER: &str = "x-actor-email";

/// Authenticated caller of a privileged route
#[derive(Debug, Clone)]
pub struct Actor {
    /// Normalized actor email
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        validate_bearer_token(authorization, state.config.auth.api_token.as_deref())?;

        let actor = parts.headers.get(ACTOR_HEADER).and_then(|v| v.to_str().ok());
        let email = validate_actor_email(actor)?;

        tracing::debug!(actor = %email, path = %parts.uri.path(), "Actor authenticated");
        Ok(Actor { email })
    }
}

/// Actor on open routes: absent header is fine, a malformed one is not
#[derive(Debug, Clone)]
pub struct OptionalActor(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        match parts.headers.get(ACTOR_HEADER) {
            None => Ok(OptionalActor(None)),
            Some(value) => {
                let email = validate_actor_email(value.to_str().ok())?;
                Ok(OptionalActor(Some(email)))
            }
        }
    }
}
