//! API module for shared HTTP API functionality
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//!
//! Services wrap these with framework-specific extractors (Axum, etc.).

pub mod auth;

pub use auth::{validate_actor_email, validate_bearer_token, ApiAuthError};
