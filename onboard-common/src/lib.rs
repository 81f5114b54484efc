//! # Onboard Common Library
//!
//! Shared code for the merchant onboarding services including:
//! - Error types
//! - Identity gate checks and email address normalization
//! - Configuration file loading and resolution
//! - Pipeline event types and the broadcast EventBus
//! - Database bootstrap (pool, pragmas, schema)
//! - SSE helpers and small utility functions

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod email;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
