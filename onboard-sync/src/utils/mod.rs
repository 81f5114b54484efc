//! Utility modules for onboard-sync

pub mod db_retry;
pub mod object_path;
pub mod retry;

pub use db_retry::retry_on_lock;
pub use retry::{retry_linear, RetryExhausted, RetryPolicy};
