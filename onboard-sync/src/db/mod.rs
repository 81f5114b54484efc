//! Record store for onboard-sync
//!
//! The system of record: application rows plus their child upload rows. Pool
//! creation and schema live in `onboard_common::db`; this module owns the
//! queries. Every write runs under `retry_on_lock`.

pub mod applications;
pub mod uploads;

pub use applications::{
    find_invited_emails, get_application, insert_resend, list_applications, require_application,
    update_status, upsert_application, ApplicationFilter, ApplicationUpsert,
};
pub use uploads::{list_uploads, replace_children};
