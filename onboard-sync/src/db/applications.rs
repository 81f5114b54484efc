//! Application record persistence
//!
//! Searchable attributes are mirrored into columns; the canonical field set is
//! stored as one JSON document so absent optional fields persist as `null`.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use onboard_common::{Error, Result};

use crate::models::{ApplicationFields, ApplicationRecord, ApplicationStatus, UploadStatus};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const SELECT_COLUMNS: &str = r#"
    SELECT id, status, agent_email, merchant_email, upload_status,
           parent_application_id, fields, created_at, updated_at, submitted_at
    FROM applications
"#;

/// Input to `upsert_application`
#[derive(Debug, Clone)]
pub struct ApplicationUpsert {
    /// Existing id to update; `None` inserts a new record
    pub id: Option<Uuid>,
    pub status: ApplicationStatus,
    pub fields: ApplicationFields,
    /// Set only by submissions
    pub upload_status: Option<UploadStatus>,
}

/// Equality / range filters for listing
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub agent_email: Option<String>,
    pub merchant_email: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Insert a new record or update an existing one field by field
///
/// With `id = Some` and a stored row, the status transition is checked and the
/// stored fields replaced (an agent already attached to the record is kept when
/// the payload names none). With `id = Some` and no stored row, a record is
/// inserted under the caller's id. With `id = None` a fresh id is generated.
///
/// Concurrent writers racing to create the same caller id do not fail: the
/// insert that loses the race is applied as an update of the winning row.
pub async fn upsert_application(
    pool: &SqlitePool,
    upsert: ApplicationUpsert,
) -> Result<ApplicationRecord> {
    // Second pass only runs after losing an insert race, when the row exists.
    for _ in 0..2 {
        let existing = match upsert.id {
            Some(id) => get_application(pool, id).await?,
            None => None,
        };

        let now = Utc::now();
        let record = match existing {
            Some(record) => {
                let record = apply_update(record, &upsert, now)?;
                update_row(pool, &record).await?;
                record
            }
            None => {
                let mut record = ApplicationRecord::new(upsert.status, upsert.fields.clone());
                if let Some(id) = upsert.id {
                    record.id = id;
                }
                record.upload_status = upsert.upload_status;
                if upsert.status == ApplicationStatus::Submitted {
                    record.submitted_at = Some(now);
                }

                if !insert_row(pool, &record).await? {
                    tracing::debug!(
                        application_id = %record.id,
                        "Concurrent insert won, applying as update"
                    );
                    continue;
                }
                record
            }
        };

        tracing::debug!(
            application_id = %record.id,
            status = %record.status,
            "Application record written"
        );

        return Ok(record);
    }

    Err(Error::Internal(format!(
        "Application {:?} could be neither inserted nor updated",
        upsert.id
    )))
}

fn apply_update(
    mut record: ApplicationRecord,
    upsert: &ApplicationUpsert,
    now: DateTime<Utc>,
) -> Result<ApplicationRecord> {
    if !record.status.can_transition_to(upsert.status) {
        return Err(Error::Conflict(format!(
            "Application {} cannot move from {} to {}",
            record.id, record.status, upsert.status
        )));
    }

    record.agent_email = upsert.fields.agent_email.clone().or(record.agent_email);
    record.merchant_email = upsert.fields.merchant_email.clone().or(record.merchant_email);
    record.fields = upsert.fields.clone();
    record.fields.agent_email = record.agent_email.clone();
    record.fields.merchant_email = record.merchant_email.clone();
    record.status = upsert.status;
    if upsert.upload_status.is_some() {
        record.upload_status = upsert.upload_status;
    }
    if upsert.status == ApplicationStatus::Submitted {
        record.submitted_at = Some(now);
    }
    record.updated_at = now;

    Ok(record)
}

/// Load one record
pub async fn get_application(pool: &SqlitePool, id: Uuid) -> Result<Option<ApplicationRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Load one record or fail with `Error::NotFound`
pub async fn require_application(pool: &SqlitePool, id: Uuid) -> Result<ApplicationRecord> {
    get_application(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Application {}", id)))
}

/// List records, newest first
pub async fn list_applications(
    pool: &SqlitePool,
    filter: &ApplicationFilter,
) -> Result<Vec<ApplicationRecord>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
    query.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(agent) = &filter.agent_email {
        query
            .push(" AND agent_email = ")
            .push_bind(onboard_common::email::normalize_email(agent));
    }
    if let Some(merchant) = &filter.merchant_email {
        query
            .push(" AND merchant_email = ")
            .push_bind(onboard_common::email::normalize_email(merchant));
    }
    if let Some(after) = filter.created_after {
        query.push(" AND created_at >= ").push_bind(after.to_rfc3339());
    }
    if let Some(before) = filter.created_before {
        query.push(" AND created_at < ").push_bind(before.to_rfc3339());
    }

    query.push(" ORDER BY created_at DESC, id");
    query
        .push(" LIMIT ")
        .push_bind(i64::from(filter.limit.unwrap_or(100).clamp(1, 1000)));

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(row_to_record).collect()
}

/// Subset of `emails` that already has a record in `invited` status
///
/// Inputs are expected to be normalized (trimmed, lowercase).
pub async fn find_invited_emails(pool: &SqlitePool, emails: &[String]) -> Result<HashSet<String>> {
    if emails.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT DISTINCT merchant_email FROM applications WHERE status = ",
    );
    query.push_bind(ApplicationStatus::Invited.as_str());
    query.push(" AND merchant_email IN (");
    let mut separated = query.separated(", ");
    for email in emails {
        separated.push_bind(email.as_str());
    }
    separated.push_unseparated(")");

    let found: Vec<String> = query.build_query_scalar::<String>().fetch_all(pool).await?;
    Ok(found.into_iter().collect())
}

/// Move a record to `next`, validating the transition
pub async fn update_status(
    pool: &SqlitePool,
    id: Uuid,
    next: ApplicationStatus,
) -> Result<ApplicationRecord> {
    let mut record = require_application(pool, id).await?;

    if !record.status.can_transition_to(next) {
        return Err(Error::Conflict(format!(
            "Application {} cannot move from {} to {}",
            id, record.status, next
        )));
    }

    record.status = next;
    record.updated_at = Utc::now();
    update_row(pool, &record).await?;

    Ok(record)
}

/// Insert the resend copy of `original` and retire `original` in one transaction
///
/// Returns the new record.
pub async fn insert_resend(
    pool: &SqlitePool,
    original: &ApplicationRecord,
) -> Result<ApplicationRecord> {
    if !original.status.is_resendable() {
        return Err(Error::Conflict(format!(
            "Application {} in status {} cannot be resent",
            original.id, original.status
        )));
    }

    let copy = original.resend_copy();
    let copy_row = RowValues::from_record(&copy)?;
    let original_id = original.id.to_string();
    let retired_at = Utc::now().to_rfc3339();

    retry_on_lock("application resend", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;

        if copy_row.insert(&mut *tx).await? == 0 {
            return Err(Error::Conflict(format!("Application {} already exists", copy_row.id)));
        }

        sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ApplicationStatus::Resent.as_str())
            .bind(&retired_at)
            .bind(&original_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok::<_, Error>(())
    })
    .await?;

    Ok(copy)
}

// ============================================================================
// Row mapping
// ============================================================================

/// Bind-ready column values for one record
struct RowValues {
    id: String,
    status: &'static str,
    agent_email: Option<String>,
    merchant_email: Option<String>,
    legal_name: Option<String>,
    dba_name: Option<String>,
    upload_status: Option<&'static str>,
    parent_application_id: Option<String>,
    fields: String,
    created_at: String,
    updated_at: String,
    submitted_at: Option<String>,
}

impl RowValues {
    fn from_record(record: &ApplicationRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.to_string(),
            status: record.status.as_str(),
            agent_email: record.agent_email.clone(),
            merchant_email: record.merchant_email.clone(),
            legal_name: record.fields.legal_name.clone(),
            dba_name: record.fields.dba_name.clone(),
            upload_status: record.upload_status.map(|s| s.as_str()),
            parent_application_id: record.parent_application_id.map(|id| id.to_string()),
            fields: serde_json::to_string(&record.fields)?,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            submitted_at: record.submitted_at.map(|dt| dt.to_rfc3339()),
        })
    }

    /// Returns rows affected; 0 when the id is already taken
    async fn insert<'e, E>(&self, executor: E) -> Result<u64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO applications (
                id, status, agent_email, merchant_email, legal_name, dba_name,
                upload_status, parent_application_id, fields,
                created_at, updated_at, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&self.id)
        .bind(self.status)
        .bind(&self.agent_email)
        .bind(&self.merchant_email)
        .bind(&self.legal_name)
        .bind(&self.dba_name)
        .bind(self.upload_status)
        .bind(&self.parent_application_id)
        .bind(&self.fields)
        .bind(&self.created_at)
        .bind(&self.updated_at)
        .bind(&self.submitted_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    async fn update<'e, E>(&self, executor: E) -> Result<u64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE applications SET
                status = ?, agent_email = ?, merchant_email = ?, legal_name = ?,
                dba_name = ?, upload_status = ?, fields = ?, updated_at = ?,
                submitted_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.status)
        .bind(&self.agent_email)
        .bind(&self.merchant_email)
        .bind(&self.legal_name)
        .bind(&self.dba_name)
        .bind(self.upload_status)
        .bind(&self.fields)
        .bind(&self.updated_at)
        .bind(&self.submitted_at)
        .bind(&self.id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

/// `false` when a row with the same id already exists
async fn insert_row(pool: &SqlitePool, record: &ApplicationRecord) -> Result<bool> {
    let values = RowValues::from_record(record)?;
    let affected = retry_on_lock("application insert", DEFAULT_MAX_LOCK_WAIT_MS, || {
        values.insert(pool)
    })
    .await?;
    Ok(affected > 0)
}

async fn update_row(pool: &SqlitePool, record: &ApplicationRecord) -> Result<()> {
    let values = RowValues::from_record(record)?;
    let affected = retry_on_lock("application update", DEFAULT_MAX_LOCK_WAIT_MS, || {
        values.update(pool)
    })
    .await?;

    if affected == 0 {
        return Err(Error::NotFound(format!("Application {}", record.id)));
    }
    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<ApplicationRecord> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let upload_status: Option<String> = row.try_get("upload_status")?;
    let parent: Option<String> = row.try_get("parent_application_id")?;
    let fields: String = row.try_get("fields")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let submitted_at: Option<String> = row.try_get("submitted_at")?;

    Ok(ApplicationRecord {
        id: parse_stored_uuid(&id)?,
        status: status.parse().map_err(Error::Internal)?,
        agent_email: row.try_get("agent_email")?,
        merchant_email: row.try_get("merchant_email")?,
        upload_status: upload_status
            .map(|s| s.parse::<UploadStatus>())
            .transpose()
            .map_err(Error::Internal)?,
        parent_application_id: parent.as_deref().map(parse_stored_uuid).transpose()?,
        fields: serde_json::from_str(&fields)?,
        created_at: parse_stored_time(&created_at)?,
        updated_at: parse_stored_time(&updated_at)?,
        submitted_at: submitted_at.as_deref().map(parse_stored_time).transpose()?,
    })
}

pub(crate) fn parse_stored_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Stored id {:?} invalid: {}", value, e)))
}

pub(crate) fn parse_stored_time(value: &str) -> Result<DateTime<Utc>> {
    onboard_common::time::parse_rfc3339(value)
        .ok_or_else(|| Error::Internal(format!("Stored timestamp {:?} invalid", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_common::db::init_memory_database;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> ApplicationFields {
        ApplicationFields::from_raw(&value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_generates_id_and_round_trips() {
        let pool = init_memory_database().await.unwrap();

        let record = upsert_application(
            &pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Draft,
                fields: fields(json!({"legalName": "Acme LLC", "email": "M@Acme.com"})),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        let loaded = require_application(&pool, record.id).await.unwrap();
        assert_eq!(loaded.status, ApplicationStatus::Draft);
        assert_eq!(loaded.merchant_email.as_deref(), Some("m@acme.com"));
        assert_eq!(loaded.fields, record.fields);
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_agent() {
        let pool = init_memory_database().await.unwrap();

        let first = upsert_application(
            &pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Invited,
                fields: fields(json!({"email": "m@x.com", "agentEmail": "agent@x.com"})),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        let second = upsert_application(
            &pool,
            ApplicationUpsert {
                id: Some(first.id),
                status: ApplicationStatus::Submitted,
                fields: fields(json!({"legalName": "Acme", "email": "m@x.com"})),
                upload_status: Some(UploadStatus::Complete),
            },
        )
        .await
        .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.agent_email.as_deref(), Some("agent@x.com"));
        assert!(second.submitted_at.is_some());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_update_without_email_keeps_stored_merchant_in_fields() {
        let pool = init_memory_database().await.unwrap();

        let first = upsert_application(
            &pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Draft,
                fields: fields(json!({"email": "m@x.com"})),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        let second = upsert_application(
            &pool,
            ApplicationUpsert {
                id: Some(first.id),
                status: ApplicationStatus::Draft,
                fields: fields(json!({"legalName": "Acme"})),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(second.merchant_email.as_deref(), Some("m@x.com"));
        assert_eq!(second.fields.merchant_email.as_deref(), Some("m@x.com"));

        let loaded = require_application(&pool, first.id).await.unwrap();
        assert_eq!(loaded.fields.merchant_email.as_deref(), Some("m@x.com"));
        assert_eq!(loaded.fields.legal_name.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_under_same_id_both_succeed() {
        let pool = init_memory_database().await.unwrap();
        let id = Uuid::new_v4();
        let write = |name: &'static str| ApplicationUpsert {
            id: Some(id),
            status: ApplicationStatus::Submitted,
            fields: fields(json!({ "legalName": name, "email": "m@x.com" })),
            upload_status: Some(UploadStatus::Complete),
        };

        let (a, b) = tokio::join!(
            upsert_application(&pool, write("First")),
            upsert_application(&pool, write("Second")),
        );

        assert_eq!(a.unwrap().id, id);
        assert_eq!(b.unwrap().id, id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_backward_transition_is_conflict() {
        let pool = init_memory_database().await.unwrap();
        let record = upsert_application(
            &pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Submitted,
                fields: ApplicationFields::default(),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        let result = update_status(&pool, record.id, ApplicationStatus::Draft).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_invited_emails_only_matches_invited() {
        let pool = init_memory_database().await.unwrap();
        for (email, status) in [
            ("a@x.com", ApplicationStatus::Invited),
            ("b@x.com", ApplicationStatus::Submitted),
        ] {
            upsert_application(
                &pool,
                ApplicationUpsert {
                    id: None,
                    status,
                    fields: fields(json!({ "email": email })),
                    upload_status: None,
                },
            )
            .await
            .unwrap();
        }

        let found = find_invited_emails(
            &pool,
            &["a@x.com".to_string(), "b@x.com".to_string(), "c@x.com".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found.contains("a@x.com"));
    }

    #[tokio::test]
    async fn test_insert_resend_links_and_retires() {
        let pool = init_memory_database().await.unwrap();
        let original = upsert_application(
            &pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Invited,
                fields: fields(json!({"email": "m@x.com"})),
                upload_status: None,
            },
        )
        .await
        .unwrap();

        let copy = insert_resend(&pool, &original).await.unwrap();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.parent_application_id, Some(original.id));

        let old = require_application(&pool, original.id).await.unwrap();
        assert_eq!(old.status, ApplicationStatus::Resent);

        let resent_again = insert_resend(&pool, &old).await;
        assert!(matches!(resent_again, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let pool = init_memory_database().await.unwrap();
        for (merchant, agent) in [("a@x.com", "one@x.com"), ("b@x.com", "two@x.com")] {
            upsert_application(
                &pool,
                ApplicationUpsert {
                    id: None,
                    status: ApplicationStatus::Draft,
                    fields: fields(json!({ "email": merchant, "agentEmail": agent })),
                    upload_status: None,
                },
            )
            .await
            .unwrap();
        }

        let filter = ApplicationFilter {
            agent_email: Some("ONE@x.com".to_string()),
            ..Default::default()
        };
        let listed = list_applications(&pool, &filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].merchant_email.as_deref(), Some("a@x.com"));

        let all = list_applications(&pool, &ApplicationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
