//! Upload child rows
//!
//! A submission replaces the complete child set of its application: every
//! existing row is deleted and the fresh set inserted inside one transaction,
//! so repeated submissions can never leave stale or duplicate document rows.

use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use onboard_common::{Error, Result};

use super::applications::{parse_stored_time, parse_stored_uuid};
use crate::models::UploadRecord;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Replace every upload row of `application_id` with `records`
///
/// When `records` names the same document type twice, the last one wins.
/// Returns the number of rows inserted.
pub async fn replace_children(
    pool: &SqlitePool,
    application_id: Uuid,
    records: &[UploadRecord],
) -> Result<usize> {
    let app_id = application_id.to_string();

    let mut by_type: BTreeMap<&str, &UploadRecord> = BTreeMap::new();
    for record in records {
        by_type.insert(record.document_type.as_str(), record);
    }
    let fresh: Vec<&UploadRecord> = by_type.into_values().collect();

    let (deleted, inserted) = retry_on_lock("replace upload rows", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM application_uploads WHERE application_id = ?")
            .bind(&app_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for record in &fresh {
            sqlx::query(
                r#"
                INSERT INTO application_uploads (
                    id, application_id, document_type, file_name,
                    content_type, size_bytes, url, uploaded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.id.to_string())
            .bind(&app_id)
            .bind(&record.document_type)
            .bind(&record.file_name)
            .bind(&record.content_type)
            .bind(record.size_bytes)
            .bind(&record.url)
            .bind(record.uploaded_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok::<_, Error>((deleted, fresh.len()))
    })
    .await?;

    tracing::debug!(
        application_id = %application_id,
        deleted,
        inserted,
        "Upload rows replaced"
    );

    Ok(inserted)
}

/// Upload rows of one application, ordered by document type
pub async fn list_uploads(pool: &SqlitePool, application_id: Uuid) -> Result<Vec<UploadRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, application_id, document_type, file_name, content_type,
               size_bytes, url, uploaded_at
        FROM application_uploads
        WHERE application_id = ?
        ORDER BY document_type
        "#,
    )
    .bind(application_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            let app_id: String = row.try_get("application_id")?;
            let uploaded_at: String = row.try_get("uploaded_at")?;

            Ok(UploadRecord {
                id: parse_stored_uuid(&id)?,
                application_id: parse_stored_uuid(&app_id)?,
                document_type: row.try_get("document_type")?,
                file_name: row.try_get("file_name")?,
                content_type: row.try_get("content_type")?,
                size_bytes: row.try_get("size_bytes")?,
                url: row.try_get("url")?,
                uploaded_at: parse_stored_time(&uploaded_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::applications::{upsert_application, ApplicationUpsert};
    use crate::models::{ApplicationFields, ApplicationStatus};
    use chrono::Utc;
    use onboard_common::db::init_memory_database;

    fn upload(application_id: Uuid, document_type: &str, url: &str) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            application_id,
            document_type: document_type.to_string(),
            file_name: format!("{}.pdf", document_type),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 1024,
            url: url.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    async fn seeded_application(pool: &SqlitePool) -> Uuid {
        upsert_application(
            pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Submitted,
                fields: ApplicationFields::default(),
                upload_status: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_replace_removes_stale_types() {
        let pool = init_memory_database().await.unwrap();
        let app = seeded_application(&pool).await;

        replace_children(
            &pool,
            app,
            &[upload(app, "voided_check", "u1"), upload(app, "drivers_license", "u2")],
        )
        .await
        .unwrap();

        replace_children(
            &pool,
            app,
            &[upload(app, "voided_check", "u3"), upload(app, "bank_statement", "u4")],
        )
        .await
        .unwrap();

        let rows = list_uploads(&pool, app).await.unwrap();
        let types: Vec<_> = rows.iter().map(|r| r.document_type.as_str()).collect();
        assert_eq!(types, vec!["bank_statement", "voided_check"]);
        assert_eq!(rows[1].url, "u3");
    }

    #[tokio::test]
    async fn test_duplicate_types_in_one_set_keep_last() {
        let pool = init_memory_database().await.unwrap();
        let app = seeded_application(&pool).await;

        let inserted = replace_children(
            &pool,
            app,
            &[upload(app, "voided_check", "first"), upload(app, "voided_check", "second")],
        )
        .await
        .unwrap();

        assert_eq!(inserted, 1);
        let rows = list_uploads(&pool, app).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "second");
    }

    #[tokio::test]
    async fn test_empty_set_clears_rows() {
        let pool = init_memory_database().await.unwrap();
        let app = seeded_application(&pool).await;

        replace_children(&pool, app, &[upload(app, "voided_check", "u1")])
            .await
            .unwrap();
        replace_children(&pool, app, &[]).await.unwrap();

        assert!(list_uploads(&pool, app).await.unwrap().is_empty());
    }
}
