//! CRM mirror API client
//!
//! The mirror is a table-records REST API. It has no foreign key on the
//! application id, so records are found with a formula search on the
//! embedded `Application ID` field.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Mirror field holding the application id
pub const APPLICATION_ID_FIELD: &str = "Application ID";

/// CRM client errors
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("CRM API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid CRM configuration: {0}")]
    InvalidConfig(String),
}

/// One record in the mirror table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MirrorRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Operations the mirror sync needs from the CRM
#[async_trait]
pub trait CrmMirrorApi: Send + Sync {
    /// Records whose application-id field equals `application_id`
    async fn search_by_application_id(
        &self,
        application_id: &str,
    ) -> Result<Vec<MirrorRecord>, CrmError>;

    async fn create(&self, fields: &Map<String, Value>) -> Result<MirrorRecord, CrmError>;

    async fn update(&self, record_id: &str, fields: &Map<String, Value>) -> Result<(), CrmError>;

    async fn delete(&self, record_id: &str) -> Result<(), CrmError>;
}

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<MirrorRecord>,
}

/// Formula matching one application id; single quotes are escaped
pub fn application_id_formula(application_id: &str) -> String {
    format!(
        "{{{}}}='{}'",
        APPLICATION_ID_FIELD,
        application_id.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

/// HTTP client for the mirror table
pub struct HttpCrmMirror {
    client: Client,
    table_url: Url,
    token: String,
}

impl HttpCrmMirror {
    pub fn new(
        base_url: &str,
        base_id: &str,
        table: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, CrmError> {
        let mut table_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| CrmError::InvalidConfig(format!("base_url: {}", e)))?;
        table_url
            .path_segments_mut()
            .map_err(|_| CrmError::InvalidConfig("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(base_id)
            .push(table);

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CrmError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            table_url,
            token: token.to_string(),
        })
    }

    fn record_url(&self, record_id: &str) -> Result<Url, CrmError> {
        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| CrmError::InvalidConfig("table URL cannot be a base".to_string()))?
            .push(record_id);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CrmError::RateLimitExceeded);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CrmError::ApiError(status.as_u16(), body))
    }
}

#[async_trait]
impl CrmMirrorApi for HttpCrmMirror {
    async fn search_by_application_id(
        &self,
        application_id: &str,
    ) -> Result<Vec<MirrorRecord>, CrmError> {
        let formula = application_id_formula(application_id);
        tracing::debug!(application_id = %application_id, "Searching CRM mirror");

        let response = self
            .client
            .get(self.table_url.clone())
            .bearer_auth(&self.token)
            .query(&[("filterByFormula", formula.as_str())])
            .send()
            .await
            .map_err(|e| CrmError::NetworkError(e.to_string()))?;

        let list: RecordList = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CrmError::ParseError(e.to_string()))?;

        Ok(list.records)
    }

    async fn create(&self, fields: &Map<String, Value>) -> Result<MirrorRecord, CrmError> {
        let response = self
            .client
            .post(self.table_url.clone())
            .bearer_auth(&self.token)
            .json(&json!({ "fields": fields, "typecast": true }))
            .send()
            .await
            .map_err(|e| CrmError::NetworkError(e.to_string()))?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CrmError::ParseError(e.to_string()))
    }

    async fn update(&self, record_id: &str, fields: &Map<String, Value>) -> Result<(), CrmError> {
        let response = self
            .client
            .patch(self.record_url(record_id)?)
            .bearer_auth(&self.token)
            .json(&json!({ "fields": fields, "typecast": true }))
            .send()
            .await
            .map_err(|e| CrmError::NetworkError(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, record_id: &str) -> Result<(), CrmError> {
        let response = self
            .client
            .delete(self.record_url(record_id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| CrmError::NetworkError(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula() {
        assert_eq!(application_id_formula("abc-123"), "{Application ID}='abc-123'");
        assert_eq!(application_id_formula("a'b"), "{Application ID}='a\\'b'");
    }

    #[test]
    fn test_table_url_encodes_segments() {
        let client = HttpCrmMirror::new(
            "https://api.airtable.com/v0/",
            "appXYZ",
            "Merchant Pipeline",
            "token",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            client.table_url.as_str(),
            "https://api.airtable.com/v0/appXYZ/Merchant%20Pipeline"
        );
        assert_eq!(
            client.record_url("rec1").unwrap().as_str(),
            "https://api.airtable.com/v0/appXYZ/Merchant%20Pipeline/rec1"
        );
    }

    #[test]
    fn test_record_list_parses() {
        let list: RecordList = serde_json::from_str(
            r#"{"records":[{"id":"rec1","fields":{"Application ID":"a"}},{"id":"rec2"}]}"#,
        )
        .unwrap();
        assert_eq!(list.records.len(), 2);
        assert!(list.records[1].fields.is_empty());
    }
}
