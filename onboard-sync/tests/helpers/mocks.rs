//! Recording mocks for the external systems

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use onboard_sync::services::crm_client::APPLICATION_ID_FIELD;
use onboard_sync::services::email_client::BatchItemResult;
use onboard_sync::services::{
    BlobError, BlobStore, CrmError, CrmMirrorApi, EmailError, EmailMessage, EmailProvider,
    MirrorRecord, WebhookError, WebhookTransport,
};

const BLOB_URL_PREFIX: &str = "mem://documents/";

// ============================================================================
// Blob store
// ============================================================================

#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Instants of every put attempt
    pub put_attempts: Mutex<Vec<tokio::time::Instant>>,
    /// Number of upcoming puts to fail
    pub fail_next: AtomicU32,
    pub always_fail: AtomicBool,
}

impl MemoryBlobStore {
    pub fn put_count(&self) -> usize {
        self.put_attempts.lock().unwrap().len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8], _content_type: Option<&str>) -> Result<(), BlobError> {
        self.put_attempts
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(BlobError::ApiError(503, "storage unavailable".to_string()));
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BlobError::NetworkError("connection reset".to_string()));
        }

        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, BlobError> {
        Ok(format!("{}{}", BLOB_URL_PREFIX, path))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        let mut objects = self.objects.lock().unwrap();
        let doomed: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            objects.remove(key);
        }
        Ok(doomed.len())
    }

    fn object_path(&self, url: &str) -> Option<String> {
        url.strip_prefix(BLOB_URL_PREFIX).map(str::to_string)
    }
}

// ============================================================================
// CRM mirror
// ============================================================================

#[derive(Default)]
pub struct MockCrm {
    pub records: Mutex<Vec<MirrorRecord>>,
    pub searches: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail: AtomicBool,
    next_id: AtomicUsize,
}

impl MockCrm {
    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.writes()
    }

    pub fn records_for(&self, application_id: &str) -> Vec<MirrorRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.fields.get(APPLICATION_ID_FIELD).and_then(Value::as_str) == Some(application_id))
            .cloned()
            .collect()
    }

    /// Seed a record directly, bypassing the counters
    pub fn seed(&self, application_id: &str) -> String {
        let id = format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut fields = Map::new();
        fields.insert(APPLICATION_ID_FIELD.to_string(), Value::from(application_id));
        self.records.lock().unwrap().push(MirrorRecord {
            id: id.clone(),
            fields,
        });
        id
    }

    fn check(&self) -> Result<(), CrmError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(CrmError::ApiError(500, "mirror unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CrmMirrorApi for MockCrm {
    async fn search_by_application_id(&self, application_id: &str) -> Result<Vec<MirrorRecord>, CrmError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        // Widen the search-then-write window
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.check()?;
        Ok(self.records_for(application_id))
    }

    async fn create(&self, fields: &Map<String, Value>) -> Result<MirrorRecord, CrmError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let record = MirrorRecord {
            id: format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            fields: fields.clone(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update(&self, record_id: &str, fields: &Map<String, Value>) -> Result<(), CrmError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record_id) {
            Some(record) => {
                record.fields.extend(fields.clone());
                Ok(())
            }
            None => Err(CrmError::ApiError(404, "no such record".to_string())),
        }
    }

    async fn delete(&self, record_id: &str) -> Result<(), CrmError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.records.lock().unwrap().retain(|r| r.id != record_id);
        Ok(())
    }
}

// ============================================================================
// Email provider
// ============================================================================

#[derive(Default)]
pub struct MockEmail {
    /// Every message the provider accepted
    pub sent: Mutex<Vec<EmailMessage>>,
    /// Recipients whose sends are rejected
    pub reject: Mutex<HashSet<String>>,
    pub send_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    /// Start instant of every single send
    pub send_started: Mutex<Vec<tokio::time::Instant>>,
    /// Start instant of every batch send
    pub batch_started: Mutex<Vec<tokio::time::Instant>>,
    /// Batch endpoint transport failure
    pub batch_down: AtomicBool,
}

impl MockEmail {
    pub fn reject(&self, recipient: &str) {
        self.reject.lock().unwrap().insert(recipient.to_string());
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .flat_map(|m| m.to.clone())
            .collect()
    }

    pub fn subjects_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to.iter().any(|t| t == recipient))
            .map(|m| m.subject.clone())
            .collect()
    }

    fn accept(&self, message: &EmailMessage) -> Result<String, String> {
        let rejected = {
            let reject = self.reject.lock().unwrap();
            message.to.iter().find(|to| reject.contains(*to)).cloned()
        };
        if let Some(to) = rejected {
            return Err(format!("recipient {} rejected", to));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}

#[async_trait]
impl EmailProvider for MockEmail {
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.send_started
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.accept(message)
            .map_err(|e| EmailError::ApiError(422, e))
    }

    async fn send_batch(&self, messages: &[EmailMessage]) -> Result<Vec<BatchItemResult>, EmailError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_started
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        if self.batch_down.load(Ordering::SeqCst) {
            return Err(EmailError::NetworkError("batch endpoint unreachable".to_string()));
        }
        Ok(messages.iter().map(|m| self.accept(m)).collect())
    }
}

// ============================================================================
// Webhook
// ============================================================================

#[derive(Default)]
pub struct RecordingWebhook {
    pub bodies: Mutex<Vec<Map<String, Value>>>,
    pub fail: AtomicBool,
}

impl RecordingWebhook {
    pub fn events(&self) -> Vec<String> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .filter_map(|b| b.get("event").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

#[async_trait]
impl WebhookTransport for RecordingWebhook {
    async fn deliver(&self, body: &Map<String, Value>) -> Result<(), WebhookError> {
        self.bodies.lock().unwrap().push(body.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(WebhookError::EndpointError(500, "automation down".to_string()));
        }
        Ok(())
    }
}
