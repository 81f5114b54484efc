//! Service configuration for onboard-sync
//!
//! Provides multi-tier configuration resolution with CLI → ENV → TOML → default
//! priority. The resulting `ServiceConfig` is validated once at startup and then
//! shared read-only (behind `Arc`) by every component.

use onboard_common::config::{env_parse, env_string};
use onboard_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Service name used for config file and data directory lookup
pub const SERVICE_NAME: &str = "onboard-sync";

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "ONBOARD_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub blob: BlobConfig,
    pub crm: CrmConfig,
    pub webhook: WebhookConfig,
    pub email: EmailConfig,
    pub pipeline: PipelineConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Base URL of the merchant-facing form; invite links are `{base}/apply/{id}`
    pub public_base_url: String,
    /// Request body ceiling (multipart submissions carry the documents)
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            max_request_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to the platform data directory
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            onboard_common::config::default_data_dir(SERVICE_NAME).join("onboard.db")
        })
    }
}

/// Blob store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    /// Storage REST service
    Http,
    /// Local filesystem (development)
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    /// Storage service base URL, e.g. `https://project.example.co/storage/v1`
    pub base_url: Option<String>,
    pub bucket: String,
    pub service_key: Option<String>,
    /// Root directory for the `fs` backend
    pub local_root: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Fs,
            base_url: None,
            bucket: "merchant-documents".to_string(),
            service_key: None,
            local_root: None,
            timeout_secs: 30,
        }
    }
}

impl BlobConfig {
    /// Public object URL prefix; the document proxy only fetches below it
    pub fn public_prefix(&self) -> Option<String> {
        match self.backend {
            BlobBackend::Http => self.base_url.as_ref().map(|base| {
                format!("{}/object/public/{}/", base.trim_end_matches('/'), self.bucket)
            }),
            BlobBackend::Fs => None,
        }
    }

    pub fn resolved_local_root(&self) -> PathBuf {
        self.local_root.clone().unwrap_or_else(|| {
            onboard_common::config::default_data_dir(SERVICE_NAME).join("documents")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub base_id: Option<String>,
    pub table: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: None,
            table: "Merchant Pipeline".to_string(),
            token: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: Option<String>,
    /// Sent as `x-webhook-secret` when set
    pub secret: Option<String>,
    /// Outbound queue size; events beyond it are dropped with a warning
    pub queue_capacity: usize,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            secret: None,
            queue_capacity: 256,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub from_address: String,
    /// Provider request ceiling
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base_url: "https://api.resend.com".to_string(),
            api_key: None,
            from_address: "Merchant Onboarding <onboarding@example.com>".to_string(),
            requests_per_second: 10,
            timeout_secs: 15,
        }
    }
}

/// How a batch of invites is handed to the email provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStrategy {
    /// One batch-send call per batch, sequential fallback on transport failure
    Grouped,
    /// One send per address with retry
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files above this size are skipped, never uploaded
    pub max_upload_bytes: u64,
    pub upload_attempts: u32,
    /// Delay before retry N is N × this
    pub retry_backoff_ms: u64,
    /// Pause between files (not between retries)
    pub file_pacing_ms: u64,
    pub invite_batch_size: usize,
    /// Pause between invite batches (not within one)
    pub invite_batch_pacing_ms: u64,
    /// Per-recipient attempts on the sequential invite path
    pub send_attempts: u32,
    /// Hard abort for the remote-file proxy
    pub proxy_timeout_secs: u64,
    pub send_strategy: SendStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 8 * 1024 * 1024,
            upload_attempts: 3,
            retry_backoff_ms: 1000,
            file_pacing_ms: 100,
            invite_batch_size: 10,
            invite_batch_pacing_ms: 100,
            send_attempts: 3,
            proxy_timeout_secs: 10,
            send_strategy: SendStrategy::Grouped,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared bearer token for privileged routes; `None` disables the check
    pub api_token: Option<String>,
}

/// Highest-priority overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve, load and validate configuration
    ///
    /// Priority: CLI → ENV → TOML → compiled defaults.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let path = onboard_common::config::resolve_config_path(config_path, CONFIG_ENV_VAR, SERVICE_NAME);
        let mut config: ServiceConfig = onboard_common::config::load_toml(path.as_deref())?;

        config.apply_env_overrides()?;

        if let Some(bind) = &cli.bind {
            config.server.bind = bind.clone();
        }
        if let Some(database) = &cli.database {
            config.database.path = Some(database.clone());
        }

        config.validate()?;

        info!(
            bind = %config.server.bind,
            crm = config.crm.enabled,
            webhook = config.webhook.enabled,
            email = config.email.enabled,
            blob = ?config.blob.backend,
            "Configuration resolved"
        );

        Ok(config)
    }

    /// Overlay `ONBOARD_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_string("ONBOARD_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = env_string("ONBOARD_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = env_string("ONBOARD_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("ONBOARD_BLOB_BASE_URL") {
            self.blob.base_url = Some(v);
            self.blob.backend = BlobBackend::Http;
        }
        if let Some(v) = env_string("ONBOARD_BLOB_SERVICE_KEY") {
            self.blob.service_key = Some(v);
        }
        if let Some(v) = env_string("ONBOARD_CRM_BASE_ID") {
            self.crm.base_id = Some(v);
        }
        if let Some(v) = env_string("ONBOARD_CRM_TOKEN") {
            self.crm.token = Some(v);
        }
        if let Some(v) = env_parse::<bool>("ONBOARD_CRM_ENABLED")? {
            self.crm.enabled = v;
        }
        if let Some(v) = env_string("ONBOARD_WEBHOOK_URL") {
            self.webhook.url = Some(v);
        }
        if let Some(v) = env_string("ONBOARD_WEBHOOK_SECRET") {
            self.webhook.secret = Some(v);
        }
        if let Some(v) = env_parse::<bool>("ONBOARD_WEBHOOK_ENABLED")? {
            self.webhook.enabled = v;
        }
        if let Some(v) = env_string("ONBOARD_EMAIL_API_KEY") {
            self.email.api_key = Some(v);
        }
        if let Some(v) = env_string("ONBOARD_EMAIL_FROM") {
            self.email.from_address = v;
        }
        if let Some(v) = env_parse::<bool>("ONBOARD_EMAIL_ENABLED")? {
            self.email.enabled = v;
        }
        if let Some(v) = env_string("ONBOARD_API_TOKEN") {
            self.auth.api_token = Some(v);
        }
        Ok(())
    }

    /// Fail-fast validation; run once at startup
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.server.bind.parse::<SocketAddr>().is_err() {
            problems.push(format!("server.bind {:?} is not a socket address", self.server.bind));
        }
        if !is_http_url(&self.server.public_base_url) {
            problems.push(format!(
                "server.public_base_url {:?} is not an http(s) URL",
                self.server.public_base_url
            ));
        }

        let p = &self.pipeline;
        if p.max_upload_bytes == 0 {
            problems.push("pipeline.max_upload_bytes must be > 0".to_string());
        }
        if p.upload_attempts == 0 {
            problems.push("pipeline.upload_attempts must be > 0".to_string());
        }
        if p.send_attempts == 0 {
            problems.push("pipeline.send_attempts must be > 0".to_string());
        }
        if p.invite_batch_size == 0 {
            problems.push("pipeline.invite_batch_size must be > 0".to_string());
        }
        if p.proxy_timeout_secs == 0 {
            problems.push("pipeline.proxy_timeout_secs must be > 0".to_string());
        }

        if self.blob.backend == BlobBackend::Http {
            match self.blob.base_url.as_deref() {
                Some(url) if is_http_url(url) => {}
                _ => problems.push("blob.base_url must be an http(s) URL for the http backend".to_string()),
            }
            if self.blob.service_key.is_none() {
                problems.push("blob.service_key is required for the http backend".to_string());
            }
        }

        if self.crm.enabled {
            if self.crm.base_id.is_none() {
                problems.push("crm.base_id is required when crm.enabled".to_string());
            }
            if self.crm.token.is_none() {
                problems.push("crm.token is required when crm.enabled".to_string());
            }
            if !is_http_url(&self.crm.base_url) {
                problems.push("crm.base_url must be an http(s) URL".to_string());
            }
        }

        if self.webhook.enabled {
            match self.webhook.url.as_deref() {
                Some(url) if is_http_url(url) => {}
                _ => problems.push("webhook.url must be an http(s) URL when webhook.enabled".to_string()),
            }
            if self.webhook.queue_capacity == 0 {
                problems.push("webhook.queue_capacity must be > 0".to_string());
            }
        }

        if self.email.enabled {
            if self.email.api_key.is_none() {
                problems.push("email.api_key is required when email.enabled".to_string());
            }
            if self.email.from_address.trim().is_empty() {
                problems.push("email.from_address must not be empty".to_string());
            }
            if self.email.requests_per_second == 0 {
                problems.push("email.requests_per_second must be > 0".to_string());
            }
            if !is_http_url(&self.email.api_base_url) {
                problems.push("email.api_base_url must be an http(s) URL".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Invite link for an application
    pub fn invite_link(&self, application_id: uuid::Uuid) -> String {
        format!(
            "{}/apply/{}",
            self.server.public_base_url.trim_end_matches('/'),
            application_id
        )
    }
}

fn is_http_url(value: &str) -> bool {
    match reqwest::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(config.pipeline.upload_attempts, 3);
        assert_eq!(config.pipeline.retry_backoff_ms, 1000);
        assert_eq!(config.pipeline.file_pacing_ms, 100);
        assert_eq!(config.pipeline.invite_batch_size, 10);
        assert_eq!(config.pipeline.proxy_timeout_secs, 10);
    }

    #[test]
    fn test_enabled_satellite_requires_credentials() {
        let mut config = ServiceConfig::default();
        config.crm.enabled = true;
        config.email.enabled = true;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("crm.base_id"));
        assert!(err.contains("crm.token"));
        assert!(err.contains("email.api_key"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = ServiceConfig::default();
        config.pipeline.invite_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_blob_backend_requires_url() {
        let mut config = ServiceConfig::default();
        config.blob.backend = BlobBackend::Http;
        assert!(config.validate().is_err());

        config.blob.base_url = Some("https://storage.example.com/storage/v1".to_string());
        config.blob.service_key = Some("key".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.blob.public_prefix().as_deref(),
            Some("https://storage.example.com/storage/v1/object/public/merchant-documents/")
        );
    }

    #[test]
    fn test_toml_sections_parse() {
        let config: ServiceConfig = onboard_common::config::parse_toml(
            r#"
            [server]
            bind = "0.0.0.0:8080"
            public_base_url = "https://apply.example.com/"

            [pipeline]
            send_strategy = "sequential"
            invite_batch_size = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.pipeline.send_strategy, SendStrategy::Sequential);
        assert_eq!(config.pipeline.invite_batch_size, 5);
        // Untouched values keep defaults
        assert_eq!(config.pipeline.upload_attempts, 3);

        let id = uuid::Uuid::nil();
        assert_eq!(
            config.invite_link(id),
            format!("https://apply.example.com/apply/{}", id)
        );
    }
}
