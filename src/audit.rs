use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::AuditError;

pub const DEFAULT_TABLE: &str = "prompt_feedback";
pub const DEFAULT_REST_TIMEOUT: Duration = Duration::from_secs(5);

/// One scored prompt, as written to the audit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub prompt: String,
    pub model_answer: String,
    pub score: f64,
    pub goal_score: f64,
    pub context_score: f64,
    pub source_score: f64,
    pub expectation_score: f64,
    pub feedback: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Write-only destination for past evaluations.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditRecord) -> Result<(), AuditError>;

    fn name(&self) -> &'static str;
}

pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _entry: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Appends one JSON object per line. Writes are serialized so concurrent
/// evaluations never interleave within a line.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, entry: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// Inserts records into a PostgREST table (`POST {url}/rest/v1/{table}`).
pub struct RestTableSink {
    url: String,
    service_key: String,
    table: String,
    client: reqwest::Client,
}

impl RestTableSink {
    /// Requests are bounded by `DEFAULT_REST_TIMEOUT`.
    pub fn new(url: String, service_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            table: DEFAULT_TABLE.to_string(),
            client,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AuditError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn with_table(mut self, table: String) -> Self {
        self.table = table;
        self
    }
}

#[async_trait]
impl AuditSink for RestTableSink {
    async fn record(&self, entry: &AuditRecord) -> Result<(), AuditError> {
        let response = self
            .client
            .post(format!("{}/rest/v1/{}", self.url, self.table))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Prefer", "return=minimal")
            .json(&[entry])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Rejected { status, body });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}
