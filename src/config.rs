use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::audit::{AuditSink, JsonlAuditSink, NoopAuditSink, RestTableSink};
use crate::error::{ConfigError, ScoreError};
use crate::grading::{RubricScorer, ScorerConfig, TotalPolicy};
use crate::llm::{ChatCompletionsClient, DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9002";

const REDACTED: &str = "<redacted>";

#[derive(Clone, PartialEq)]
pub enum AuditTarget {
    Rest { url: String, service_key: String },
    Jsonl(PathBuf),
    Disabled,
}

impl fmt::Debug for AuditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditTarget::Rest { url, .. } => f
                .debug_struct("Rest")
                .field("url", url)
                .field("service_key", &REDACTED)
                .finish(),
            AuditTarget::Jsonl(path) => f.debug_tuple("Jsonl").field(path).finish(),
            AuditTarget::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Everything the server reads from its environment.
#[derive(Clone, PartialEq)]
pub struct ServiceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Option<Duration>,
    pub bind_addr: String,
    pub audit: AuditTarget,
    pub total_policy: TotalPolicy,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &REDACTED)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("bind_addr", &self.bind_addr)
            .field("audit", &self.audit)
            .field("total_policy", &self.total_policy)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("LLM_API_KEY")
            .or_else(|| get("LOVABLE_API_KEY"))
            .ok_or(ConfigError::Missing("LLM_API_KEY"))?;

        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                    key: "LLM_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let total_policy = match get("SCORER_TOTAL_POLICY").as_deref().map(str::trim) {
            None | Some("reported") => TotalPolicy::AsReported,
            Some("sum") => TotalPolicy::SumOfCriteria,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SCORER_TOTAL_POLICY",
                    value: other.to_string(),
                })
            }
        };

        let audit = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => AuditTarget::Rest { url, service_key },
            _ => match get("AUDIT_LOG_PATH") {
                Some(path) => AuditTarget::Jsonl(PathBuf::from(path)),
                None => AuditTarget::Disabled,
            },
        };

        Ok(Self {
            api_key,
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
            bind_addr: get("SCORER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            audit,
            total_policy,
        })
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        match &self.audit {
            AuditTarget::Rest { url, service_key } => {
                info!("Audit records go to {}", url);
                Arc::new(RestTableSink::new(url.clone(), service_key.clone()))
            }
            AuditTarget::Jsonl(path) => {
                info!("Audit records go to {}", path.display());
                Arc::new(JsonlAuditSink::new(path.clone()))
            }
            AuditTarget::Disabled => {
                info!("Audit sink not configured; skipping storage of feedback");
                Arc::new(NoopAuditSink)
            }
        }
    }

    /// Wires the text-generation client, audit sink and scorer settings together.
    pub fn build_scorer(&self) -> Result<RubricScorer, ScoreError> {
        let mut client = ChatCompletionsClient::new(self.api_key.clone())
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone());
        if let Some(timeout) = self.timeout {
            client = client.with_timeout(timeout)?;
        }

        let scorer_config = ScorerConfig {
            total_policy: self.total_policy,
            ..ScorerConfig::default()
        };

        Ok(RubricScorer::new(Arc::new(client))
            .with_config(scorer_config)
            .with_audit_sink(self.audit_sink()))
    }
}
