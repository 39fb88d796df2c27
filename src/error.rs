use thiserror::Error;

/// Failures that `RubricScorer::evaluate` surfaces to its caller.
///
/// Anything wrong with the *content* of an upstream reply is absorbed by the
/// scorer and never shows up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("text-generation endpoint unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("text-generation endpoint rate limit exceeded")]
    UpstreamRateLimited,

    #[error("text-generation endpoint requires payment")]
    UpstreamBillingRequired,
}

impl ScoreError {
    /// HTTP status the endpoint answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ScoreError::UpstreamUnavailable(_) => 500,
            ScoreError::UpstreamRateLimited => 429,
            ScoreError::UpstreamBillingRequired => 402,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ScoreError::UpstreamUnavailable(_) => "AI gateway error".to_string(),
            ScoreError::UpstreamRateLimited => {
                "Rate limits exceeded, please try again later.".to_string()
            }
            ScoreError::UpstreamBillingRequired => {
                "Payment required, please add funds to your workspace.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ScoreError {
    fn from(e: reqwest::Error) -> Self {
        ScoreError::UpstreamUnavailable(format!("HTTP request failed: {}", e))
    }
}

/// Audit sink write failures. Logged and dropped by the scorer.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("audit serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit store rejected record ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_map_to_distinct_statuses() {
        let statuses = [
            ScoreError::UpstreamUnavailable("boom".into()).status_code(),
            ScoreError::UpstreamRateLimited.status_code(),
            ScoreError::UpstreamBillingRequired.status_code(),
        ];
        assert_eq!(statuses, [500, 429, 402]);
    }

    #[test]
    fn rate_limit_message_asks_to_retry_later() {
        assert!(ScoreError::UpstreamRateLimited
            .user_message()
            .contains("try again later"));
    }
}
