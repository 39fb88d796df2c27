pub mod parse;
pub mod rubrics;

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::audit::{AuditRecord, AuditSink, NoopAuditSink};
use crate::error::ScoreError;
use crate::llm::TextGenerator;
use parse::ResponseFields;

/// A prompt to grade, as sent by the training client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(rename = "prompt")]
    pub submitted_text: String,
    #[serde(rename = "modelAnswer", default)]
    pub reference_answer: String,
}

impl EvaluationRequest {
    pub fn new(submitted_text: impl Into<String>, reference_answer: impl Into<String>) -> Self {
        Self {
            submitted_text: submitted_text.into(),
            reference_answer: reference_answer.into(),
        }
    }

    /// Blank submissions must be rejected before they reach the scorer.
    pub fn is_blank(&self) -> bool {
        self.submitted_text.trim().is_empty()
    }
}

/// Always fully populated and within range, however bad the model reply was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "score")]
    pub total_score: f64,
    pub goal_score: f64,
    pub context_score: f64,
    pub source_score: f64,
    pub expectation_score: f64,
    pub feedback: String,
    #[serde(rename = "enhanced_prompt")]
    pub enhanced_text: String,
}

impl EvaluationResult {
    pub fn criteria_sum(&self) -> f64 {
        self.goal_score + self.context_score + self.source_score + self.expectation_score
    }
}

/// What to do with the model's own `score` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalPolicy {
    /// Keep the reported total; it may disagree with the sub-scores.
    #[default]
    AsReported,
    /// Replace it with the sum of the clamped sub-scores.
    SumOfCriteria,
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub system_prompt: String,
    pub total_range: RangeInclusive<f64>,
    pub criterion_range: RangeInclusive<f64>,
    /// Cap on fallback feedback built from raw model text.
    pub feedback_max_chars: usize,
    /// How much of the submitted text goes into the log line.
    pub log_preview_chars: usize,
    pub total_policy: TotalPolicy,
    /// Longest an audit write may hold up a result before it is abandoned.
    pub audit_timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            system_prompt: rubrics::default_system_prompt(),
            total_range: 0.0..=20.0,
            criterion_range: 1.0..=5.0,
            feedback_max_chars: 2000,
            log_preview_chars: 500,
            total_policy: TotalPolicy::AsReported,
            audit_timeout: Duration::from_secs(5),
        }
    }
}

/// NaN lands on the lower bound. Never panics, even for an inverted range.
fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    value.max(*range.start()).min(*range.end())
}

impl ScorerConfig {
    /// The single validation gate: every path out of the scorer goes through here.
    pub fn normalize(&self, fields: ResponseFields, submitted_text: &str) -> EvaluationResult {
        let [goal, context, source, expectation] =
            fields.criteria.map(|v| clamp_to(v, &self.criterion_range));

        let mut result = EvaluationResult {
            total_score: clamp_to(fields.total, &self.total_range),
            goal_score: goal,
            context_score: context,
            source_score: source,
            expectation_score: expectation,
            feedback: fields.feedback,
            enhanced_text: fields
                .enhanced
                .unwrap_or_else(|| submitted_text.to_string()),
        };

        if self.total_policy == TotalPolicy::SumOfCriteria {
            result.total_score = clamp_to(result.criteria_sum(), &self.total_range);
        }
        result
    }
}

/// Grades prompts against the Goal/Context/Source/Expectation rubric.
///
/// Stateless apart from its collaborators; one instance can serve any number
/// of concurrent evaluations.
pub struct RubricScorer {
    config: ScorerConfig,
    generator: Arc<dyn TextGenerator>,
    audit: Arc<dyn AuditSink>,
}

impl RubricScorer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            config: ScorerConfig::default(),
            generator,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn score(&self, request: &EvaluationRequest) -> Result<EvaluationResult, ScoreError> {
        self.evaluate(&request.submitted_text, &request.reference_answer)
            .await
    }

    /// Fails only when the text-generation endpoint does. Unusable replies
    /// degrade the result instead.
    pub async fn evaluate(
        &self,
        submitted_text: &str,
        reference_answer: &str,
    ) -> Result<EvaluationResult, ScoreError> {
        let preview: String = submitted_text
            .chars()
            .take(self.config.log_preview_chars)
            .collect();
        info!("Scoring prompt with {}: {}...", self.generator.model_name(), preview);

        let user = rubrics::user_message(reference_answer, submitted_text);
        let raw = self
            .generator
            .complete(&self.config.system_prompt, &user)
            .await?;

        let parsed = parse::parse_response(parse::strip_code_fences(&raw));
        if parsed.is_unparsed() {
            warn!("Model response had no usable JSON, falling back to heuristic extraction");
        }

        let result = self.config.normalize(
            parsed.into_fields(self.config.feedback_max_chars),
            submitted_text,
        );
        info!("Calculated score: {}", result.total_score);

        self.store(submitted_text, reference_answer, &result).await;
        Ok(result)
    }

    async fn store(&self, submitted_text: &str, reference_answer: &str, result: &EvaluationResult) {
        let entry = AuditRecord {
            prompt: submitted_text.to_string(),
            model_answer: reference_answer.to_string(),
            score: result.total_score,
            goal_score: result.goal_score,
            context_score: result.context_score,
            source_score: result.source_score,
            expectation_score: result.expectation_score,
            feedback: result.feedback.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        match tokio::time::timeout(self.config.audit_timeout, self.audit.record(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to store feedback in {} audit sink: {}", self.audit.name(), e)
            }
            Err(_) => error!(
                "Gave up storing feedback in {} audit sink after {:?}",
                self.audit.name(),
                self.config.audit_timeout
            ),
        }
    }
}
