//! Rubric scoring for free-text prompts.
//!
//! A [`RubricScorer`] asks a text-generation model to grade a prompt on Goal,
//! Context, Source and Expectation (1–5 each, 0–20 overall) and turns whatever
//! comes back into an in-range [`EvaluationResult`]. Only upstream transport
//! and quota failures are reported as errors.

pub mod audit;
pub mod config;
pub mod error;
pub mod grading;
pub mod llm;
pub mod network;

pub use audit::{AuditRecord, AuditSink, JsonlAuditSink, NoopAuditSink, RestTableSink};
pub use config::ServiceConfig;
pub use error::{AuditError, ConfigError, ScoreError};
pub use grading::{
    EvaluationRequest, EvaluationResult, RubricScorer, ScorerConfig, TotalPolicy,
};
pub use llm::{ChatCompletionsClient, TextGenerator};
