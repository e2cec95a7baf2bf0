//! The `Skill` contract: an opaque async capability that executes one task type.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error returned by a skill implementation.
///
/// The runner never inspects the variant; every failure is treated as a
/// retryable attempt failure and recorded as its display string.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Usage accounting reported by a skill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillUsage {
    #[serde(default, alias = "tokensUsed", skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, alias = "apiCalls", skip_serializing_if = "Option::is_none")]
    pub api_calls: Option<u64>,
    /// Anything else the skill wants to surface.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result shape of a successful skill execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: SkillUsage,
}

impl SkillOutput {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            metadata: SkillUsage::default(),
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.metadata.tokens_used = Some(tokens);
        self
    }

    pub fn with_api_calls(mut self, calls: u64) -> Self {
        self.metadata.api_calls = Some(calls);
        self
    }
}

/// A registered capability that executes tasks of one type.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Skill name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Execute against a task payload.
    async fn execute(&self, payload: serde_json::Value) -> Result<SkillOutput, SkillError>;
}

/// Skill backed by an async closure.
pub struct FnSkill<F> {
    name: String,
    description: String,
    handler: F,
}

impl<F> FnSkill<F> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Skill for FnSkill<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SkillOutput, SkillError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<SkillOutput, SkillError> {
        (self.handler)(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accepts_camel_case_keys() {
        let output: SkillOutput = serde_json::from_str(
            r#"{"data": {"posted": true}, "metadata": {"tokensUsed": 120, "apiCalls": 2, "model": "x"}}"#,
        )
        .unwrap();
        assert_eq!(output.metadata.tokens_used, Some(120));
        assert_eq!(output.metadata.api_calls, Some(2));
        assert_eq!(output.metadata.extra["model"], "x");
    }

    #[test]
    fn usage_defaults_when_missing() {
        let output: SkillOutput = serde_json::from_str(r#"{"data": 1}"#).unwrap();
        assert_eq!(output.metadata, SkillUsage::default());
    }

    #[tokio::test]
    async fn fn_skill_runs_closure() {
        let skill = FnSkill::new("double", "Doubles a number", |payload: serde_json::Value| async move {
            let n = payload
                .as_i64()
                .ok_or_else(|| SkillError::InvalidPayload("expected a number".into()))?;
            Ok::<_, SkillError>(SkillOutput::new(serde_json::json!(n * 2)).with_api_calls(1))
        });

        assert_eq!(skill.name(), "double");
        let out = skill.execute(serde_json::json!(21)).await.unwrap();
        assert_eq!(out.data, 42);
        assert_eq!(out.metadata.api_calls, Some(1));

        let err = skill.execute(serde_json::json!("nope")).await.unwrap_err();
        assert!(err.to_string().contains("expected a number"));
    }
}
