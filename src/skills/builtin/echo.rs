//! Echo skill: returns its payload unchanged.

use async_trait::async_trait;

use crate::skills::skill::{Skill, SkillError, SkillOutput};

#[derive(Debug, Default)]
pub struct EchoSkill;

#[async_trait]
impl Skill for EchoSkill {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the task payload as its result. Useful for smoke-testing an agent."
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<SkillOutput, SkillError> {
        Ok(SkillOutput::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillRegistry;
    use crate::skills::builtin::register_builtin_skills;

    #[tokio::test]
    async fn echoes_payload() {
        let out = EchoSkill.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out.data["x"], 1);
        assert!(out.metadata.tokens_used.is_none());
    }

    #[tokio::test]
    async fn builtins_register_once() {
        let registry = SkillRegistry::new();
        register_builtin_skills(&registry).await.unwrap();
        assert!(registry.has("echo").await);
        assert!(register_builtin_skills(&registry).await.is_err());
    }
}
