//! Built-in skills.

pub mod echo;

use std::sync::Arc;

pub use echo::EchoSkill;

use crate::error::RegistryError;
use crate::skills::SkillRegistry;

/// Register every built-in skill under its conventional task type.
pub async fn register_builtin_skills(registry: &SkillRegistry) -> Result<(), RegistryError> {
    registry.register("echo", Arc::new(EchoSkill)).await?;
    Ok(())
}
