//! Skill registry: task type -> skill.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::skills::skill::Skill;

/// Task type keys: alphanumeric start, then `_ . : -`, at most 128 chars.
static TASK_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$").expect("task type pattern is valid")
});

/// Summary of a registered skill for capability listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillDescriptor {
    pub task_type: String,
    pub name: String,
    pub description: String,
}

/// Registry of available skills.
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
}

impl SkillRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
        }
    }

    /// Check a task type key without registering anything.
    pub fn validate_task_type(task_type: &str) -> Result<(), RegistryError> {
        if TASK_TYPE_PATTERN.is_match(task_type) {
            Ok(())
        } else {
            Err(RegistryError::InvalidName {
                task_type: task_type.to_string(),
            })
        }
    }

    /// Register a skill for a task type. Each type can be registered once.
    pub async fn register(
        &self,
        task_type: impl Into<String>,
        skill: Arc<dyn Skill>,
    ) -> Result<(), RegistryError> {
        let task_type = task_type.into();
        Self::validate_task_type(&task_type)?;

        let mut skills = self.skills.write().await;
        if skills.contains_key(&task_type) {
            tracing::warn!(task_type = %task_type, "Rejected duplicate skill registration");
            return Err(RegistryError::Duplicate { task_type });
        }
        tracing::debug!(task_type = %task_type, skill = %skill.name(), "Registered skill");
        skills.insert(task_type, skill);
        Ok(())
    }

    /// Remove a skill.
    pub async fn unregister(&self, task_type: &str) -> Option<Arc<dyn Skill>> {
        self.skills.write().await.remove(task_type)
    }

    /// Look up the skill for a task type.
    pub async fn get(&self, task_type: &str) -> Result<Arc<dyn Skill>, RegistryError> {
        self.skills
            .read()
            .await
            .get(task_type)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                task_type: task_type.to_string(),
            })
    }

    /// Check if a skill exists.
    pub async fn has(&self, task_type: &str) -> bool {
        self.skills.read().await.contains_key(task_type)
    }

    /// All registered task types, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered skills.
    pub fn count(&self) -> usize {
        self.skills.try_read().map(|s| s.len()).unwrap_or(0)
    }

    /// Descriptors for every registered skill, sorted by task type.
    pub async fn descriptors(&self) -> Vec<SkillDescriptor> {
        let mut descriptors: Vec<SkillDescriptor> = self
            .skills
            .read()
            .await
            .iter()
            .map(|(task_type, skill)| SkillDescriptor {
                task_type: task_type.clone(),
                name: skill.name().to_string(),
                description: skill.description().to_string(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.task_type.cmp(&b.task_type));
        descriptors
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
