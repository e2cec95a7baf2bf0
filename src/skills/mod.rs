//! Skills: pluggable capabilities the runner dispatches tasks to.

pub mod builtin;
pub mod registry;
pub mod skill;

pub use registry::{SkillDescriptor, SkillRegistry};
pub use skill::{FnSkill, Skill, SkillError, SkillOutput, SkillUsage};
