//! Agent Runner: a bounded async worker pool that executes typed tasks
//! through registered skills.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod queue;
pub mod skills;
pub mod store;
pub mod task;
