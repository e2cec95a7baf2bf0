//! Persistence for agent state snapshots and task outcome history.

pub mod libsql_backend;
pub mod memory;
pub mod traits;

pub use libsql_backend::LibSqlStateStore;
pub use memory::InMemoryStateStore;
pub use traits::StateStore;
