//! Agent module: lifecycle, dispatch, retry policy and reporting.

pub mod events;
pub mod metrics;
pub mod retry;
pub mod runner;
pub mod state;

pub use events::RunnerEvent;
pub use metrics::AgentMetrics;
pub use retry::RetryBackoff;
pub use runner::AgentRunner;
pub use state::{AgentState, AgentStatus};
