//! Aggregate counters derived from an agent state snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{AgentState, AgentStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Completed + failed + in flight + awaiting retry + queued.
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub queued_tasks: usize,
    pub in_flight_tasks: usize,
    pub awaiting_retry: usize,
    /// completed / (completed + failed); 0.0 until something finishes.
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    pub tokens_used: u64,
    pub api_calls: u64,
    pub uptime_ms: u64,
}

impl AgentMetrics {
    /// Compute metrics from a snapshot and the current queue length.
    pub fn compute(state: &AgentState, queued: usize, now: DateTime<Utc>) -> Self {
        let completed = state.completed_tasks.len();
        let failed = state.failed_tasks.len();
        let in_flight = state.current_tasks.len();
        let finished = completed + failed;

        let success_rate = if finished == 0 {
            0.0
        } else {
            completed as f64 / finished as f64
        };

        let durations: Vec<f64> = state
            .completed_tasks
            .iter()
            .filter_map(|t| t.execution_time())
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        let average_execution_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let (tokens_used, api_calls) = state
            .completed_tasks
            .iter()
            .filter_map(|t| t.result.as_ref())
            .fold((0u64, 0u64), |(tokens, calls), out| {
                (
                    tokens + out.metadata.tokens_used.unwrap_or(0),
                    calls + out.metadata.api_calls.unwrap_or(0),
                )
            });

        let uptime_ms = match (state.status, state.started_at, state.stopped_at) {
            (AgentStatus::Running | AgentStatus::Paused | AgentStatus::Stopping, Some(start), _) => {
                millis_between(start, now)
            }
            (AgentStatus::Stopped, Some(start), Some(stop)) => millis_between(start, stop),
            _ => 0,
        };

        let awaiting_retry = state.awaiting_retry.len();
        Self {
            total_tasks: finished + in_flight + awaiting_retry + queued,
            completed_tasks: completed,
            failed_tasks: failed,
            queued_tasks: queued,
            in_flight_tasks: in_flight,
            awaiting_retry,
            success_rate,
            average_execution_time_ms,
            tokens_used,
            api_calls,
            uptime_ms,
        }
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}
