use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use agent_runner::agent::AgentRunner;
use agent_runner::config::AppConfig;
use agent_runner::db::LibSqlDb;
use agent_runner::queue::{LibSqlTaskQueue, TaskQueue};
use agent_runner::skills::SkillRegistry;
use agent_runner::skills::builtin::register_builtin_skills;
use agent_runner::store::{LibSqlStateStore, StateStore};
use agent_runner::task::TaskSpec;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing. The guard flushes buffered lines on exit.
    let (writer, _log_guard) = match &config.log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            dir,
            "agent-runner.log",
        )),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(writer)
        .init();

    eprintln!("Agent Runner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent: {} ({})", config.agent.name, config.agent.id);
    eprintln!(
        "   Workers: {}  Retries: {}  Timeout: {}ms",
        config.agent.max_concurrent_tasks, config.agent.retry_attempts, config.agent.timeout_ms
    );

    let registry = Arc::new(SkillRegistry::new());
    register_builtin_skills(&registry).await?;

    // ── Backends ────────────────────────────────────────────────────────
    let runner = match &config.db_path {
        Some(path) => {
            let db = LibSqlDb::open_local(path)
                .await
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            eprintln!("   Database: {}", path.display());
            let queue: Arc<dyn TaskQueue> =
                Arc::new(LibSqlTaskQueue::new(db.clone(), config.agent.id.clone()));
            let store: Arc<dyn StateStore> = Arc::new(LibSqlStateStore::new(db));
            AgentRunner::restore(config.agent.clone(), registry, queue, store).await?
        }
        None => AgentRunner::in_memory(config.agent.clone(), registry)?,
    };

    // ── Input: one TaskSpec JSON object per line ────────────────────────
    runner.start().await?;

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut submitted = 0usize;
    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskSpec>(line) {
            Ok(spec) => {
                runner.add_task(spec).await?;
                submitted += 1;
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed task line"),
        }
    }
    tracing::info!(submitted, "Input closed, waiting for tasks to finish");

    if tokio::time::timeout(config.idle_timeout, runner.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.idle_timeout.as_secs(),
            "Timed out waiting for the queue to drain"
        );
    }
    runner.stop().await?;

    let metrics = runner.get_metrics().await;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
