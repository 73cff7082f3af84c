//! Bounded concurrent fetching with retry
//!
//! Runs one fetch per task with at most `max_concurrent` tasks in flight. Each
//! task gets `max_attempts` tries with a fixed pause between them; a task that
//! runs out of attempts becomes a permanent failure without disturbing the
//! rest of the batch.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::SheetsError;
use crate::fetcher::FetchTask;
use crate::models::Config;

/// Concurrency and retry settings for a batch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.concurrency_limit,
            max_attempts: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }
}

/// Terminal state of one task
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub task: FetchTask,
    pub attempts: u32,
    pub result: Result<T, SheetsError>,
}

impl<T> TaskOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Counters over a finished batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_attempts: u32,
}

impl BatchStats {
    pub fn from_outcomes<T>(outcomes: &[TaskOutcome<T>]) -> Self {
        outcomes.iter().fold(
            BatchStats {
                total_tasks: outcomes.len(),
                ..Default::default()
            },
            |mut stats, outcome| {
                if outcome.succeeded() {
                    stats.succeeded += 1;
                } else {
                    stats.failed += 1;
                }
                stats.total_attempts += outcome.attempts;
                stats
            },
        )
    }
}

/// Run every task through `fetch`, bounded and retried per `policy`.
///
/// Outcomes come back in completion order.
pub async fn run_bounded<T, F, Fut>(
    tasks: Vec<FetchTask>,
    policy: &RetryPolicy,
    fetch: F,
) -> Vec<TaskOutcome<T>>
where
    F: Fn(FetchTask) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let total = tasks.len();
    let max_concurrent = policy.max_concurrent.max(1);
    info!(
        "🚀 Fetching {} task(s) with up to {} in flight, {} attempt(s) each",
        total, max_concurrent, policy.max_attempts
    );

    let fetch = &fetch;
    let outcomes: Vec<TaskOutcome<T>> = stream::iter(tasks)
        .map(|task| fetch_with_retry(task, policy, fetch))
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    let stats = BatchStats::from_outcomes(&outcomes);
    info!(
        "📊 Batch finished: {} succeeded, {} failed, {} attempt(s) total",
        stats.succeeded, stats.failed, stats.total_attempts
    );
    outcomes
}

/// Fetch a single task, retrying with a fixed delay
async fn fetch_with_retry<T, F, Fut>(task: FetchTask, policy: &RetryPolicy, fetch: &F) -> TaskOutcome<T>
where
    F: Fn(FetchTask) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    let mut last_error = None;

    while attempts < max_attempts {
        attempts += 1;
        debug!("{} attempt {}/{}", task, attempts, max_attempts);

        match fetch(task.clone()).await {
            Ok(value) => {
                return TaskOutcome {
                    task,
                    attempts,
                    result: Ok(value),
                };
            }
            Err(e) => {
                warn!("⚠️ {} failed (try {}/{}): {:#}", task, attempts, max_attempts, e);
                last_error = Some(e);

                if attempts < max_attempts {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
        }
    }

    let message = last_error
        .map(|e| format!("{:#}", e))
        .unwrap_or_else(|| "unknown error".to_string());
    TaskOutcome {
        result: Err(SheetsError::Fetch {
            ticker: task.ticker.to_string(),
            attempts,
            message,
        }),
        task,
        attempts,
    }
}
