//! A scripted writer for multi-owner tests.
//!
//! [`run_worker`] writes a known set of keys through a [`GuardedBox`]. The
//! `boxguard-worker` binary runs it in its own process and prints the
//! [`WorkerReport`] as JSON; tests can also run several workers in one
//! process.

use boxguard::{AccessorConfig, GuardResult, GuardedBox, SleepFuture, Sleeper, TokioSleeper};
use boxguard_engine::BoxEngine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// What a worker writes and how it reaches the box.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    /// Root directory of the boxes.
    pub root: PathBuf,
    /// Box name.
    pub name: String,
    /// Prefix of every key this worker writes.
    pub prefix: String,
    /// Number of keys to write.
    pub count: usize,
    /// Share the box with other processes.
    pub multi_owner: bool,
    /// Open attempt cap, unbounded if `None`.
    pub max_tries: Option<u32>,
    /// Delay between open attempts.
    pub retry_delay: Duration,
}

impl WorkerPlan {
    /// Creates a multi-owner plan writing `count` keys under `prefix`.
    pub fn new(root: impl Into<PathBuf>, name: &str, prefix: &str, count: usize) -> Self {
        Self {
            root: root.into(),
            name: name.to_string(),
            prefix: prefix.to_string(),
            count,
            multi_owner: true,
            max_tries: None,
            retry_delay: Duration::from_millis(5),
        }
    }

    fn accessor_config(&self) -> AccessorConfig {
        let config = AccessorConfig::new(&self.name)
            .multi_owner(self.multi_owner)
            .retry_delay(self.retry_delay);
        match self.max_tries {
            Some(tries) => config.max_tries(tries),
            None => config,
        }
    }
}

/// Summary of a finished worker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Box name.
    pub name: String,
    /// Key prefix.
    pub prefix: String,
    /// Keys written.
    pub written: usize,
    /// Times the worker slept because the box was locked.
    pub waits: u64,
    /// Wall time of the run.
    pub elapsed_ms: u64,
}

/// Key written by a worker for index `i`.
pub fn worker_key(prefix: &str, i: usize) -> String {
    format!("{prefix}-{i:05}")
}

/// Value written by a worker for index `i`.
pub fn worker_value(prefix: &str, i: usize) -> String {
    format!("{prefix}:{i}")
}

/// Sleeps on the tokio timer and counts how often it was asked to.
#[derive(Debug, Default)]
pub struct CountingSleeper {
    inner: TokioSleeper,
    waits: AtomicU64,
}

impl CountingSleeper {
    /// Returns the number of sleeps so far.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        self.waits.fetch_add(1, Ordering::Relaxed);
        self.inner.sleep(duration)
    }
}

/// Writes every key of `plan`, one put per key, then reads them back.
///
/// # Errors
///
/// Returns the first accessor error, including
/// [`boxguard::GuardError::OpenExhausted`] when the retry cap is hit.
pub async fn run_worker(plan: &WorkerPlan) -> GuardResult<WorkerReport> {
    let sleeper = Arc::new(CountingSleeper::default());
    let accessor: GuardedBox<String> = GuardedBox::with_opener(
        Arc::new(BoxEngine::new(&plan.root)),
        sleeper.clone(),
        plan.accessor_config(),
    );

    let start = Instant::now();
    for i in 0..plan.count {
        accessor
            .put(worker_key(&plan.prefix, i), &worker_value(&plan.prefix, i))
            .await?;
        // let the other owners in
        tokio::task::yield_now().await;
    }

    let mut missing = 0;
    for i in 0..plan.count {
        let expected = worker_value(&plan.prefix, i);
        if accessor.get(&worker_key(&plan.prefix, i)).await?.as_ref() != Some(&expected) {
            missing += 1;
        }
    }
    accessor.close().await?;

    let report = WorkerReport {
        name: plan.name.clone(),
        prefix: plan.prefix.clone(),
        written: plan.count - missing,
        waits: sleeper.waits(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        box_name = %report.name,
        prefix = %report.prefix,
        written = report.written,
        waits = report.waits,
        "worker finished"
    );
    Ok(report)
}
