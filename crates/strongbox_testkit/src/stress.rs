//! Stress helpers for Strongbox.
//!
//! These drive a client from many tasks at once to check that per-model
//! serialization keeps the collection consistent.

use crate::fixtures::user;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strongbox_core::query::{CreateArgs, DeleteArgs, Filter, FindManyArgs, UpdateManyArgs};
use strongbox_core::{record, Client};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations (validation failures included).
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[must_use]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per task.
    pub operations: usize,
    /// Number of concurrent tasks.
    pub tasks: usize,
    /// Number of distinct emails; smaller values mean more unique conflicts.
    pub distinct_emails: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 50,
            tasks: 4,
            distinct_emails: 40,
        }
    }
}

/// Races `create` calls on `User` with overlapping emails.
///
/// Exactly one create per distinct email can succeed.
pub async fn stress_concurrent_creates(
    client: Arc<Client>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut handles = Vec::with_capacity(config.tasks);

    for task in 0..config.tasks {
        let client = Arc::clone(&client);
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let (mut ok, mut failed) = (0usize, 0usize);
            for i in 0..config.operations {
                let email = format!("u{}@x.com", (task * 7 + i) % config.distinct_emails);
                match client.create("User", CreateArgs::new(user(&email, i as i64))).await {
                    Ok(_) => ok += 1,
                    Err(_) => failed += 1,
                }
            }
            (ok, failed)
        }));
    }

    collect(handles, start).await
}

/// Interleaves creates, bulk updates, deletes and reads on `User`.
pub async fn stress_mixed_operations(
    client: Arc<Client>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut handles = Vec::with_capacity(config.tasks);

    for task in 0..config.tasks {
        let client = Arc::clone(&client);
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let (mut ok, mut failed) = (0usize, 0usize);
            for i in 0..config.operations {
                let email = format!("u{}@x.com", (task + i) % config.distinct_emails);
                let result = match i % 4 {
                    0 => client
                        .create("User", CreateArgs::new(user(&email, i as i64)))
                        .await
                        .map(|_| ()),
                    1 => client
                        .update_many(
                            "User",
                            UpdateManyArgs::new(
                                Filter::equals("email", email.as_str()),
                                record(serde_json::json!({"age": {"increment": 1}})),
                            ),
                        )
                        .await
                        .map(|_| ()),
                    2 => client
                        .find_many("User", FindManyArgs::new())
                        .await
                        .map(|_| ()),
                    _ => client
                        .delete("User", DeleteArgs::new(Filter::equals("email", email.as_str())))
                        .await
                        .map(|_| ()),
                };
                match result {
                    Ok(()) => ok += 1,
                    Err(_) => failed += 1,
                }
            }
            (ok, failed)
        }));
    }

    collect(handles, start).await
}

async fn collect(
    handles: Vec<tokio::task::JoinHandle<(usize, usize)>>,
    start: Instant,
) -> StressTestResult {
    let (mut ok, mut failed) = (0, 0);
    for handle in handles {
        let (o, f) = handle.await.expect("stress task panicked");
        ok += o;
        failed += f;
    }
    StressTestResult::new(ok, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestClient;
    use std::collections::HashSet;
    use strongbox_core::query::CountArgs;

    fn shared() -> (TestClient, Arc<Client>) {
        let tc = TestClient::memory();
        let client = Arc::new(tc.reopen());
        (tc, client)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_respect_uniqueness() {
        let (_tc, client) = shared();
        let config = StressConfig {
            operations: 20,
            tasks: 4,
            distinct_emails: 10,
        };

        let result = stress_concurrent_creates(Arc::clone(&client), &config).await;
        assert_eq!(result.total_ops, 80);
        assert_eq!(result.successful_ops, 10);

        let users = client.find_many("User", FindManyArgs::new()).await.unwrap();
        let emails: HashSet<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
        assert_eq!(emails.len(), users.len());
        assert_eq!(users.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mixed_operations_keep_collection_consistent() {
        let (tc, client) = shared();
        let config = StressConfig {
            operations: 40,
            tasks: 4,
            distinct_emails: 8,
        };

        let result = stress_mixed_operations(Arc::clone(&client), &config).await;
        assert_eq!(result.total_ops, 160);

        let users = client.find_many("User", FindManyArgs::new()).await.unwrap();
        let emails: HashSet<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
        assert_eq!(emails.len(), users.len());

        // What is on disk matches what the cache serves
        let fresh = tc.reopen();
        let count = fresh.count("User", CountArgs::default()).await.unwrap();
        assert_eq!(count, users.len());
    }
}
