use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SortConfig {
    /// Concurrent rank tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Task-queue capacity; a full queue fails the sort (never blocks the
    /// query path).
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Per-task deadline for the injected ranking function.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    100
}

fn default_task_timeout_ms() -> u64 {
    10_000
}
