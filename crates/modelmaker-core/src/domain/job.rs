//! Job: one in-flight execution attempt of a task's pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::TaskId;

/// Transient; never persisted. The dispatcher and workers only ever carry
/// the task identifier and re-read everything else from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Job {
    pub task_id: TaskId,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(task_id: TaskId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            submitted_at,
        }
    }
}
