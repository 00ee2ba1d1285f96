//! Queue module: the job dispatcher.
//!
//! Dispatcher は task_id と投入順だけを持つ（業務データは TaskStore にある）。

mod dispatcher;

pub use dispatcher::InMemoryDispatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, Result, TaskId};

/// A leased job. The pipeline run owns this lease and `complete`s it as soon
/// as the task's terminal state is committed, before any follow-up
/// notification.
///
/// Design intent:
/// - Dispatcher manages the in-flight marker (submit -> lease -> complete).
/// - A lease dropped without `complete` (panicking run) still releases it.
#[async_trait]
pub trait JobLease: Send {
    fn job(&self) -> &Job;

    /// Clear the task's in-flight marker.
    async fn complete(self: Box<Self>);
}

/// Dispatcher port (interface).
///
/// Guarantees:
/// - at most one outstanding job per task id (second submit => Conflict)
/// - FIFO across tasks
/// - bounded depth (full => Capacity, never blocks)
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, task_id: TaskId) -> Result<Job>;

    /// Wait for the next job. `None` once the queue is closed.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts(&self) -> QueueCounts;

    /// Stop handing out jobs and wake every waiting worker.
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Submitted, not yet leased.
    pub queued: usize,
    /// Leased, not yet completed.
    pub processing: usize,
    pub capacity: usize,
}
