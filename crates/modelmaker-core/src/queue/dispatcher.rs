//! In-memory dispatcher implementation.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{JobLease, JobQueue, QueueCounts};
use crate::domain::{Job, ModelMakerError, Result, TaskId};
use crate::ports::Clock;

/// Dispatcher state.
///
/// `in_flight` は queued と processing の両方のタスクを含む。
/// submit 時に check-and-set し、lease の complete（または drop）で外す。
struct DispatcherState {
    ready: VecDeque<Job>,
    in_flight: HashSet<TaskId>,
    processing: usize,
    closed: bool,
}

impl DispatcherState {
    fn release(&mut self, task_id: TaskId) {
        if self.in_flight.remove(&task_id) {
            self.processing = self.processing.saturating_sub(1);
        }
    }
}

fn lock(state: &Mutex<DispatcherState>) -> MutexGuard<'_, DispatcherState> {
    // 臨界区間で panic する処理はないので、poison されても中身は整合している
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory FIFO dispatcher with a single-flight guarantee per task.
///
/// ロックは同期 Mutex で、保持したまま await しない。
pub struct InMemoryDispatcher {
    state: Arc<Mutex<DispatcherState>>,
    notify: Arc<Notify>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryDispatcher {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatcherState {
                ready: VecDeque::new(),
                in_flight: HashSet::new(),
                processing: 0,
                closed: false,
            })),
            notify: Arc::new(Notify::new()),
            capacity,
            clock,
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryDispatcher {
    async fn submit(&self, task_id: TaskId) -> Result<Job> {
        let job = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(ModelMakerError::capacity("dispatcher is not accepting jobs"));
            }
            if state.in_flight.contains(&task_id) {
                return Err(ModelMakerError::conflict(format!(
                    "task {task_id} already has a job queued or processing"
                )));
            }
            if state.ready.len() >= self.capacity {
                return Err(ModelMakerError::capacity(format!(
                    "queue is full ({} jobs); retry later",
                    self.capacity
                )));
            }
            let job = Job::new(task_id, self.clock.now());
            state.in_flight.insert(task_id);
            state.ready.push_back(job);
            job
        };

        // Notify outside the lock
        self.notify.notify_one();
        tracing::debug!(task_id = %task_id, "job submitted");
        Ok(job)
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            // 状態を見る前に登録しておく（close の notify_waiters を取りこぼさない）
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                if state.closed {
                    return None;
                }
                if let Some(job) = state.ready.pop_front() {
                    state.processing += 1;
                    return Some(Box::new(InMemoryLease {
                        job,
                        state: Arc::clone(&self.state),
                        released: false,
                    }));
                }
            }

            notified.await;
        }
    }

    async fn counts(&self) -> QueueCounts {
        let state = lock(&self.state);
        QueueCounts {
            queued: state.ready.len(),
            processing: state.processing,
            capacity: self.capacity,
        }
    }

    async fn close(&self) {
        lock(&self.state).closed = true;
        self.notify.notify_waiters();
    }
}

/// Lease implementation for InMemoryDispatcher.
struct InMemoryLease {
    job: Job,
    state: Arc<Mutex<DispatcherState>>,
    released: bool,
}

impl InMemoryLease {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            lock(&self.state).release(self.job.task_id);
        }
    }
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &Job {
        &self.job
    }

    async fn complete(self: Box<Self>) {
        let mut lease = self;
        lease.release();
    }
}

impl Drop for InMemoryLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(task_id = %self.job.task_id, "lease dropped without complete");
            self.release();
        }
    }
}
