//! WorkerPool - 固定数のワーカーでジョブを実行
//!
//! # フロー
//! 1. JobQueue::lease() でジョブを受け取る（空なら待つ）
//! 2. lease ごと Pipeline::run() に渡し、別タスクで spawn して待つ
//!    （lease の complete は Pipeline が終端遷移の直後に行う）
//! 3. panic は JoinError として受け取る。lease は drop で解放済みなので
//!    Pipeline::fail_after_fault() でタスクを Failed にするだけ

use std::any::Any;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::pipeline::{Pipeline, RunOutcome};
use crate::queue::JobQueue;

/// Worker pool handle.
/// - `request_shutdown()` で新しい lease の取得を止める
/// - 実行中のジョブは最後まで走らせる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    queue: Arc<dyn JobQueue>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn JobQueue>, pipeline: Arc<Pipeline>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let p = Arc::clone(&pipeline);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, p, &mut rx).await;
            });
            joins.push(join);
        }
        tracing::info!(workers = n, "worker pool started");

        Self {
            shutdown_tx,
            queue,
            joins,
        }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop taking jobs, close the queue and wait for every worker.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.queue.close().await;
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<Pipeline>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は待つので shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        // closed
        let Some(lease) = lease else {
            break;
        };

        let job = *lease.job();
        tracing::debug!(worker_id, task_id = %job.task_id, "job leased");

        let run = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run(lease).await }
        });

        match run.await {
            Ok(RunOutcome::Skipped) => {}
            Ok(outcome) => {
                tracing::debug!(worker_id, task_id = %job.task_id, ?outcome, "job finished");
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    format!("worker panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "worker task was cancelled".to_string()
                };
                tracing::error!(worker_id, task_id = %job.task_id, reason = %reason, "job aborted");
                pipeline.fail_after_fault(job.task_id, &reason).await;
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }
}
