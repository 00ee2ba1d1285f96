//! Events - 終端遷移の通知
//!
//! ジョブが Completed / Failed に到達したときに一度だけ作られる。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OwnerId, TaskId};
use super::task::{TaskRecord, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNotification {
    pub task_id: TaskId,
    pub owner: OwnerId,
    pub status: TaskStatus,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl TaskNotification {
    pub fn for_task(task: &TaskRecord, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        let title = match task.status {
            TaskStatus::Completed => format!("\"{}\" is ready", task.title),
            TaskStatus::Failed => format!("\"{}\" failed", task.title),
            other => format!("\"{}\" is {:?}", task.title, other),
        };
        Self {
            task_id: task.id,
            owner: task.owner.clone(),
            status: task.status,
            title,
            body: body.into(),
            timestamp: now,
        }
    }
}
