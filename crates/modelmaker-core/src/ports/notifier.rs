//! Notifier port - 終端遷移の通知（fire-and-forget）
//!
//! 配送の失敗はログに残すだけで、タスクの結果には影響させない。

use async_trait::async_trait;

use crate::domain::{Result, TaskNotification};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &TaskNotification) -> Result<()>;
}
