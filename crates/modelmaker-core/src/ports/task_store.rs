//! TaskStore port - task / file / message の正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - タスクの状態（TaskStatus, archived）
//! - 添付ファイル（AppFile）
//! - メッセージログ（append-only）
//!
//! # 設計原則
//! - Dispatcher / Worker は task_id しか持たない。状態は毎回ここから読み直す
//! - read-modify-write はタスク単位でアトミック（同じタスクへの更新は直列化）
//! - 異なるタスク同士の更新は直列化しない

use async_trait::async_trait;

use crate::domain::{
    AppFile, FileId, FileKind, Message, OwnerId, Result, TaskDetail, TaskId, TaskRecord,
};

/// Mutation applied to a task record under the store's per-task lock.
///
/// If the closure returns `Err`, the store keeps the record unchanged.
pub type TaskMutation<'a> = &'a mut (dyn FnMut(&mut TaskRecord) -> Result<()> + Send);

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: TaskRecord) -> Result<()>;

    async fn get(&self, id: TaskId) -> Result<TaskRecord>;

    /// Record + files + ordered messages.
    async fn detail(&self, id: TaskId) -> Result<TaskDetail>;

    /// Tasks of `owner` whose archived flag equals `archived`, newest first.
    async fn list(&self, owner: &OwnerId, archived: bool) -> Result<Vec<TaskRecord>>;

    /// Atomic read-modify-write of one task record. Returns the new record.
    async fn update(&self, id: TaskId, mutation: TaskMutation<'_>) -> Result<TaskRecord>;

    /// Store `file` and apply `mutation` to its task in the same critical
    /// section. Neither happens if the mutation fails.
    async fn add_file(&self, file: AppFile, mutation: TaskMutation<'_>) -> Result<TaskRecord>;

    async fn file(&self, task_id: TaskId, file_id: FileId) -> Result<AppFile>;

    /// Files of one kind in attachment order.
    async fn files(&self, task_id: TaskId, kind: FileKind) -> Result<Vec<AppFile>>;

    async fn append_message(&self, message: Message) -> Result<()>;

    /// Full ordered message log of a task.
    async fn messages(&self, task_id: TaskId) -> Result<Vec<Message>>;
}
