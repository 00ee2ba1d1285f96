//! InMemoryTaskStore - 開発・テスト用の正本
//!
//! # 実装詳細
//! - `RwLock<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>` でタスクごとにロックを分ける
//! - 同じタスクへの read-modify-write は entry の Mutex で直列化
//! - 別タスクはマップの read lock を共有するだけなので互いに待たない
//! - mutation は record のコピーに適用し、成功したときだけ書き戻す

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    AppFile, FileId, FileKind, Message, ModelMakerError, OwnerId, Result, TaskDetail, TaskId,
    TaskRecord,
};
use crate::ports::{TaskMutation, TaskStore};

/// Everything the store keeps for one task.
struct TaskEntry {
    record: TaskRecord,
    files: Vec<AppFile>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: TaskId) -> Result<Arc<Mutex<TaskEntry>>> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| ModelMakerError::not_found("task", id))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ModelMakerError::conflict(format!(
                "task {} already exists",
                task.id
            )));
        }
        let id = task.id;
        let entry = TaskEntry {
            record: task,
            files: Vec::new(),
            messages: Vec::new(),
        };
        tasks.insert(id, Arc::new(Mutex::new(entry)));
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<TaskRecord> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.record.clone())
    }

    async fn detail(&self, id: TaskId) -> Result<TaskDetail> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(TaskDetail {
            task: guard.record.clone(),
            files: guard.files.clone(),
            messages: guard.messages.clone(),
        })
    }

    async fn list(&self, owner: &OwnerId, archived: bool) -> Result<Vec<TaskRecord>> {
        // マップのロックはエントリを集めるまでに留める
        let entries: Vec<_> = {
            let tasks = self.tasks.read().await;
            tasks.values().cloned().collect()
        };

        let mut out = Vec::new();
        for entry in entries {
            let guard = entry.lock().await;
            if &guard.record.owner == owner && guard.record.archived == archived {
                out.push(guard.record.clone());
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn update(&self, id: TaskId, mutation: TaskMutation<'_>) -> Result<TaskRecord> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        let mut draft = guard.record.clone();
        mutation(&mut draft)?;
        guard.record = draft.clone();
        Ok(draft)
    }

    async fn add_file(&self, file: AppFile, mutation: TaskMutation<'_>) -> Result<TaskRecord> {
        let entry = self.entry(file.task_id).await?;
        let mut guard = entry.lock().await;
        let mut draft = guard.record.clone();
        mutation(&mut draft)?;
        guard.record = draft.clone();
        guard.files.push(file);
        Ok(draft)
    }

    async fn file(&self, task_id: TaskId, file_id: FileId) -> Result<AppFile> {
        let entry = self.entry(task_id).await?;
        let guard = entry.lock().await;
        guard
            .files
            .iter()
            .find(|f| f.id == file_id)
            .cloned()
            .ok_or_else(|| ModelMakerError::not_found("file", file_id))
    }

    async fn files(&self, task_id: TaskId, kind: FileKind) -> Result<Vec<AppFile>> {
        let entry = self.entry(task_id).await?;
        let guard = entry.lock().await;
        Ok(guard
            .files
            .iter()
            .filter(|f| f.kind == kind)
            .cloned()
            .collect())
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        let entry = self.entry(message.task_id).await?;
        let mut guard = entry.lock().await;
        guard.messages.push(message);
        Ok(())
    }

    async fn messages(&self, task_id: TaskId) -> Result<Vec<Message>> {
        let entry = self.entry(task_id).await?;
        let guard = entry.lock().await;
        Ok(guard.messages.clone())
    }
}
