//! TaskService - タスクのライフサイクル操作
//!
//! すべての操作は owner スコープ。他人のタスクは NotFound として扱う。
//! エラーは呼び出し元に同期的に返す（パイプラインの失敗は message log 側）。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    AnalysisPayload, AppFile, FileId, FileKind, FileUpload, Job, Message, ModelMakerError,
    NewTask, OwnerId, Result, Stage, TaskDetail, TaskId, TaskPatch, TaskRecord, TaskStatus,
};
use crate::ports::{
    Clock, IdGenerator, IdentityVerifier, ObjectStorage, StoredObject, TaskStore, VisionAnalyzer,
};
use crate::queue::{JobQueue, QueueCounts};

/// Collaborators of a `TaskService`.
#[derive(Clone)]
pub struct ServiceDeps {
    pub store: Arc<dyn TaskStore>,
    pub objects: Arc<dyn ObjectStorage>,
    pub queue: Arc<dyn JobQueue>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub max_upload_bytes: u64,
    /// Upper bound for an on-demand `analyze_task` call.
    pub vision_timeout: Duration,
}

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    objects: Arc<dyn ObjectStorage>,
    queue: Arc<dyn JobQueue>,
    vision: Arc<dyn VisionAnalyzer>,
    identity: Arc<dyn IdentityVerifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    limits: ServiceLimits,
}

impl TaskService {
    pub fn new(deps: ServiceDeps, limits: ServiceLimits) -> Self {
        let ServiceDeps {
            store,
            objects,
            queue,
            vision,
            identity,
            clock,
            ids,
        } = deps;
        Self {
            store,
            objects,
            queue,
            vision,
            identity,
            clock,
            ids,
            limits,
        }
    }

    pub async fn authenticate(&self, credential: &str) -> Result<OwnerId> {
        self.identity.verify(credential).await
    }

    pub async fn create_task(&self, owner: &OwnerId, input: NewTask) -> Result<TaskRecord> {
        let task = TaskRecord::new(self.ids.task_id(), owner.clone(), input, self.clock.now())?;
        self.store.insert(task.clone()).await?;
        tracing::info!(task_id = %task.id, owner = %owner, "task created");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        owner: &OwnerId,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<TaskRecord> {
        self.owned(owner, id).await?;
        let now = self.clock.now();
        self.store
            .update(id, &mut |task| task.apply_patch(patch.clone(), now))
            .await
    }

    pub async fn list_tasks(&self, owner: &OwnerId, archived: bool) -> Result<Vec<TaskRecord>> {
        self.store.list(owner, archived).await
    }

    /// Detail regardless of the archived flag.
    pub async fn get_task(&self, owner: &OwnerId, id: TaskId) -> Result<TaskDetail> {
        self.owned(owner, id).await?;
        self.store.detail(id).await
    }

    /// Store the bytes and attach them as the task's latest input.
    pub async fn upload_file(
        &self,
        owner: &OwnerId,
        id: TaskId,
        upload: FileUpload,
    ) -> Result<AppFile> {
        upload.validate(self.limits.max_upload_bytes)?;
        let task = self.owned(owner, id).await?;
        // 早めに弾く（最終判定は add_file 内の attach_input）
        if task.status.is_in_flight() {
            return Err(ModelMakerError::validation(format!(
                "cannot upload while task is {:?}",
                task.status
            )));
        }

        let file_id = self.ids.file_id();
        let key = format!("{id}/{file_id}-{}", upload.sanitized_name());
        let size = upload.bytes.len() as u64;
        self.objects
            .put(&key, upload.bytes, &upload.content_type)
            .await?;

        let now = self.clock.now();
        let file = AppFile {
            id: file_id,
            task_id: id,
            kind: FileKind::Input,
            storage_key: key,
            content_type: upload.content_type,
            size,
            created_at: now,
        };
        let attached = self
            .store
            .add_file(file.clone(), &mut |task| task.attach_input(file_id, now))
            .await;
        if let Err(error) = attached {
            // 参照されない blob を残さない
            if let Err(e) = self.objects.delete(&file.storage_key).await {
                tracing::warn!(task_id = %id, key = %file.storage_key, error = %e, "failed to delete orphaned upload");
            }
            return Err(error);
        }
        tracing::info!(task_id = %id, file_id = %file_id, size, "input uploaded");
        Ok(file)
    }

    /// Bytes of one uploaded input file. Output files are not served here.
    pub async fn get_input_file(
        &self,
        owner: &OwnerId,
        id: TaskId,
        file_id: FileId,
    ) -> Result<StoredObject> {
        self.owned(owner, id).await?;
        let file = self
            .store
            .files(id, FileKind::Input)
            .await?
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| ModelMakerError::not_found("input file", file_id))?;
        self.objects.get(&file.storage_key).await
    }

    /// Run vision analysis on the latest input without queueing a job.
    /// The task's status and message log are left as they are.
    pub async fn analyze_task(&self, owner: &OwnerId, id: TaskId) -> Result<AnalysisPayload> {
        let task = self.owned(owner, id).await?;
        let input_id = task
            .latest_input()
            .ok_or_else(|| ModelMakerError::validation("task has no input file"))?;
        let input = self.store.file(id, input_id).await?;

        let limit = self.limits.vision_timeout;
        match tokio::time::timeout(limit, self.vision.analyze(&input)).await {
            Ok(result) => result,
            Err(_) => Err(ModelMakerError::external(
                Stage::VisionAnalysis,
                format!("timed out after {limit:?}"),
            )),
        }
    }

    /// Queue the task and submit a job. If the dispatcher refuses the job the
    /// task goes back to its previous status.
    pub async fn start_process(&self, owner: &OwnerId, id: TaskId) -> Result<Job> {
        self.owned(owner, id).await?;
        let now = self.clock.now();
        let mut previous: Option<TaskStatus> = None;
        self.store
            .update(id, &mut |task| {
                previous = Some(task.enqueue(now)?);
                Ok(())
            })
            .await?;

        match self.queue.submit(id).await {
            Ok(job) => {
                tracing::info!(task_id = %id, "job submitted");
                Ok(job)
            }
            Err(error) => {
                if let Some(previous) = previous {
                    let now = self.clock.now();
                    let rollback = self
                        .store
                        .update(id, &mut |task| {
                            task.rollback_enqueue(previous, now);
                            Ok(())
                        })
                        .await;
                    if let Err(e) = rollback {
                        tracing::error!(task_id = %id, error = %e, "failed to roll back status");
                    }
                }
                tracing::warn!(task_id = %id, error = %error, "job rejected by dispatcher");
                Err(error)
            }
        }
    }

    pub async fn send_message(&self, owner: &OwnerId, id: TaskId, body: &str) -> Result<Message> {
        self.owned(owner, id).await?;
        let message = Message::user(self.ids.message_id(), id, body, self.clock.now())?;
        self.store.append_message(message.clone()).await?;
        Ok(message)
    }

    pub async fn archive_task(&self, owner: &OwnerId, id: TaskId) -> Result<TaskRecord> {
        self.set_archived(owner, id, true).await
    }

    pub async fn unarchive_task(&self, owner: &OwnerId, id: TaskId) -> Result<TaskRecord> {
        self.set_archived(owner, id, false).await
    }

    /// Output of the latest successful run, whatever the current status.
    pub async fn get_output_artifact(&self, owner: &OwnerId, id: TaskId) -> Result<StoredObject> {
        let task = self.owned(owner, id).await?;
        let output = task
            .output_file
            .ok_or_else(|| ModelMakerError::not_found("output artifact", id))?;
        let file = self.store.file(id, output).await?;
        self.objects.get(&file.storage_key).await
    }

    pub async fn queue_counts(&self) -> QueueCounts {
        self.queue.counts().await
    }

    async fn set_archived(&self, owner: &OwnerId, id: TaskId, archived: bool) -> Result<TaskRecord> {
        self.owned(owner, id).await?;
        let now = self.clock.now();
        let task = self
            .store
            .update(id, &mut |task| {
                task.set_archived(archived, now);
                Ok(())
            })
            .await?;
        tracing::debug!(task_id = %id, archived, "archived flag changed");
        Ok(task)
    }

    async fn owned(&self, owner: &OwnerId, id: TaskId) -> Result<TaskRecord> {
        let task = self.store.get(id).await?;
        if &task.owner != owner {
            return Err(ModelMakerError::not_found("task", id));
        }
        Ok(task)
    }
}
