//! Pipeline - 1 ジョブ分の実行（Vision -> Generation -> Storage）
//!
//! # フロー
//! 1. TaskStore で Queued -> Processing（Queued でなければジョブを捨てる）
//! 2. 最新の入力ファイルを読み、3 ステージを順番に 1 回ずつ実行（リトライなし）
//! 3. 成功: 出力 AppFile の登録と Completed 遷移を 1 回の store 呼び出しで行う
//! 4. 失敗: Failed に遷移し、どのステージが何の種類のエラーで落ちたかを記録
//!
//! 終端遷移が store に書かれた直後に lease を complete する（通知の完了は待たない）。
//! そのあと message を 1 件追記し、通知を 1 回だけ出す。
//! ステージ呼び出し中は store のロックを持たない。

use std::future::Future;
use std::sync::Arc;

use crate::config::StageTimeouts;
use crate::domain::{
    AppFile, ErrorKind, FileId, FileKind, Message, MessageKind, ModelMakerError, Result,
    Stage, TaskId, TaskNotification, TaskRecord,
};
use crate::ports::{
    ArtifactStorage, Clock, IdGenerator, ModelGenerator, Notifier, TaskStore, VisionAnalyzer,
};
use crate::queue::JobLease;

/// The three stage executors of a run.
#[derive(Clone)]
pub struct StageSet {
    pub vision: Arc<dyn VisionAnalyzer>,
    pub generator: Arc<dyn ModelGenerator>,
    pub artifacts: Arc<dyn ArtifactStorage>,
}

/// Result of one `Pipeline::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { output: FileId },
    Failed { stage: Stage, kind: ErrorKind },
    /// The task was not `Queued` when the job was picked up.
    Skipped,
}

struct StageFailure {
    stage: Stage,
    error: ModelMakerError,
}

pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    stages: StageSet,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    timeouts: StageTimeouts,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        stages: StageSet,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            store,
            stages,
            notifier,
            clock,
            ids,
            timeouts,
        }
    }

    /// Run the leased job. The lease is completed as soon as the task
    /// reaches a terminal state in the store (or right away when skipped).
    #[tracing::instrument(skip_all, fields(task_id = %lease.job().task_id))]
    pub async fn run(&self, lease: Box<dyn JobLease>) -> RunOutcome {
        let task_id = lease.job().task_id;
        let now = self.clock.now();
        let task = match self
            .store
            .update(task_id, &mut |task| task.begin_processing(now))
            .await
        {
            Ok(task) => task,
            Err(error) => {
                tracing::warn!(error = %error, "job skipped: task is not queued");
                lease.complete().await;
                return RunOutcome::Skipped;
            }
        };
        self.progress(task_id, "processing started").await;

        match self.execute(&task).await {
            Ok(output) => self.finish_completed(task_id, output, lease).await,
            Err(failure) => self.finish_failed(task_id, failure, lease).await,
        }
    }

    /// Mark a task `Failed` after its run aborted without reaching a
    /// terminal state (worker panic). No-op when the task already finished.
    pub async fn fail_after_fault(&self, task_id: TaskId, reason: &str) {
        let now = self.clock.now();
        let task = match self.store.update(task_id, &mut |task| task.fail(now)).await {
            Ok(task) => task,
            Err(error) => {
                tracing::debug!(task_id = %task_id, error = %error, "fault after terminal state; nothing to do");
                return;
            }
        };
        let error = ModelMakerError::internal(reason);
        let body = format!("processing aborted [{}]: {error}", error.kind());
        self.system_message(task_id, MessageKind::Failed, &body).await;
        self.notify(&task, body).await;
    }

    async fn execute(&self, task: &TaskRecord) -> std::result::Result<AppFile, StageFailure> {
        let input = self.latest_input(task).await.map_err(|error| StageFailure {
            stage: Stage::VisionAnalysis,
            error,
        })?;

        let analysis = self
            .timed(Stage::VisionAnalysis, self.stages.vision.analyze(&input))
            .await?;
        let summary = analysis
            .primary_label()
            .map(|label| format!("vision analysis finished: {} ({:.2})", label.name, label.confidence))
            .unwrap_or_else(|| "vision analysis finished: no labels".to_string());
        self.progress(task.id, &summary).await;

        let model = self
            .timed(
                Stage::ModelGeneration,
                self.stages.generator.generate(&analysis, &input),
            )
            .await?;
        self.progress(
            task.id,
            &format!("model generation finished: {} bytes", model.size()),
        )
        .await;

        let key = self
            .timed(Stage::ArtifactStorage, self.stages.artifacts.store(task.id, &model))
            .await?;
        self.progress(task.id, &format!("artifact stored at {key}")).await;

        Ok(AppFile {
            id: self.ids.file_id(),
            task_id: task.id,
            kind: FileKind::Output,
            storage_key: key,
            content_type: model.content_type.clone(),
            size: model.size(),
            created_at: self.clock.now(),
        })
    }

    async fn latest_input(&self, task: &TaskRecord) -> Result<AppFile> {
        let file_id = task
            .latest_input()
            .ok_or_else(|| ModelMakerError::validation("task has no input file"))?;
        self.store.file(task.id, file_id).await
    }

    async fn timed<T, F>(&self, stage: Stage, call: F) -> std::result::Result<T, StageFailure>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.timeouts.for_stage(stage);
        tracing::debug!(stage = %stage, "stage started");
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(StageFailure { stage, error }),
            Err(_) => Err(StageFailure {
                stage,
                error: ModelMakerError::external(stage, format!("timed out after {limit:?}")),
            }),
        }
    }

    async fn finish_completed(
        &self,
        task_id: TaskId,
        output: AppFile,
        lease: Box<dyn JobLease>,
    ) -> RunOutcome {
        let now = self.clock.now();
        let output_id = output.id;
        let key = output.storage_key.clone();
        let task = match self
            .store
            .add_file(output, &mut |task| task.complete(output_id, now))
            .await
        {
            Ok(task) => task,
            Err(error) => {
                tracing::error!(error = %error, "failed to record output");
                return self
                    .finish_failed(
                        task_id,
                        StageFailure {
                            stage: Stage::ArtifactStorage,
                            error,
                        },
                        lease,
                    )
                    .await;
            }
        };
        lease.complete().await;

        tracing::info!(output = %output_id, key = %key, "task completed");
        let body = format!("3D model is ready ({key})");
        self.system_message(task_id, MessageKind::Completed, &body).await;
        self.notify(&task, body).await;
        RunOutcome::Completed { output: output_id }
    }

    async fn finish_failed(
        &self,
        task_id: TaskId,
        failure: StageFailure,
        lease: Box<dyn JobLease>,
    ) -> RunOutcome {
        let StageFailure { stage, error } = failure;
        let kind = error.kind();
        tracing::warn!(stage = %stage, error = %error, "task failed");

        let now = self.clock.now();
        let updated = self.store.update(task_id, &mut |task| task.fail(now)).await;
        lease.complete().await;
        let task = match updated {
            Ok(task) => task,
            Err(store_error) => {
                tracing::error!(error = %store_error, "failed to mark task as failed");
                return RunOutcome::Failed { stage, kind };
            }
        };

        // ExternalService の Display はステージ名を含むので中身だけ使う
        let detail = match &error {
            ModelMakerError::ExternalService { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let body = format!("{} failed [{kind}]: {detail}", stage.label());
        self.system_message(task_id, MessageKind::Failed, &body).await;
        self.notify(&task, body).await;
        RunOutcome::Failed { stage, kind }
    }

    async fn progress(&self, task_id: TaskId, body: &str) {
        self.system_message(task_id, MessageKind::Progress, body).await;
    }

    async fn system_message(&self, task_id: TaskId, kind: MessageKind, body: &str) {
        let message = Message::system(self.ids.message_id(), task_id, kind, body, self.clock.now());
        if let Err(error) = self.store.append_message(message).await {
            tracing::warn!(task_id = %task_id, error = %error, "failed to append message");
        }
    }

    async fn notify(&self, task: &TaskRecord, body: String) {
        let notification = TaskNotification::for_task(task, body, self.clock.now());
        if let Err(error) = self.notifier.notify(&notification).await {
            tracing::warn!(task_id = %task.id, error = %error, "notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisPayload, GeneratedModel, Label, NewTask, OwnerId, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::queue::{InMemoryDispatcher, JobQueue};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use ulid::Ulid;

    struct Vision(Option<ModelMakerError>);

    #[async_trait]
    impl VisionAnalyzer for Vision {
        async fn analyze(&self, _input: &AppFile) -> Result<AnalysisPayload> {
            match &self.0 {
                Some(error) => Err(error.clone()),
                None => Ok(AnalysisPayload {
                    labels: vec![Label {
                        name: "chair".into(),
                        confidence: 0.9,
                    }],
                    geometry_hints: serde_json::Value::Null,
                }),
            }
        }
    }

    struct SlowGenerator(Duration);

    #[async_trait]
    impl ModelGenerator for SlowGenerator {
        async fn generate(&self, _a: &AnalysisPayload, _i: &AppFile) -> Result<GeneratedModel> {
            tokio::time::sleep(self.0).await;
            Ok(GeneratedModel::new(b"glb".to_vec(), "model/gltf-binary", "glb"))
        }
    }

    struct Keys;

    #[async_trait]
    impl ArtifactStorage for Keys {
        async fn store(&self, task_id: TaskId, _model: &GeneratedModel) -> Result<String> {
            Ok(format!("{task_id}/models/out.glb"))
        }
    }

    /// 通知と、その時点で processing 中だったジョブ数を記録する
    struct Recorder {
        queue: Arc<InMemoryDispatcher>,
        sent: Mutex<Vec<(TaskNotification, usize)>>,
    }

    impl Recorder {
        fn len(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, notification: &TaskNotification) -> Result<()> {
            let processing = self.queue.counts().await.processing;
            self.sent
                .lock()
                .unwrap()
                .push((notification.clone(), processing));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        queue: Arc<InMemoryDispatcher>,
        notifier: Arc<Recorder>,
        pipeline: Pipeline,
    }

    impl Fixture {
        async fn lease(&self, id: TaskId) -> Box<dyn JobLease> {
            self.queue.submit(id).await.unwrap();
            self.queue.lease().await.unwrap()
        }
    }

    fn fixture(vision: Vision, generation_delay: Duration) -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryDispatcher::new(4, Arc::new(SystemClock)));
        let notifier = Arc::new(Recorder {
            queue: queue.clone(),
            sent: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(
            store.clone(),
            StageSet {
                vision: Arc::new(vision),
                generator: Arc::new(SlowGenerator(generation_delay)),
                artifacts: Arc::new(Keys),
            },
            notifier.clone(),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            StageTimeouts::uniform(Duration::from_millis(200)),
        );
        Fixture {
            store,
            queue,
            notifier,
            pipeline,
        }
    }

    async fn queued_task(store: &InMemoryTaskStore) -> TaskId {
        let now = chrono::Utc::now();
        let id = TaskId::from_ulid(Ulid::new());
        let task = TaskRecord::new(id, OwnerId::new("u"), NewTask::new("chair"), now).unwrap();
        store.insert(task).await.unwrap();

        let file_id = FileId::from_ulid(Ulid::new());
        let input = AppFile {
            id: file_id,
            task_id: id,
            kind: FileKind::Input,
            storage_key: format!("{id}/{file_id}-chair.png"),
            content_type: "image/png".into(),
            size: 3,
            created_at: now,
        };
        store
            .add_file(input, &mut |task| task.attach_input(file_id, now))
            .await
            .unwrap();
        store
            .update(id, &mut |task| task.enqueue(now).map(|_| ()))
            .await
            .unwrap();
        id
    }

    fn kinds(messages: &[Message]) -> Vec<MessageKind> {
        messages.iter().map(|m| m.kind).collect()
    }

    #[tokio::test]
    async fn successful_run_completes_with_output() {
        let f = fixture(Vision(None), Duration::ZERO);
        let id = queued_task(&f.store).await;

        let outcome = f.pipeline.run(f.lease(id).await).await;

        let task = f.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(outcome, RunOutcome::Completed { output: task.output_file.unwrap() });
        let messages = f.store.messages(id).await.unwrap();
        assert_eq!(
            kinds(&messages),
            vec![
                MessageKind::Progress,
                MessageKind::Progress,
                MessageKind::Progress,
                MessageKind::Progress,
                MessageKind::Completed,
            ]
        );
        assert_eq!(f.notifier.len(), 1);
        assert_eq!(f.queue.counts().await.processing, 0);
    }

    #[tokio::test]
    async fn lease_is_released_before_the_notification_goes_out() {
        for vision in [
            Vision(None),
            Vision(Some(ModelMakerError::external(Stage::VisionAnalysis, "503"))),
        ] {
            let f = fixture(vision, Duration::ZERO);
            let id = queued_task(&f.store).await;

            f.pipeline.run(f.lease(id).await).await;

            let sent = f.notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, 0, "task still marked in flight while notifying");
        }
    }

    #[tokio::test]
    async fn stage_error_fails_task_and_names_stage() {
        let f = fixture(
            Vision(Some(ModelMakerError::external(Stage::VisionAnalysis, "503"))),
            Duration::ZERO,
        );
        let id = queued_task(&f.store).await;

        let outcome = f.pipeline.run(f.lease(id).await).await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                stage: Stage::VisionAnalysis,
                kind: ErrorKind::ExternalService
            }
        );
        let task = f.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.output_file, None);
        let messages = f.store.messages(id).await.unwrap();
        let failed = messages.last().unwrap();
        assert_eq!(failed.kind, MessageKind::Failed);
        assert_eq!(failed.body, "vision analysis failed [external_service]: 503");
    }

    #[tokio::test]
    async fn stage_timeout_is_external_service_failure() {
        let f = fixture(Vision(None), Duration::from_secs(5));
        let id = queued_task(&f.store).await;

        let outcome = f.pipeline.run(f.lease(id).await).await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                stage: Stage::ModelGeneration,
                kind: ErrorKind::ExternalService
            }
        );
    }

    #[tokio::test]
    async fn job_for_task_that_is_not_queued_is_skipped() {
        let f = fixture(Vision(None), Duration::ZERO);
        let id = queued_task(&f.store).await;
        f.pipeline.run(f.lease(id).await).await;

        // 終端後に同じ task のジョブが来ても何もしない
        assert_eq!(f.pipeline.run(f.lease(id).await).await, RunOutcome::Skipped);
        assert_eq!(f.notifier.len(), 1);
        assert_eq!(f.queue.counts().await.processing, 0);
    }

    #[tokio::test]
    async fn fault_fails_in_flight_task_once() {
        let f = fixture(Vision(None), Duration::ZERO);
        let id = queued_task(&f.store).await;

        f.pipeline.fail_after_fault(id, "worker panicked").await;
        f.pipeline.fail_after_fault(id, "worker panicked").await;

        assert_eq!(f.store.get(id).await.unwrap().status, TaskStatus::Failed);
        assert_eq!(f.notifier.len(), 1);
        let last = f.store.messages(id).await.unwrap().pop().unwrap();
        assert!(last.body.contains("[internal]"));
    }
}
