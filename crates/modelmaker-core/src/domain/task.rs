//! Task record and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ModelMakerError, Result};
use super::file::AppFile;
use super::ids::{FileId, OwnerId, TaskId};
use super::message::Message;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Task status.
///
/// State transitions:
/// - Created -> Uploaded -> Queued -> Processing -> Completed
/// - Queued | Processing -> Failed
/// - Uploaded | Completed | Failed -> Queued (reprocessing)
///
/// archived フラグは status とは直交しており、どの状態にも重ねられる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// A job exists (or is about to exist) for this task.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_start(self) -> bool {
        matches!(
            self,
            TaskStatus::Uploaded | TaskStatus::Completed | TaskStatus::Failed
        )
    }
}

/// Input for CreateTask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial edit for UpdateTask. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ModelMakerError::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ModelMakerError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> Result<String> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ModelMakerError::validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(description.to_string())
}

/// Task record: the single source of truth for a task's state.
///
/// Design:
/// - 状態遷移はすべてここのメソッド経由（フィールドを直接書き換えない）
/// - ガードに失敗したときは record を一切変更せずに Err を返す
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub owner: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub archived: bool,

    /// Input files in attachment order; the last one feeds the pipeline.
    pub input_files: Vec<FileId>,

    /// Output of the latest successful run.
    pub output_file: Option<FileId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, owner: OwnerId, input: NewTask, now: DateTime<Utc>) -> Result<Self> {
        let title = validate_title(&input.title)?;
        let description = input
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        Ok(Self {
            id,
            owner,
            title,
            description,
            status: TaskStatus::Created,
            archived: false,
            input_files: Vec::new(),
            output_file: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn latest_input(&self) -> Option<FileId> {
        self.input_files.last().copied()
    }

    /// Upload: attach an input file.
    pub fn attach_input(&mut self, file_id: FileId, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_in_flight() {
            return Err(ModelMakerError::validation(format!(
                "cannot upload while task is {:?}",
                self.status
            )));
        }
        self.input_files.push(file_id);
        if self.status == TaskStatus::Created {
            self.status = TaskStatus::Uploaded;
        }
        self.updated_at = now;
        Ok(())
    }

    /// StartProcess: move to Queued. Returns the previous status so a failed
    /// submission can be rolled back.
    pub fn enqueue(&mut self, now: DateTime<Utc>) -> Result<TaskStatus> {
        if self.status.is_in_flight() {
            return Err(ModelMakerError::conflict(format!(
                "task {} is already {:?}",
                self.id, self.status
            )));
        }
        if self.input_files.is_empty() {
            return Err(ModelMakerError::validation(
                "task has no input file; upload one before starting",
            ));
        }
        if !self.status.can_start() {
            return Err(ModelMakerError::validation(format!(
                "task cannot be started from {:?}",
                self.status
            )));
        }
        let previous = self.status;
        self.status = TaskStatus::Queued;
        self.updated_at = now;
        Ok(previous)
    }

    /// Undo `enqueue` when the dispatcher refused the job.
    pub fn rollback_enqueue(&mut self, previous: TaskStatus, now: DateTime<Utc>) {
        if self.status == TaskStatus::Queued {
            self.status = previous;
            self.updated_at = now;
        }
    }

    /// Dispatcher hand-off: Queued -> Processing.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TaskStatus::Queued {
            return Err(ModelMakerError::conflict(format!(
                "task {} is {:?}, expected Queued",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    /// Pipeline success: Processing -> Completed with a new output.
    pub fn complete(&mut self, output: FileId, now: DateTime<Utc>) -> Result<()> {
        if self.status != TaskStatus::Processing {
            return Err(ModelMakerError::conflict(format!(
                "task {} is {:?}, expected Processing",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Completed;
        self.output_file = Some(output);
        self.updated_at = now;
        Ok(())
    }

    /// Pipeline failure: Queued | Processing -> Failed. The previous output
    /// (if any) stays addressable.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_in_flight() {
            return Err(ModelMakerError::conflict(format!(
                "task {} is {:?}, nothing to fail",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_archived(&mut self, archived: bool, now: DateTime<Utc>) {
        self.archived = archived;
        self.updated_at = now;
    }

    pub fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<()> {
        // 先に両方検証してから書き込む（部分更新を残さない）
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let description = patch
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = Some(description);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Full view returned by GetTask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task: TaskRecord,
    pub files: Vec<AppFile>,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    use crate::domain::errors::ErrorKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            OwnerId::new("owner-1"),
            NewTask::new("  chair  "),
            now(),
        )
        .unwrap()
    }

    fn file() -> FileId {
        FileId::from_ulid(Ulid::new())
    }

    #[test]
    fn new_task_starts_created_with_trimmed_title() {
        let task = record();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.title, "chair");
        assert!(!task.archived);
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    fn blank_title_is_rejected(#[case] title: &str) {
        let err = TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            OwnerId::new("o"),
            NewTask::new(title),
            now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn overlong_title_is_rejected() {
        let title = "x".repeat(MAX_TITLE_CHARS + 1);
        let err = TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            OwnerId::new("o"),
            NewTask::new(title),
            now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn upload_moves_created_to_uploaded() {
        let mut task = record();
        task.attach_input(file(), now()).unwrap();
        assert_eq!(task.status, TaskStatus::Uploaded);
    }

    #[rstest]
    #[case::queued(TaskStatus::Queued)]
    #[case::processing(TaskStatus::Processing)]
    fn upload_while_in_flight_is_rejected(#[case] status: TaskStatus) {
        let mut task = record();
        task.status = status;
        let err = task.attach_input(file(), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(task.input_files.is_empty());
    }

    #[rstest]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    fn upload_after_run_keeps_status(#[case] status: TaskStatus) {
        let mut task = record();
        task.status = status;
        let id = file();
        task.attach_input(id, now()).unwrap();
        assert_eq!(task.status, status);
        assert_eq!(task.latest_input(), Some(id));
    }

    #[test]
    fn start_without_input_is_validation_error() {
        let mut task = record();
        let err = task.enqueue(now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(task.status, TaskStatus::Created);
    }

    #[rstest]
    #[case::uploaded(TaskStatus::Uploaded)]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    fn start_is_allowed_from(#[case] status: TaskStatus) {
        let mut task = record();
        task.input_files.push(file());
        task.status = status;
        let previous = task.enqueue(now()).unwrap();
        assert_eq!(previous, status);
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[rstest]
    #[case::queued(TaskStatus::Queued)]
    #[case::processing(TaskStatus::Processing)]
    fn start_while_in_flight_is_conflict(#[case] status: TaskStatus) {
        let mut task = record();
        task.input_files.push(file());
        task.status = status;
        let err = task.enqueue(now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(task.status, status);
    }

    #[test]
    fn rollback_restores_previous_status() {
        let mut task = record();
        task.attach_input(file(), now()).unwrap();
        let previous = task.enqueue(now()).unwrap();
        task.rollback_enqueue(previous, now());
        assert_eq!(task.status, TaskStatus::Uploaded);
    }

    #[test]
    fn full_successful_run() {
        let mut task = record();
        task.attach_input(file(), now()).unwrap();
        task.enqueue(now()).unwrap();
        task.begin_processing(now()).unwrap();
        let output = file();
        task.complete(output, now()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output_file, Some(output));
    }

    #[test]
    fn failed_reprocess_keeps_prior_output() {
        let mut task = record();
        let prior = file();
        task.input_files.push(file());
        task.status = TaskStatus::Completed;
        task.output_file = Some(prior);

        task.enqueue(now()).unwrap();
        task.begin_processing(now()).unwrap();
        task.fail(now()).unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.output_file, Some(prior));
    }

    #[test]
    fn complete_requires_processing() {
        let mut task = record();
        let err = task.complete(file(), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(task.output_file.is_none());
    }

    #[test]
    fn archive_is_orthogonal_to_status() {
        let mut task = record();
        task.input_files.push(file());
        task.status = TaskStatus::Processing;
        task.set_archived(true, now());
        assert!(task.archived);
        assert_eq!(task.status, TaskStatus::Processing);
    }

    #[test]
    fn invalid_patch_changes_nothing() {
        let mut task = record();
        let patch = TaskPatch {
            title: Some("new".into()),
            description: Some("d".repeat(MAX_DESCRIPTION_CHARS + 1)),
        };
        assert!(task.apply_patch(patch, now()).is_err());
        assert_eq!(task.title, "chair");
    }
}
