//! Domain model (IDs, task lifecycle, files, messages, stages, errors).

pub mod errors;
pub mod events;
pub mod file;
pub mod ids;
pub mod job;
pub mod message;
pub mod stage;
pub mod task;

pub use self::errors::{ErrorKind, ModelMakerError, Result};
pub use self::events::TaskNotification;
pub use self::file::{AppFile, FileKind, FileUpload};
pub use self::ids::{FileId, MessageId, OwnerId, TaskId};
pub use self::job::Job;
pub use self::message::{Author, Message, MessageKind};
pub use self::stage::{AnalysisPayload, GeneratedModel, Label, Stage};
pub use self::task::{NewTask, TaskDetail, TaskPatch, TaskRecord, TaskStatus};
