//! Message log entries (chat + pipeline audit trail).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ModelMakerError, Result};
use super::ids::{MessageId, TaskId};

pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    System,
}

/// What a message records. User messages are always `Chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    Progress,
    Completed,
    Failed,
}

/// Append-only: no setter exists once a message is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub task_id: TaskId,
    pub author: Author,
    pub kind: MessageKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(
        id: MessageId,
        task_id: TaskId,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let body = body.into();
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ModelMakerError::validation("message must not be empty"));
        }
        if trimmed.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ModelMakerError::validation(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }
        Ok(Self {
            id,
            task_id,
            author: Author::User,
            kind: MessageKind::Chat,
            body: trimmed.to_string(),
            created_at: now,
        })
    }

    pub fn system(
        id: MessageId,
        task_id: TaskId,
        kind: MessageKind,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            author: Author::System,
            kind,
            body: body.into(),
            created_at: now,
        }
    }
}
