//! Errors - エラー型と分類
//!
//! ライフサイクル操作のエラーは呼び出し元へ同期的に返し、
//! パイプラインのエラーはタスクの status と message log に非同期で記録されます。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::Stage;

/// ErrorKind は運用上の分類
///
/// - Validation: 入力不正（リトライ無意味）
/// - NotFound: 未知の識別子
/// - Conflict: 状態と両立しない操作（二重 start など）
/// - Capacity: キュー飽和（時間をおいて再試行）
/// - ExternalService: ステージ実行の失敗（ジョブは Failed、自動リトライなし）
/// - Internal: 想定外の障害（該当ジョブにだけ閉じ込める）
/// - Unauthenticated: 認証情報の検証失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Capacity,
    ExternalService,
    Internal,
    Unauthenticated,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Capacity => "capacity",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Internal => "internal",
            ErrorKind::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ModelMakerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("{stage} failed: {message}")]
    ExternalService { stage: Stage, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl ModelMakerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity(message.into())
    }

    pub fn external(stage: Stage, message: impl Into<String>) -> Self {
        Self::ExternalService {
            stage,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelMakerError::Validation(_) => ErrorKind::Validation,
            ModelMakerError::NotFound { .. } => ErrorKind::NotFound,
            ModelMakerError::Conflict(_) => ErrorKind::Conflict,
            ModelMakerError::Capacity(_) => ErrorKind::Capacity,
            ModelMakerError::ExternalService { .. } => ErrorKind::ExternalService,
            ModelMakerError::Internal(_) => ErrorKind::Internal,
            ModelMakerError::Unauthenticated(_) => ErrorKind::Unauthenticated,
        }
    }
}

pub type Result<T, E = ModelMakerError> = std::result::Result<T, E>;
