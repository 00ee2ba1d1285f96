//! Stage ports - パイプラインの各ステージ（外部サービス境界）
//!
//! # 設計原則
//! - 1 リクエスト / 1 レスポンスの純粋な境界
//! - 失敗は `ModelMakerError::ExternalService` として返す
//! - 呼び出し間で部分結果を保持しない（ステートレス）

use async_trait::async_trait;

use crate::domain::{AnalysisPayload, AppFile, GeneratedModel, Result, TaskId};

/// Vision Analysis: input image -> structured analysis payload.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, input: &AppFile) -> Result<AnalysisPayload>;
}

/// Model Generation: analysis (+ input image) -> generated model blob.
#[async_trait]
pub trait ModelGenerator: Send + Sync {
    async fn generate(&self, analysis: &AnalysisPayload, input: &AppFile) -> Result<GeneratedModel>;
}

/// Artifact Storage: generated blob -> durable storage key.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn store(&self, task_id: TaskId, model: &GeneratedModel) -> Result<String>;
}
