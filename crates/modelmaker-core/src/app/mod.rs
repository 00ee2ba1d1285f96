//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **TaskService**: タスクのライフサイクル操作（作成、アップロード、開始、アーカイブ…）
//! - **Pipeline**: 1 ジョブ分のステージ実行と終端遷移
//! - **WorkerPool**: ジョブを lease して Pipeline を回すワーカー群

pub mod builder;
pub mod pipeline;
pub mod task_service;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::pipeline::{Pipeline, RunOutcome, StageSet};
pub use self::task_service::{ServiceDeps, ServiceLimits, TaskService};
pub use self::worker_loop::WorkerPool;
