//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（DB、Blob storage、Vision / 生成サービス、通知、認証）への
//! インターフェースで、コアはこの trait にしか依存しません。
//!
//! # 設計原則
//! - TaskStore が正本（source of truth）
//! - 各コンポーネントは構築時に依存を受け取る（グローバルなシングルトンは持たない）

pub mod clock;
pub mod id_generator;
pub mod identity;
pub mod notifier;
pub mod object_storage;
pub mod stages;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::identity::IdentityVerifier;
pub use self::notifier::Notifier;
pub use self::object_storage::{ObjectStorage, StoredObject};
pub use self::stages::{ArtifactStorage, ModelGenerator, VisionAnalyzer};
pub use self::task_store::{TaskMutation, TaskStore};
