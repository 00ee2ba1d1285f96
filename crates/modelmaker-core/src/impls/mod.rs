//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: タスク単位ロックの正本（開発・テスト用）
//! - **InMemoryObjectStorage / LocalObjectStorage**: バイト列の保存先
//! - **ObjectStoreArtifacts**: 生成モデルを ObjectStorage に書く ArtifactStorage
//! - **HttpVisionAnalyzer / HttpModelGenerator**: 外部推論サービスの HTTP クライアント
//! - **LogNotifier / WebhookNotifier**: 終端遷移の通知
//! - **StaticTokenVerifier**: 固定トークン表による認証

pub mod http_stages;
pub mod inmem_store;
pub mod notifiers;
pub mod object_artifacts;
pub mod object_storage;
pub mod static_identity;

pub use self::http_stages::{HttpModelGenerator, HttpVisionAnalyzer, extension_for};
pub use self::inmem_store::InMemoryTaskStore;
pub use self::notifiers::{LogNotifier, WebhookNotifier};
pub use self::object_artifacts::ObjectStoreArtifacts;
pub use self::object_storage::{InMemoryObjectStorage, LocalObjectStorage};
pub use self::static_identity::StaticTokenVerifier;
