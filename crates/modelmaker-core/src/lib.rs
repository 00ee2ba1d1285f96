//! modelmaker-core
//!
//! Core building blocks for the ModelMaker service: image uploads go in,
//! generated 3D models come out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, file, message, stage, job, errors, events）
//! - **ports**: 抽象化レイヤー（TaskStore, ObjectStorage, ステージ, Notifier, IdentityVerifier, Clock）
//! - **queue**: ジョブの Dispatcher（FIFO、上限つき、タスクごとに 1 ジョブ）
//! - **app**: アプリケーションロジック（builder, task_service, pipeline, worker_loop）
//! - **impls**: ports の実装（in-memory, ローカルファイル, HTTP）
//! - **config**: 環境変数からの設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use self::app::{App, AppBuilder, BuildError, TaskService, WorkerPool};
pub use self::config::{AppConfig, ConfigError, StageTimeouts};
pub use self::domain::{ErrorKind, ModelMakerError, Result};
