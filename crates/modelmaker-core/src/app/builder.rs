//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンで依存を明示的に渡す（グローバルなシングルトンを持たない）
//! - 起動時検証（Fail-fast 設計）: 代わりのない依存が欠けていたら build() で落とす

use std::sync::Arc;

use super::pipeline::{Pipeline, StageSet};
use super::task_service::{ServiceDeps, ServiceLimits, TaskService};
use super::worker_loop::WorkerPool;
use crate::config::AppConfig;
use crate::impls::{InMemoryObjectStorage, InMemoryTaskStore, LogNotifier, ObjectStoreArtifacts};
use crate::ports::{
    ArtifactStorage, Clock, IdGenerator, IdentityVerifier, ModelGenerator, Notifier,
    ObjectStorage, SystemClock, TaskStore, UlidGenerator, VisionAnalyzer,
};
use crate::queue::{InMemoryDispatcher, JobQueue};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .vision(Arc::new(my_vision))
///     .generator(Arc::new(my_generator))
///     .identity(Arc::new(verifier))
///     .build()?;
/// let workers = app.start_workers();
/// ```
///
/// # デフォルト
/// - store / object storage: in-memory
/// - artifacts: object storage に書く `ObjectStoreArtifacts`
/// - notifier: `LogNotifier`, clock: `SystemClock`, ids: ULID
///
/// vision / generator / identity にはデフォルトがなく、欠けると BuildError。
#[derive(Default)]
pub struct AppBuilder {
    config: AppConfig,
    store: Option<Arc<dyn TaskStore>>,
    objects: Option<Arc<dyn ObjectStorage>>,
    vision: Option<Arc<dyn VisionAnalyzer>>,
    generator: Option<Arc<dyn ModelGenerator>>,
    artifacts: Option<Arc<dyn ArtifactStorage>>,
    notifier: Option<Arc<dyn Notifier>>,
    identity: Option<Arc<dyn IdentityVerifier>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing component: {0}. It has no default and must be provided.")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn object_storage(mut self, objects: Arc<dyn ObjectStorage>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn vision(mut self, vision: Arc<dyn VisionAnalyzer>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ModelGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStorage>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// # 検証
    /// - vision / generator / identity が揃っているか
    /// - workers と queue_capacity が 0 でないか
    pub fn build(self) -> Result<App, BuildError> {
        let vision = self.vision.ok_or(BuildError::Missing("vision analyzer"))?;
        let generator = self.generator.ok_or(BuildError::Missing("model generator"))?;
        let identity = self.identity.ok_or(BuildError::Missing("identity verifier"))?;
        if self.config.workers == 0 {
            return Err(BuildError::InvalidConfig("workers must be greater than zero"));
        }
        if self.config.queue_capacity == 0 {
            return Err(BuildError::InvalidConfig("queue capacity must be greater than zero"));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store: Arc<dyn TaskStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let objects: Arc<dyn ObjectStorage> = self
            .objects
            .unwrap_or_else(|| Arc::new(InMemoryObjectStorage::new()));
        let artifacts: Arc<dyn ArtifactStorage> = self
            .artifacts
            .unwrap_or_else(|| Arc::new(ObjectStoreArtifacts::new(Arc::clone(&objects))));
        let notifier: Arc<dyn Notifier> = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryDispatcher::new(
            self.config.queue_capacity,
            Arc::clone(&clock),
        ));

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            StageSet {
                vision: Arc::clone(&vision),
                generator,
                artifacts,
            },
            notifier,
            Arc::clone(&clock),
            Arc::clone(&ids),
            self.config.stage_timeouts.clone(),
        ));
        let service = Arc::new(TaskService::new(
            ServiceDeps {
                store,
                objects,
                queue: Arc::clone(&queue),
                vision,
                identity,
                clock,
                ids,
            },
            ServiceLimits {
                max_upload_bytes: self.config.max_upload_bytes,
                vision_timeout: self.config.stage_timeouts.vision,
            },
        ));

        Ok(App {
            service,
            pipeline,
            queue,
            workers: self.config.workers,
        })
    }
}

/// App はアプリケーションのランタイム
pub struct App {
    pub service: Arc<TaskService>,
    pub pipeline: Arc<Pipeline>,
    pub queue: Arc<dyn JobQueue>,
    workers: usize,
}

impl App {
    /// Spawn the configured number of workers.
    pub fn start_workers(&self) -> WorkerPool {
        WorkerPool::spawn(self.workers, Arc::clone(&self.queue), Arc::clone(&self.pipeline))
    }
}
