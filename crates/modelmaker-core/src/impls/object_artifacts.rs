//! ObjectStoreArtifacts - ArtifactStorage ステージを ObjectStorage の上に実装
//!
//! 生成物は実行ごとに別の key に書く。再処理中でも前回の出力は上書きされず、
//! 新しい実行が成功してタスクが切り替わるまでそのまま取得できる。

use std::sync::Arc;

use async_trait::async_trait;
use ulid::Ulid;

use crate::domain::{GeneratedModel, ModelMakerError, Result, Stage, TaskId};
use crate::ports::{ArtifactStorage, ObjectStorage};

pub struct ObjectStoreArtifacts {
    storage: Arc<dyn ObjectStorage>,
}

impl ObjectStoreArtifacts {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    fn key_for(task_id: TaskId, model: &GeneratedModel) -> String {
        let ext: String = model
            .extension
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let ext = if ext.is_empty() { "bin".to_string() } else { ext.to_ascii_lowercase() };
        format!("{task_id}/models/{}.{ext}", Ulid::new())
    }
}

#[async_trait]
impl ArtifactStorage for ObjectStoreArtifacts {
    async fn store(&self, task_id: TaskId, model: &GeneratedModel) -> Result<String> {
        if model.bytes.is_empty() {
            return Err(ModelMakerError::external(
                Stage::ArtifactStorage,
                "generated model is empty",
            ));
        }
        let key = Self::key_for(task_id, model);
        self.storage
            .put(&key, model.bytes.clone(), &model.content_type)
            .await
            .map_err(|e| ModelMakerError::external(Stage::ArtifactStorage, e.to_string()))?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::InMemoryObjectStorage;

    #[tokio::test]
    async fn stores_each_run_under_a_fresh_key() {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let artifacts = ObjectStoreArtifacts::new(storage.clone());
        let task_id = TaskId::from_ulid(Ulid::new());
        let model = GeneratedModel::new(vec![1, 2], "model/gltf-binary", ".GLB");

        let first = artifacts.store(task_id, &model).await.unwrap();
        let second = artifacts.store(task_id, &model).await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with(&format!("{task_id}/models/")));
        assert!(first.ends_with(".glb"));
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn empty_model_is_an_external_failure() {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let artifacts = ObjectStoreArtifacts::new(storage);
        let model = GeneratedModel::new(vec![], "model/gltf-binary", "glb");

        let err = artifacts
            .store(TaskId::from_ulid(Ulid::new()), &model)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
    }
}
