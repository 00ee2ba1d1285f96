//! ObjectStorage の実装
//!
//! - **InMemoryObjectStorage**: テスト・デモ用
//! - **LocalObjectStorage**: ローカルディスク（content type は `.content-type` サイドカーに保存）

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ModelMakerError, Result};
use crate::ports::{ObjectStorage, StoredObject};

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Keys are relative, `/`-separated and never climb out of the root.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.ends_with(CONTENT_TYPE_SUFFIX) {
        return Err(ModelMakerError::validation(format!("invalid storage key {key:?}")));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(ModelMakerError::validation(format!("invalid storage key {key:?}")));
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        let objects = self.objects.read().await;
        let (content_type, bytes) = objects
            .get(key)
            .ok_or_else(|| ModelMakerError::not_found("object", key))?;
        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.clone(),
            bytes: bytes.clone(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn sidecar(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(s)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ModelMakerError::internal(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ModelMakerError::internal(format!("write {}: {e}", path.display())))?;
        tokio::fs::write(Self::sidecar(&path), content_type)
            .await
            .map_err(|e| ModelMakerError::internal(format!("write content type for {key}: {e}")))?;
        tracing::debug!(key, path = %path.display(), "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelMakerError::not_found("object", key));
            }
            Err(e) => {
                return Err(ModelMakerError::internal(format!("read {}: {e}", path.display())));
            }
        };
        let content_type = tokio::fs::read_to_string(Self::sidecar(&path))
            .await
            .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());
        Ok(StoredObject {
            key: key.to_string(),
            content_type,
            bytes,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        for target in [Self::sidecar(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ModelMakerError::internal(format!(
                        "remove {}: {e}",
                        target.display()
                    )));
                }
            }
        }
        tracing::debug!(key, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case::empty("")]
    #[case::absolute("/etc/passwd")]
    #[case::parent("a/../../b")]
    #[case::sidecar("a/model.glb.content-type")]
    fn rejects_unsafe_keys(#[case] key: &str) {
        assert_eq!(validate_key(key).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn in_memory_put_then_get() {
        let storage = InMemoryObjectStorage::new();
        storage.put("t/model.glb", vec![1, 2, 3], "model/gltf-binary").await.unwrap();

        let obj = storage.get("t/model.glb").await.unwrap();
        assert_eq!(obj.bytes, vec![1, 2, 3]);
        assert_eq!(obj.content_type, "model/gltf-binary");
        assert_eq!(
            storage.get("t/missing").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn local_storage_keeps_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());

        storage.put("task-1/in.png", vec![9; 4], "image/png").await.unwrap();
        let obj = storage.get("task-1/in.png").await.unwrap();

        assert_eq!(obj.size(), 4);
        assert_eq!(obj.content_type, "image/png");
        assert!(dir.path().join("task-1/in.png").exists());
    }

    #[tokio::test]
    async fn delete_removes_object_and_tolerates_missing_keys() {
        let memory = InMemoryObjectStorage::new();
        memory.put("t/a.png", vec![1], "image/png").await.unwrap();
        memory.delete("t/a.png").await.unwrap();
        memory.delete("t/a.png").await.unwrap();
        assert_eq!(memory.get("t/a.png").await.unwrap_err().kind(), ErrorKind::NotFound);

        let dir = tempfile::tempdir().unwrap();
        let local = LocalObjectStorage::new(dir.path());
        local.put("t/a.png", vec![1], "image/png").await.unwrap();
        local.delete("t/a.png").await.unwrap();
        local.delete("t/a.png").await.unwrap();
        assert!(!dir.path().join("t/a.png").exists());
        assert!(!dir.path().join("t/a.png.content-type").exists());
    }

    #[tokio::test]
    async fn local_storage_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let err = storage.get("nothing/here").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
