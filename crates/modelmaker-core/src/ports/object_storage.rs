//! ObjectStorage port - Blob ストレージ（ローカル / InMemory / 将来 S3）
//!
//! アップロードされた入力画像と生成されたモデルの両方をここに置く。
//! 実装の詳細（ディレクトリ構成、バケット）は隠蔽し、key だけで参照する。

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::Result;

/// A blob fetched from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl StoredObject {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write (or overwrite) the blob at `key`.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Missing keys are `NotFound`.
    async fn get(&self, key: &str) -> Result<StoredObject>;

    /// Remove the blob at `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
