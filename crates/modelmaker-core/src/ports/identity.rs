//! IdentityVerifier port - 不透明な認証情報を owner に解決する

use async_trait::async_trait;

use crate::domain::{OwnerId, Result};

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Failure is `ModelMakerError::Unauthenticated`.
    async fn verify(&self, credential: &str) -> Result<OwnerId>;
}
