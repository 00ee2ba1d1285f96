//! StaticTokenVerifier - 固定トークン表による認証（開発・テスト用）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{ModelMakerError, OwnerId, Result};
use crate::ports::IdentityVerifier;

#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, owner: OwnerId) -> Self {
        self.tokens.insert(token.into(), owner);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<OwnerId> {
        let token = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();
        if token.is_empty() {
            return Err(ModelMakerError::Unauthenticated("missing credential".into()));
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ModelMakerError::Unauthenticated("unknown credential".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[tokio::test]
    async fn resolves_known_token_with_or_without_bearer() {
        let verifier = StaticTokenVerifier::new().with_token("abc", OwnerId::new("alice"));

        assert_eq!(verifier.verify("abc").await.unwrap(), OwnerId::new("alice"));
        assert_eq!(verifier.verify("Bearer abc").await.unwrap(), OwnerId::new("alice"));
    }

    #[tokio::test]
    async fn unknown_or_empty_token_is_unauthenticated() {
        let verifier = StaticTokenVerifier::new().with_token("abc", OwnerId::new("alice"));

        for credential in ["nope", "", "Bearer "] {
            let err = verifier.verify(credential).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        }
    }
}
