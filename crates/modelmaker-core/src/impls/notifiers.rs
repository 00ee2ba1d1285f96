//! Notifier の実装
//!
//! - **LogNotifier**: 構造化ログを 1 行出すだけ（デフォルト）
//! - **WebhookNotifier**: 通知 JSON を外部 URL に POST する

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ModelMakerError, Result, TaskNotification};
use crate::ports::Notifier;

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &TaskNotification) -> Result<()> {
        tracing::info!(
            task_id = %notification.task_id,
            owner = %notification.owner,
            status = ?notification.status,
            title = %notification.title,
            "task notification"
        );
        Ok(())
    }
}

/// Delivers notifications to an external webhook endpoint.
///
/// One attempt per notification; a failed delivery is reported to the
/// caller, which only logs it.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelMakerError::internal(format!("build webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &TaskNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| ModelMakerError::internal(format!("webhook request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ModelMakerError::internal(format!(
                "webhook returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
