// src/check.rs
//
// Existence-check transport: is the resource behind a locator servable?
// Production checks send an HTTP HEAD for the resource's metadata document.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::settings::EngineSettings;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("server returned status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Lightweight per-locator availability check.
#[async_trait]
pub trait ExistenceCheck: Send + Sync {
    async fn check(&self, locator: &str) -> Result<(), CheckError>;
}

/// HEAD `{locator}{metadata_suffix}`; any 2xx status means the frame exists.
pub struct HttpExistenceCheck {
    client: reqwest::Client,
    metadata_suffix: String,
    timeout: Duration,
}

impl HttpExistenceCheck {
    pub fn new(settings: &EngineSettings) -> Result<Self, String> {
        let timeout = Duration::from_millis(settings.check_timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
        Ok(Self::with_client(client, &settings.metadata_suffix, timeout))
    }

    /// Use a preconfigured client. `timeout` is only reported in errors;
    /// the client enforces its own.
    pub fn with_client(client: reqwest::Client, metadata_suffix: &str, timeout: Duration) -> Self {
        Self {
            client,
            metadata_suffix: metadata_suffix.to_string(),
            timeout,
        }
    }

    pub fn probe_url(&self, locator: &str) -> String {
        format!("{}{}", locator, self.metadata_suffix)
    }
}

#[async_trait]
impl ExistenceCheck for HttpExistenceCheck {
    async fn check(&self, locator: &str) -> Result<(), CheckError> {
        let response = self
            .client
            .head(self.probe_url(locator))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckError::Timeout(self.timeout)
                } else {
                    CheckError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(CheckError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
