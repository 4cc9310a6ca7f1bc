//! Sources of fresh subscription payloads.
//!
//! # Responsibilities
//! - Define the provisioning contract the scheduler consumes
//! - Fetch payloads over HTTP and classify failures
//! - Retry transient failures a bounded number of times after a fixed pause

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::{GatewayConfig, ProvisionerConfig, ProvisionerKind};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ProvisionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::Auth(_) => "auth",
            ProvisionError::RateLimited(_) => "rate_limited",
            ProvisionError::Transient(_) => "transient",
            ProvisionError::Permanent(_) => "permanent",
        }
    }

    /// Worth another attempt within the same pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Transient(_) | ProvisionError::RateLimited(_))
    }
}

/// Produces the payload for one slot from no prior state.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, index: usize) -> Result<Bytes, ProvisionError>;
}

#[async_trait]
impl<P: Provisioner + ?Sized> Provisioner for Arc<P> {
    async fn provision(&self, index: usize) -> Result<Bytes, ProvisionError> {
        (**self).provision(index).await
    }
}

/// Fetches the payload from a URL template.
///
/// `{user}` expands to the 1-based user id, `{index}` to the slot index.
pub struct HttpProvisioner {
    client: reqwest::Client,
    source_url: String,
}

impl HttpProvisioner {
    pub fn new(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProvisionError::Permanent(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            source_url: config.source_url.clone(),
        })
    }

    pub fn url_for(&self, index: usize) -> String {
        expand_url(&self.source_url, index)
    }
}

pub(crate) fn expand_url(template: &str, index: usize) -> String {
    template
        .replace("{user}", &(index + 1).to_string())
        .replace("{index}", &index.to_string())
}

fn classify_status(status: StatusCode) -> Option<ProvisionError> {
    let detail = format!("source answered {}", status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(ProvisionError::Auth(detail)),
        StatusCode::TOO_MANY_REQUESTS => Some(ProvisionError::RateLimited(detail)),
        s if s.is_server_error() => Some(ProvisionError::Transient(detail)),
        s if !s.is_success() => Some(ProvisionError::Permanent(detail)),
        _ => None,
    }
}

fn classify_transport(err: reqwest::Error) -> ProvisionError {
    if err.is_builder() {
        ProvisionError::Permanent(err.to_string())
    } else {
        ProvisionError::Transient(err.to_string())
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn provision(&self, index: usize) -> Result<Bytes, ProvisionError> {
        let url = self.url_for(index);
        let response = self.client.get(&url).send().await.map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body = response.bytes().await.map_err(classify_transport)?;
        if body.is_empty() {
            return Err(ProvisionError::Permanent("source returned an empty document".to_string()));
        }
        Ok(body)
    }
}

/// Bounded-attempt wrapper around another provisioner.
///
/// The pause between attempts is constant; longer waits belong to the
/// scheduler's retry interval.
pub struct RetryingProvisioner<P> {
    inner: P,
    max_attempts: u32,
    delay: Duration,
}

impl<P: Provisioner> RetryingProvisioner<P> {
    pub fn new(inner: P, max_attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

#[async_trait]
impl<P: Provisioner> Provisioner for RetryingProvisioner<P> {
    async fn provision(&self, index: usize) -> Result<Bytes, ProvisionError> {
        let mut attempt = 1;
        loop {
            match self.inner.provision(index).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(
                        slot = index,
                        attempt,
                        delay = ?self.delay,
                        kind = e.kind(),
                        error = %e,
                        "Provisioning attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Always fails; slots stay not-ready.
#[derive(Debug, Default)]
pub struct DisabledProvisioner;

#[async_trait]
impl Provisioner for DisabledProvisioner {
    async fn provision(&self, _index: usize) -> Result<Bytes, ProvisionError> {
        Err(ProvisionError::Permanent("provisioning disabled".to_string()))
    }
}

/// Build the provisioner named by the configuration.
pub fn build_provisioner(config: &GatewayConfig) -> Result<Arc<dyn Provisioner>, ProvisionError> {
    match config.provisioner.kind {
        ProvisionerKind::Http => {
            let http = HttpProvisioner::new(&config.provisioner)?;
            Ok(Arc::new(RetryingProvisioner::new(
                http,
                config.renewal.max_attempts,
                Duration::from_millis(config.renewal.attempt_delay_ms),
            )))
        }
        ProvisionerKind::Disabled => Ok(Arc::new(DisabledProvisioner)),
    }
}
