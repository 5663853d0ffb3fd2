//! Raw HTTP transport to the CRM REST endpoint.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

use crate::domain::AppError;

/// Transport-level failure, classified for the retry policy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// The CRM host name could not be resolved
    #[error("Could not resolve host: {0}")]
    HostResolution(String),
    #[error("{0}")]
    Other(String),
}

/// Posts form-encoded parameters to a CRM method and returns the raw body
#[async_trait]
pub trait CrmTransport: Send + Sync {
    async fn post_form(
        &self,
        method: &str,
        form: &[(String, String)],
    ) -> Result<String, TransportFailure>;
}

/// `reqwest` transport bound to the secret CRM webhook base URL
pub struct HttpCrmTransport {
    http_client: Client,
    base_url: SecretString,
}

impl HttpCrmTransport {
    /// Create a transport for the given webhook base URL.
    ///
    /// Certificate verification is disabled: CRM instances are frequently
    /// served with self-signed certificates.
    pub fn new(base_url: SecretString, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn method_url(&self, method: &str) -> String {
        let base = self.base_url.expose_secret();
        if base.ends_with('/') {
            format!("{}{}", base, method)
        } else {
            format!("{}/{}", base, method)
        }
    }
}

#[async_trait]
impl CrmTransport for HttpCrmTransport {
    async fn post_form(
        &self,
        method: &str,
        form: &[(String, String)],
    ) -> Result<String, TransportFailure> {
        let response = self
            .http_client
            .post(self.method_url(method))
            .form(form)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_error)?;
        debug!(method = %method, status = %status, bytes = body.len(), "CRM responded");
        Ok(body)
    }
}

/// Strip the URL (it embeds the webhook secret) and classify the error chain
fn classify_error(error: reqwest::Error) -> TransportFailure {
    let error = error.without_url();
    let message = error_chain(&error);
    if is_host_resolution_failure(&message) {
        TransportFailure::HostResolution(message)
    } else {
        TransportFailure::Other(message)
    }
}

fn error_chain(error: &dyn StdError) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn is_host_resolution_failure(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "dns error",
        "failed to lookup address",
        "could not resolve host",
        "name or service not known",
        "no such host",
        "nodename nor servname",
    ];
    let message = message.to_lowercase();
    MARKERS.iter().any(|marker| message.contains(marker))
}
