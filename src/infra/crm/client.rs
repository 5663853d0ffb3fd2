//! Retrying CRM REST client.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::params::encode_params;
use super::transport::{CrmTransport, TransportFailure};
use crate::domain::CrmError;

/// Timeouts and retry policy for CRM calls
#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    pub timeout: Duration,
    /// Total attempts made while the CRM host cannot be resolved
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for CrmClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl CrmClientConfig {
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let timeout = env::var("CRM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_attempts = env::var("CRM_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|attempts: &u32| *attempts > 0)
            .unwrap_or(defaults.max_attempts);

        let retry_delay = env::var("CRM_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);

        Self {
            timeout,
            max_attempts,
            retry_delay,
        }
    }
}

/// Decoded CRM response body
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CrmEnvelope {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CrmEnvelope {
    /// The `result` payload, or an API error if the CRM reported one
    pub fn into_result(self) -> Result<Value, CrmError> {
        match self.error {
            Some(Value::Null) | None => Ok(self.result.unwrap_or(Value::Null)),
            Some(error) => {
                let code = match error {
                    Value::String(code) => code,
                    other => other.to_string(),
                };
                let message = self
                    .error_description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| code.clone());
                Err(CrmError::Api { code, message })
            }
        }
    }
}

/// CRM client wrapping a transport with the retry policy
pub struct CrmClient {
    transport: Arc<dyn CrmTransport>,
    config: CrmClientConfig,
}

impl CrmClient {
    pub fn new(transport: Arc<dyn CrmTransport>, config: CrmClientConfig) -> Self {
        Self { transport, config }
    }

    /// Invoke a CRM method and decode the response envelope.
    ///
    /// Only host resolution failures are retried. Any other transport error
    /// is returned at once, and HTTP status codes are not inspected.
    #[instrument(skip(self, params), fields(method = %method))]
    pub async fn call(&self, method: &str, params: &Value) -> Result<CrmEnvelope, CrmError> {
        let form = encode_params(params);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.transport.post_form(method, &form).await {
                Ok(body) => return decode_envelope(&body),
                Err(TransportFailure::HostResolution(message)) => {
                    warn!(attempt, max_attempts = attempts, error = %message, "CRM host resolution failed");
                    last_error = message;
                }
                Err(TransportFailure::Other(message)) => {
                    warn!(attempt, error = %message, "CRM transport error");
                    return Err(CrmError::Transport(message));
                }
            }
        }

        Err(CrmError::Network(last_error))
    }

    /// Invoke a CRM method and return its `result`, mapping `error` to [`CrmError::Api`]
    pub async fn call_result(&self, method: &str, params: &Value) -> Result<Value, CrmError> {
        self.call(method, params).await?.into_result()
    }
}

fn decode_envelope(body: &str) -> Result<CrmEnvelope, CrmError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CrmError::InvalidResponse(format!("Failed to decode body: {}", e)))?;

    if is_falsy(&value) {
        return Err(CrmError::InvalidResponse("Empty response body".to_string()));
    }

    let envelope: CrmEnvelope = serde_json::from_value(value)
        .map_err(|e| CrmError::InvalidResponse(format!("Unexpected response shape: {}", e)))?;
    debug!(has_error = envelope.error.is_some(), "CRM envelope decoded");
    Ok(envelope)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
