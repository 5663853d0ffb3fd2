//! Error types for the payment relay.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors produced while talking to the CRM
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrmError {
    /// Transport failed for a reason other than host resolution
    #[error("Transport error: {0}")]
    Transport(String),
    /// Response body could not be decoded as structured data
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Host resolution kept failing until the attempts ran out
    #[error("Network error: {0}")]
    Network(String),
    /// The CRM answered with an `error` field
    #[error("API error: {message}")]
    Api { code: String, message: String },
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
}

/// Main application error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error(transparent)]
    Crm(#[from] CrmError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable identifier reported as `error_kind` in webhook responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crm(CrmError::Transport(_)) => "transport_error",
            Self::Crm(CrmError::InvalidResponse(_)) => "invalid_response",
            Self::Crm(CrmError::Network(_)) => "network_error",
            Self::Crm(CrmError::Api { .. }) => "api_error",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Config(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ParseWebhook,
    GetPayment,
    GetOrderEntity,
    GetDeal,
    CheckTransaction,
    ProcessBalance,
    GetPaymentProducts,
    CreateTransaction,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseWebhook => "parse_webhook",
            Self::GetPayment => "get_payment",
            Self::GetOrderEntity => "get_order_entity",
            Self::GetDeal => "get_deal",
            Self::CheckTransaction => "check_transaction",
            Self::ProcessBalance => "process_balance",
            Self::GetPaymentProducts => "get_payment_products",
            Self::CreateTransaction => "create_transaction",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`AppError`] tagged with the pipeline step that produced it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{step}: {error}")]
pub struct StepError {
    pub step: PipelineStep,
    pub error: AppError,
}

impl StepError {
    pub fn new(step: PipelineStep, error: impl Into<AppError>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }

    pub fn not_found(step: PipelineStep, message: impl Into<String>) -> Self {
        Self::new(step, AppError::NotFound(message.into()))
    }

    pub fn missing_field(step: PipelineStep, field: &str) -> Self {
        Self::new(step, ValidationError::MissingField(field.to_string()))
    }
}

/// Attaches a pipeline step to a fallible CRM result
pub trait AtStep<T> {
    fn at(self, step: PipelineStep) -> Result<T, StepError>;
}

impl<T, E: Into<AppError>> AtStep<T> for Result<T, E> {
    fn at(self, step: PipelineStep) -> Result<T, StepError> {
        self.map_err(|e| StepError::new(step, e))
    }
}
