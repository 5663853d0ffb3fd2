//! Pipeline outcomes and the JSON body returned to the webhook sender.

use serde::Serialize;
use utoipa::ToSchema;

use super::error::{AppError, PipelineStep, StepError, ValidationError};
use super::money::Money;
use super::pipeline::{BalanceUpdate, LineItemSyncReport};

/// Payment booked by this run
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecordedPayment {
    pub success: bool,
    pub already_exists: bool,
    pub payment_id: String,
    pub order_id: Option<String>,
    pub deal_id: String,
    pub contact_id: Option<String>,
    pub balance_id: String,
    pub account_number: String,
    #[schema(value_type = String, example = "1500.00")]
    pub amount: Money,
    #[schema(value_type = String, example = "0.00")]
    pub balance_old: Money,
    #[schema(value_type = String, example = "1500.00")]
    pub balance_new: Money,
    pub balance_created: bool,
    pub balance_comment_posted: bool,
    pub transaction_id: String,
    pub products_added: usize,
    pub products_failed: usize,
    pub products: LineItemSyncReport,
}

/// Payment whose transaction record already existed
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DuplicatePayment {
    pub success: bool,
    pub already_exists: bool,
    pub payment_id: String,
    pub order_id: Option<String>,
    pub deal_id: String,
    pub contact_id: Option<String>,
    pub account_number: String,
    #[schema(value_type = Option<String>, example = "1500.00")]
    pub amount: Option<Money>,
    pub transaction_id: String,
    pub message: String,
}

/// Successful pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Recorded(RecordedPayment),
    AlreadyRecorded(DuplicatePayment),
}

/// Failed pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFailure {
    pub payment_id: String,
    pub error: StepError,
    /// Balance change already applied before the failure
    pub balance: Option<BalanceUpdate>,
}

impl PipelineFailure {
    pub fn new(payment_id: &str, error: StepError) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            error,
            balance: None,
        }
    }

    #[must_use]
    pub fn with_balance(mut self, balance: BalanceUpdate) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn step(&self) -> PipelineStep {
        self.error.step
    }
}

/// Failure body returned to the webhook sender
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FailureReport {
    pub success: bool,
    pub payment_id: Option<String>,
    pub step: PipelineStep,
    #[schema(example = "api_error")]
    pub error_kind: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub balance_old: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub balance_new: Option<Money>,
}

impl From<PipelineFailure> for FailureReport {
    fn from(failure: PipelineFailure) -> Self {
        let StepError { step, error } = failure.error;
        Self {
            success: false,
            payment_id: Some(failure.payment_id),
            step,
            error_kind: error.kind().to_string(),
            error: error.to_string(),
            balance_id: failure.balance.as_ref().map(|b| b.balance_id.clone()),
            balance_old: failure.balance.as_ref().map(|b| b.old_balance),
            balance_new: failure.balance.as_ref().map(|b| b.new_balance),
        }
    }
}

/// Webhook response body; always sent with HTTP 200
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum WebhookResponse {
    Recorded(RecordedPayment),
    AlreadyRecorded(DuplicatePayment),
    Failed(FailureReport),
}

impl WebhookResponse {
    /// Response for a webhook body that did not carry a usable payment ID
    pub fn invalid_webhook(error: ValidationError) -> Self {
        let message = format!("Payment ID not found in webhook data ({})", error);
        Self::parse_failure(error, message)
    }

    /// Response for a webhook body that could not be read, e.g. one over the size limit
    pub fn unreadable_body(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let message = format!("Webhook body could not be read ({})", reason);
        Self::parse_failure(
            ValidationError::InvalidField {
                field: "body".to_string(),
                message: reason,
            },
            message,
        )
    }

    fn parse_failure(error: ValidationError, message: String) -> Self {
        let error = AppError::Validation(error);
        Self::Failed(FailureReport {
            success: false,
            payment_id: None,
            step: PipelineStep::ParseWebhook,
            error_kind: error.kind().to_string(),
            error: message,
            balance_id: None,
            balance_old: None,
            balance_new: None,
        })
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl From<Result<PipelineOutcome, PipelineFailure>> for WebhookResponse {
    fn from(result: Result<PipelineOutcome, PipelineFailure>) -> Self {
        match result {
            Ok(PipelineOutcome::Recorded(payment)) => Self::Recorded(payment),
            Ok(PipelineOutcome::AlreadyRecorded(payment)) => Self::AlreadyRecorded(payment),
            Err(failure) => Self::Failed(failure.into()),
        }
    }
}
