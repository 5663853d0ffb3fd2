//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod money;
pub mod pipeline;
pub mod response;
pub mod traits;
pub mod types;

pub use error::{AppError, AtStep, ConfigError, CrmError, PipelineStep, StepError, ValidationError};
pub use money::Money;
pub use pipeline::{
    AddedLineItem, BalanceUpdate, DealContext, LineItem, LineItemError, LineItemSyncReport,
    PaymentProducts, RecordedTransaction, TransactionCheck, VerifiedPayment,
};
pub use response::{
    DuplicatePayment, FailureReport, PipelineFailure, PipelineOutcome, RecordedPayment,
    WebhookResponse,
};
pub use traits::{CrmGateway, WebhookJournal};
pub use types::{
    BalanceItem, Contact, Deal, HealthResponse, HealthStatus, NewBalance, NewProductRow,
    NewTransaction, OrderEntity, PaymentProduct, PaymentRecord, PaymentWebhook, ProductRow,
    TransactionItem, format_crm_timestamp,
};
