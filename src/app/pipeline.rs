//! Payment webhook orchestration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::balance_ledger::BalanceLedger;
use super::deal_resolver::DealResolver;
use super::idempotency::TransactionIdempotencyGuard;
use super::key_lock::KeyedLock;
use super::line_items::ProductLineItemSync;
use super::payment_verifier::PaymentVerifier;
use super::transaction_recorder::TransactionRecorder;
use crate::domain::{
    ConfigError, CrmGateway, DuplicatePayment, PaymentProducts, PipelineFailure, PipelineOutcome,
    RecordedPayment, StepError, TransactionCheck,
};

/// Business settings of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct PipelineConfig {
    /// How far back a payment may have been paid
    #[validate(range(min = 1, max = 8760))]
    pub payment_window_hours: i64,
    /// Owner for records created from deals without an assignee
    #[validate(length(min = 1))]
    pub default_owner_id: String,
    /// Display name used when the contact has no usable name
    #[validate(length(min = 1))]
    pub contact_placeholder: String,
    #[validate(range(min = 1))]
    pub transaction_category_id: u32,
    #[validate(length(min = 1))]
    pub line_item_owner_type: String,
    #[validate(range(min = 1))]
    pub line_item_measure_code: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            payment_window_hours: 24,
            default_owner_id: "1".to_string(),
            contact_placeholder: "Client".to_string(),
            transaction_category_id: 33,
            line_item_owner_type: "T468".to_string(),
            line_item_measure_code: 796,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        use std::env;

        let defaults = Self::default();

        let payment_window_hours = env::var("PAYMENT_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.payment_window_hours);
        let default_owner_id = env::var("DEFAULT_OWNER_ID").unwrap_or(defaults.default_owner_id);
        let contact_placeholder =
            env::var("CONTACT_PLACEHOLDER").unwrap_or(defaults.contact_placeholder);
        let transaction_category_id = env::var("TRANSACTION_CATEGORY_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.transaction_category_id);
        let line_item_owner_type =
            env::var("LINE_ITEM_OWNER_TYPE").unwrap_or(defaults.line_item_owner_type);
        let line_item_measure_code = env::var("LINE_ITEM_MEASURE_CODE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.line_item_measure_code);

        let config = Self {
            payment_window_hours,
            default_owner_id,
            contact_placeholder,
            transaction_category_id,
            line_item_owner_type,
            line_item_measure_code,
        };
        config.validate().map_err(|e| ConfigError::InvalidValue {
            key: "pipeline".to_string(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    pub fn payment_window(&self) -> Duration {
        Duration::hours(self.payment_window_hours)
    }
}

/// Runs a paid-payment webhook through verification, resolution, the
/// idempotency check, the balance credit and transaction recording
pub struct PaymentPipeline {
    verifier: PaymentVerifier,
    resolver: DealResolver,
    guard: TransactionIdempotencyGuard,
    ledger: BalanceLedger,
    line_items: Arc<ProductLineItemSync>,
    recorder: TransactionRecorder,
    in_flight: KeyedLock,
}

impl PaymentPipeline {
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, config: &PipelineConfig) -> Self {
        let line_items = Arc::new(ProductLineItemSync::new(
            Arc::clone(&gateway),
            config.line_item_owner_type.clone(),
            config.line_item_measure_code,
        ));
        Self {
            verifier: PaymentVerifier::new(Arc::clone(&gateway), config.payment_window()),
            resolver: DealResolver::new(
                Arc::clone(&gateway),
                config.default_owner_id.clone(),
                config.contact_placeholder.clone(),
            ),
            guard: TransactionIdempotencyGuard::new(Arc::clone(&gateway)),
            ledger: BalanceLedger::new(Arc::clone(&gateway)),
            recorder: TransactionRecorder::new(
                gateway,
                Arc::clone(&line_items),
                config.transaction_category_id,
            ),
            line_items,
            in_flight: KeyedLock::new(),
        }
    }

    pub async fn process(&self, payment_id: &str) -> Result<PipelineOutcome, PipelineFailure> {
        self.process_at(payment_id, Utc::now()).await
    }

    /// Process a payment as if the current time were `now`.
    ///
    /// Runs for the same payment are serialized, so a concurrent duplicate
    /// delivery observes the transaction created by the first run.
    #[instrument(skip(self, now), fields(run_id = %Uuid::new_v4()))]
    pub async fn process_at(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let fail = |error: StepError| PipelineFailure::new(payment_id, error);
        let _in_flight = self.in_flight.acquire(payment_id).await;

        let verified = self.verifier.verify_as_of(payment_id, now).await.map_err(fail)?;
        let payment = &verified.record;

        let context = self.resolver.resolve(payment).await.map_err(fail)?;

        let natural_key = payment.natural_key();
        if let TransactionCheck::Exists { transaction_id } =
            self.guard.check(&natural_key).await.map_err(fail)?
        {
            info!(transaction_id = %transaction_id, account_number = %natural_key, "Payment already recorded");
            return Ok(PipelineOutcome::AlreadyRecorded(DuplicatePayment {
                success: true,
                already_exists: true,
                payment_id: payment_id.to_string(),
                order_id: payment.order_id.clone(),
                deal_id: context.deal_id,
                contact_id: context.contact_id,
                message: format!("Transaction {} already exists", natural_key),
                account_number: natural_key,
                amount: payment.amount(),
                transaction_id,
            }));
        }

        let balance = self.ledger.apply(payment, &context).await.map_err(fail)?;

        let products = self
            .line_items
            .fetch(payment_id)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Line items unavailable, recording transaction without them");
                PaymentProducts::unavailable(e.error.to_string())
            });

        let recorded = self
            .recorder
            .record(payment, &context, &balance, &products, now)
            .await
            .map_err(|e| fail(e).with_balance(balance.clone()))?;

        info!(
            transaction_id = %recorded.transaction_id,
            balance_id = %balance.balance_id,
            products_added = recorded.line_items.products_added,
            "Payment recorded"
        );

        Ok(PipelineOutcome::Recorded(RecordedPayment {
            success: true,
            already_exists: false,
            payment_id: payment_id.to_string(),
            order_id: payment.order_id.clone(),
            deal_id: context.deal_id,
            contact_id: context.contact_id,
            balance_id: balance.balance_id,
            account_number: natural_key,
            amount: balance.payment_amount,
            balance_old: balance.old_balance,
            balance_new: balance.new_balance,
            balance_created: balance.created,
            balance_comment_posted: balance.comment_posted,
            transaction_id: recorded.transaction_id,
            products_added: recorded.line_items.products_added,
            products_failed: recorded.line_items.products_failed,
            products: recorded.line_items,
        }))
    }
}
