//! Confirms that a payment was paid recently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::domain::{AtStep, CrmGateway, PipelineStep, StepError, VerifiedPayment};

pub struct PaymentVerifier {
    gateway: Arc<dyn CrmGateway>,
    window: Duration,
}

impl PaymentVerifier {
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, window: Duration) -> Self {
        Self { gateway, window }
    }

    pub async fn verify(&self, payment_id: &str) -> Result<VerifiedPayment, StepError> {
        self.verify_as_of(payment_id, Utc::now()).await
    }

    /// Look up the payment as paid within the window ending at `now`.
    ///
    /// The CRM-side filter is the only window check; an empty result means
    /// the payment is unknown, unpaid, or too old.
    #[instrument(skip(self, now))]
    pub async fn verify_as_of(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedPayment, StepError> {
        let paid_since = now - self.window;
        let payments = self
            .gateway
            .find_paid_payments(payment_id, paid_since)
            .await
            .at(PipelineStep::GetPayment)?;

        let Some(record) = payments.into_iter().next() else {
            warn!(%paid_since, "No paid payment inside the window");
            return Err(StepError::not_found(
                PipelineStep::GetPayment,
                format!(
                    "Payment {} not found, not paid, or paid before {}",
                    payment_id,
                    paid_since.format("%Y-%m-%d %H:%M:%S")
                ),
            ));
        };

        info!(order_id = ?record.order_id, "Payment verified");
        Ok(VerifiedPayment {
            date_paid: record.date_paid,
            record,
            paid_since,
        })
    }
}
