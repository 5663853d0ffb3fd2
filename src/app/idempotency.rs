//! Guards against booking the same invoice twice.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{AtStep, CrmGateway, PipelineStep, StepError, TransactionCheck};

pub struct TransactionIdempotencyGuard {
    gateway: Arc<dyn CrmGateway>,
}

impl TransactionIdempotencyGuard {
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>) -> Self {
        Self { gateway }
    }

    /// Look up a transaction whose title equals `natural_key`
    #[instrument(skip(self))]
    pub async fn check(&self, natural_key: &str) -> Result<TransactionCheck, StepError> {
        let existing = self
            .gateway
            .find_transactions(natural_key)
            .await
            .at(PipelineStep::CheckTransaction)?
            .into_iter()
            .find(|item| item.title.as_deref().is_none_or(|title| title == natural_key));

        Ok(match existing {
            Some(item) => {
                debug!(transaction_id = %item.id, "Transaction already recorded");
                TransactionCheck::Exists {
                    transaction_id: item.id,
                }
            }
            None => TransactionCheck::Absent,
        })
    }
}
