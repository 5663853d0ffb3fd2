//! Creates the transaction record for a payment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::line_items::ProductLineItemSync;
use crate::domain::{
    AtStep, BalanceUpdate, CrmError, CrmGateway, DealContext, NewTransaction, PaymentProducts,
    PaymentRecord, PipelineStep, RecordedTransaction, StepError,
};

pub struct TransactionRecorder {
    gateway: Arc<dyn CrmGateway>,
    line_items: Arc<ProductLineItemSync>,
    category_id: u32,
}

impl TransactionRecorder {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn CrmGateway>,
        line_items: Arc<ProductLineItemSync>,
        category_id: u32,
    ) -> Self {
        Self {
            gateway,
            line_items,
            category_id,
        }
    }

    /// Create the transaction linked to deal, balance and contact, then
    /// attach the payment's line items to it
    #[instrument(skip_all, fields(payment_id = %payment.id, balance_id = %balance.balance_id))]
    pub async fn record(
        &self,
        payment: &PaymentRecord,
        context: &DealContext,
        balance: &BalanceUpdate,
        products: &PaymentProducts,
        created_time: DateTime<Utc>,
    ) -> Result<RecordedTransaction, StepError> {
        let step = PipelineStep::CreateTransaction;
        let transaction = NewTransaction {
            title: payment.natural_key(),
            owner_id: context.owner_id.clone(),
            amount: payment.amount().unwrap_or(balance.payment_amount),
            created_time,
            category_id: self.category_id,
            deal_id: context.deal_id.clone(),
            balance_id: balance.balance_id.clone(),
            contact_id: context.contact_id.clone(),
        };

        let transaction_id = self
            .gateway
            .create_transaction(&transaction)
            .await
            .at(step)?
            .ok_or_else(|| {
                StepError::new(
                    step,
                    CrmError::InvalidResponse(
                        "Transaction ID not returned after creation".to_string(),
                    ),
                )
            })?;

        info!(transaction_id = %transaction_id, title = %transaction.title, "Transaction created");

        let line_items = self.line_items.attach(&transaction_id, products).await;
        Ok(RecordedTransaction {
            transaction_id,
            line_items,
        })
    }
}
