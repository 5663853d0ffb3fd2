//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::AppError;
use super::money::Money;
use super::response::WebhookResponse;
use super::types::{
    BalanceItem, Contact, Deal, NewBalance, NewProductRow, NewTransaction, OrderEntity,
    PaymentProduct, PaymentRecord, ProductRow, TransactionItem,
};

/// Typed operations against the CRM
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Check CRM reachability
    async fn health_check(&self) -> Result<(), AppError>;

    /// Payments with the given ID that were paid at or after `paid_since`
    async fn find_paid_payments(
        &self,
        payment_id: &str,
        paid_since: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, AppError>;

    /// Entity bindings of an order
    async fn find_order_entities(&self, order_id: &str) -> Result<Vec<OrderEntity>, AppError>;

    async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>, AppError>;

    async fn get_contact(&self, contact_id: &str) -> Result<Option<Contact>, AppError>;

    /// Client balance items linked to a contact
    async fn find_balances(&self, contact_id: &str) -> Result<Vec<BalanceItem>, AppError>;

    /// Overwrite a balance item's amount
    async fn update_balance(&self, balance_id: &str, opportunity: Money) -> Result<(), AppError>;

    /// Create a balance item, returning its ID if the CRM reported one
    async fn create_balance(&self, balance: &NewBalance) -> Result<Option<String>, AppError>;

    /// Append a comment to a balance item's timeline
    async fn add_balance_comment(&self, balance_id: &str, comment: &str) -> Result<(), AppError>;

    /// Transaction items whose title equals `title`
    async fn find_transactions(&self, title: &str) -> Result<Vec<TransactionItem>, AppError>;

    async fn create_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Option<String>, AppError>;

    /// Line items attached to a payment
    async fn list_payment_products(
        &self,
        payment_id: &str,
    ) -> Result<Vec<PaymentProduct>, AppError>;

    async fn get_product_row(&self, row_id: &str) -> Result<Option<ProductRow>, AppError>;

    async fn add_product_row(&self, row: &NewProductRow) -> Result<Option<String>, AppError>;
}

/// Append-only record of webhook traffic
#[async_trait]
pub trait WebhookJournal: Send + Sync {
    /// Record a raw inbound payload exactly as received
    async fn record_payload(&self, raw: &str) -> Result<(), AppError>;

    /// Record the response sent for a webhook delivery
    async fn record_outcome(&self, outcome: &WebhookResponse) -> Result<(), AppError>;
}
