//! Values passed between the stages of the payment pipeline.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::money::Money;
use super::types::{Deal, PaymentRecord};

/// A payment confirmed as paid inside the verification window
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub record: PaymentRecord,
    pub date_paid: Option<DateTime<FixedOffset>>,
    /// Lower bound the payment was checked against
    pub paid_since: DateTime<Utc>,
}

/// Identity and attribution data resolved from the payment's deal
#[derive(Debug, Clone, PartialEq)]
pub struct DealContext {
    pub deal_id: String,
    /// User the new CRM records are attributed to
    pub owner_id: String,
    pub contact_id: Option<String>,
    pub contact_name: String,
    pub deal: Deal,
}

impl DealContext {
    pub fn deal_title(&self) -> Option<&str> {
        self.deal.title.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Result of looking up a transaction by natural key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCheck {
    Exists { transaction_id: String },
    Absent,
}

/// Balance change applied for one payment
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BalanceUpdate {
    pub balance_id: String,
    pub title: String,
    #[schema(value_type = String, example = "10.10")]
    pub old_balance: Money,
    #[schema(value_type = String, example = "10.30")]
    pub new_balance: Money,
    #[schema(value_type = String, example = "0.20")]
    pub payment_amount: Money,
    /// Whether the balance record was created by this run
    pub created: bool,
    pub comment: String,
    /// Whether the audit comment reached the balance timeline
    pub comment_posted: bool,
}

/// A payment line item resolved (or not) to product detail
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LineItem {
    pub payment_product_id: Option<String>,
    pub row_id: String,
    pub quantity: f64,
    pub product_id: Option<String>,
    pub product_name: String,
    #[schema(value_type = String)]
    pub price: Money,
    #[schema(value_type = String)]
    pub total: Money,
    /// Why product detail could not be fetched
    pub error: Option<String>,
}

/// Line items fetched for a payment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentProducts {
    pub items: Vec<LineItem>,
    /// Set when the line item list itself could not be fetched
    pub fetch_error: Option<String>,
}

impl PaymentProducts {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            fetch_error: Some(reason.into()),
        }
    }

    /// Sum of all line totals
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(|item| item.total).sum()
    }
}

/// Product row created under a transaction
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AddedLineItem {
    pub product_row_id: Option<String>,
    pub product_name: String,
    pub quantity: f64,
    #[schema(value_type = String)]
    pub price: Money,
}

/// Line item that was not created
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LineItemError {
    pub product_name: String,
    pub error: String,
}

/// Outcome of attaching line items to a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct LineItemSyncReport {
    /// No create call failed
    pub success: bool,
    pub products_added: usize,
    pub products_failed: usize,
    pub added_products: Vec<AddedLineItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineItemError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

/// Transaction created for a payment
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransaction {
    pub transaction_id: String,
    pub line_items: LineItemSyncReport,
}
