//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::{
    AppError, BalanceItem, Contact, CrmError, CrmGateway, Deal, Money, NewBalance, NewProductRow,
    NewTransaction, OrderEntity, PaymentProduct, PaymentRecord, ProductRow, TransactionItem,
    WebhookJournal, WebhookResponse,
};

/// Operations of [`CrmGateway`], used for call logs and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmOperation {
    HealthCheck,
    FindPaidPayments,
    FindOrderEntities,
    GetDeal,
    GetContact,
    FindBalances,
    UpdateBalance,
    CreateBalance,
    AddBalanceComment,
    FindTransactions,
    CreateTransaction,
    ListPaymentProducts,
    GetProductRow,
    AddProductRow,
}

impl CrmOperation {
    /// Whether the operation changes CRM state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::UpdateBalance
                | Self::CreateBalance
                | Self::AddBalanceComment
                | Self::CreateTransaction
                | Self::AddProductRow
        )
    }
}

/// Balance item held by [`MockCrmGateway`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBalance {
    pub id: String,
    pub contact_id: String,
    pub title: String,
    pub opportunity: Money,
}

/// Transaction item held by [`MockCrmGateway`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: String,
    pub fields: NewTransaction,
}

#[derive(Default)]
struct MockCrmState {
    payments: Vec<PaymentRecord>,
    order_entities: HashMap<String, Vec<OrderEntity>>,
    deals: HashMap<String, Deal>,
    contacts: HashMap<String, Contact>,
    balances: Vec<StoredBalance>,
    transactions: Vec<StoredTransaction>,
    payment_products: HashMap<String, Vec<PaymentProduct>>,
    product_rows: HashMap<String, ProductRow>,
    added_rows: Vec<NewProductRow>,
    comments: Vec<(String, String)>,
    failures: HashMap<CrmOperation, AppError>,
    /// Product names whose row creation is rejected
    rejected_products: Vec<String>,
    calls: Vec<CrmOperation>,
    next_id: u64,
}

impl MockCrmState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

/// In-memory CRM for testing.
///
/// Filters behave like the real CRM: paid payments are matched against the
/// `paid_since` bound, balances by contact and transactions by title.
pub struct MockCrmGateway {
    state: Mutex<MockCrmState>,
    is_healthy: AtomicBool,
    omit_created_ids: AtomicBool,
    yield_on_lookups: AtomicBool,
}

impl MockCrmGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockCrmState {
                next_id: 1000,
                ..Default::default()
            }),
            is_healthy: AtomicBool::new(true),
            omit_created_ids: AtomicBool::new(false),
            yield_on_lookups: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_payment(self, payment: PaymentRecord) -> Self {
        self.state.lock().unwrap().payments.push(payment);
        self
    }

    #[must_use]
    pub fn with_order_entity(self, order_id: &str, deal_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .order_entities
            .entry(order_id.to_string())
            .or_default()
            .push(OrderEntity {
                order_id: Some(order_id.to_string()),
                owner_id: Some(deal_id.to_string()),
            });
        self
    }

    /// Register an order whose entity list is present but lacks a deal link
    #[must_use]
    pub fn with_unbound_order(self, order_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .order_entities
            .entry(order_id.to_string())
            .or_default()
            .push(OrderEntity {
                order_id: Some(order_id.to_string()),
                owner_id: None,
            });
        self
    }

    #[must_use]
    pub fn with_deal(self, deal_id: &str, deal: Deal) -> Self {
        self.state
            .lock()
            .unwrap()
            .deals
            .insert(deal_id.to_string(), deal);
        self
    }

    #[must_use]
    pub fn with_contact(self, contact_id: &str, contact: Contact) -> Self {
        self.state
            .lock()
            .unwrap()
            .contacts
            .insert(contact_id.to_string(), contact);
        self
    }

    #[must_use]
    pub fn with_balance(self, contact_id: &str, balance_id: &str, title: &str, amount: Money) -> Self {
        self.state.lock().unwrap().balances.push(StoredBalance {
            id: balance_id.to_string(),
            contact_id: contact_id.to_string(),
            title: title.to_string(),
            opportunity: amount,
        });
        self
    }

    #[must_use]
    pub fn with_payment_products(self, payment_id: &str, products: Vec<PaymentProduct>) -> Self {
        self.state
            .lock()
            .unwrap()
            .payment_products
            .insert(payment_id.to_string(), products);
        self
    }

    #[must_use]
    pub fn with_product_row(self, row_id: &str, row: ProductRow) -> Self {
        self.state
            .lock()
            .unwrap()
            .product_rows
            .insert(row_id.to_string(), row);
        self
    }

    /// Make every call of `operation` fail with `error`
    #[must_use]
    pub fn failing_on(self, operation: CrmOperation, error: impl Into<AppError>) -> Self {
        self.fail_on(operation, error);
        self
    }

    /// Reject product row creation for the named product
    #[must_use]
    pub fn rejecting_product(self, product_name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_products
            .push(product_name.to_string());
        self
    }

    pub fn fail_on(&self, operation: CrmOperation, error: impl Into<AppError>) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation, error.into());
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Yield to the scheduler inside balance and transaction lookups, so
    /// concurrent runs interleave between a lookup and the write that follows
    pub fn set_yield_on_lookups(&self, enabled: bool) {
        self.yield_on_lookups.store(enabled, Ordering::Relaxed);
    }

    /// Create calls succeed but report no identifier
    pub fn set_omit_created_ids(&self, omit: bool) {
        self.omit_created_ids.store(omit, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<CrmOperation> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn call_count(&self, operation: CrmOperation) -> usize {
        self.calls().iter().filter(|op| **op == operation).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|op| op.is_mutation()).count()
    }

    pub fn balances(&self) -> Vec<StoredBalance> {
        self.state.lock().unwrap().balances.clone()
    }

    pub fn transactions(&self) -> Vec<StoredTransaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn added_product_rows(&self) -> Vec<NewProductRow> {
        self.state.lock().unwrap().added_rows.clone()
    }

    /// Timeline comments as `(balance_id, comment)` pairs
    pub fn comments(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    /// Record the call and return the injected failure, if any
    fn enter(&self, operation: CrmOperation) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        match state.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn lookup_pause(&self) {
        if self.yield_on_lookups.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
    }

    fn created_id(&self, id: String) -> Option<String> {
        (!self.omit_created_ids.load(Ordering::Relaxed)).then_some(id)
    }
}

impl Default for MockCrmGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrmGateway for MockCrmGateway {
    async fn health_check(&self) -> Result<(), AppError> {
        self.enter(CrmOperation::HealthCheck)?;
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Crm(CrmError::Network(
                "Could not resolve host".to_string(),
            )));
        }
        Ok(())
    }

    async fn find_paid_payments(
        &self,
        payment_id: &str,
        paid_since: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        self.enter(CrmOperation::FindPaidPayments)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .filter(|p| p.id == payment_id && p.paid)
            .filter(|p| p.date_paid.is_some_and(|paid| paid.with_timezone(&Utc) >= paid_since))
            .cloned()
            .collect())
    }

    async fn find_order_entities(&self, order_id: &str) -> Result<Vec<OrderEntity>, AppError> {
        self.enter(CrmOperation::FindOrderEntities)?;
        let state = self.state.lock().unwrap();
        Ok(state.order_entities.get(order_id).cloned().unwrap_or_default())
    }

    async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>, AppError> {
        self.enter(CrmOperation::GetDeal)?;
        Ok(self.state.lock().unwrap().deals.get(deal_id).cloned())
    }

    async fn get_contact(&self, contact_id: &str) -> Result<Option<Contact>, AppError> {
        self.enter(CrmOperation::GetContact)?;
        Ok(self.state.lock().unwrap().contacts.get(contact_id).cloned())
    }

    async fn find_balances(&self, contact_id: &str) -> Result<Vec<BalanceItem>, AppError> {
        self.enter(CrmOperation::FindBalances)?;
        self.lookup_pause().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .balances
            .iter()
            .filter(|b| b.contact_id == contact_id)
            .map(|b| BalanceItem {
                id: b.id.clone(),
                title: Some(b.title.clone()),
                opportunity: Some(b.opportunity),
            })
            .collect())
    }

    async fn update_balance(&self, balance_id: &str, opportunity: Money) -> Result<(), AppError> {
        self.enter(CrmOperation::UpdateBalance)?;
        let mut state = self.state.lock().unwrap();
        let balance = state
            .balances
            .iter_mut()
            .find(|b| b.id == balance_id)
            .ok_or_else(|| AppError::Crm(CrmError::Api {
                code: "NOT_FOUND".to_string(),
                message: format!("Item {} not found", balance_id),
            }))?;
        balance.opportunity = opportunity;
        Ok(())
    }

    async fn create_balance(&self, balance: &NewBalance) -> Result<Option<String>, AppError> {
        self.enter(CrmOperation::CreateBalance)?;
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.balances.push(StoredBalance {
            id: id.clone(),
            contact_id: balance.contact_id.clone(),
            title: balance.title.clone(),
            opportunity: balance.opportunity,
        });
        drop(state);
        Ok(self.created_id(id))
    }

    async fn add_balance_comment(&self, balance_id: &str, comment: &str) -> Result<(), AppError> {
        self.enter(CrmOperation::AddBalanceComment)?;
        self.state
            .lock()
            .unwrap()
            .comments
            .push((balance_id.to_string(), comment.to_string()));
        Ok(())
    }

    async fn find_transactions(&self, title: &str) -> Result<Vec<TransactionItem>, AppError> {
        self.enter(CrmOperation::FindTransactions)?;
        self.lookup_pause().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.fields.title == title)
            .map(|t| TransactionItem {
                id: t.id.clone(),
                title: Some(t.fields.title.clone()),
            })
            .collect())
    }

    async fn create_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Option<String>, AppError> {
        self.enter(CrmOperation::CreateTransaction)?;
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.transactions.push(StoredTransaction {
            id: id.clone(),
            fields: transaction.clone(),
        });
        drop(state);
        Ok(self.created_id(id))
    }

    async fn list_payment_products(
        &self,
        payment_id: &str,
    ) -> Result<Vec<PaymentProduct>, AppError> {
        self.enter(CrmOperation::ListPaymentProducts)?;
        let state = self.state.lock().unwrap();
        Ok(state.payment_products.get(payment_id).cloned().unwrap_or_default())
    }

    async fn get_product_row(&self, row_id: &str) -> Result<Option<ProductRow>, AppError> {
        self.enter(CrmOperation::GetProductRow)?;
        Ok(self.state.lock().unwrap().product_rows.get(row_id).cloned())
    }

    async fn add_product_row(&self, row: &NewProductRow) -> Result<Option<String>, AppError> {
        self.enter(CrmOperation::AddProductRow)?;
        let mut state = self.state.lock().unwrap();
        if state.rejected_products.contains(&row.product_name) {
            return Err(AppError::Crm(CrmError::Api {
                code: "ERROR_CORE".to_string(),
                message: format!("Cannot add product {}", row.product_name),
            }));
        }
        let id = state.allocate_id();
        state.added_rows.push(row.clone());
        drop(state);
        Ok(self.created_id(id))
    }
}

/// In-memory webhook journal for testing
pub struct MockJournal {
    payloads: Mutex<Vec<String>>,
    outcomes: Mutex<Vec<WebhookResponse>>,
    should_fail: AtomicBool,
}

impl MockJournal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Journal whose writes all fail
    #[must_use]
    pub fn failing() -> Self {
        let journal = Self::new();
        journal.should_fail.store(true, Ordering::Relaxed);
        journal
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<WebhookResponse> {
        self.outcomes.lock().unwrap().clone()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(AppError::Internal("Mock journal failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MockJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookJournal for MockJournal {
    async fn record_payload(&self, raw: &str) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.payloads.lock().unwrap().push(raw.to_string());
        Ok(())
    }

    async fn record_outcome(&self, outcome: &WebhookResponse) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}
