//! Bitrix24 implementation of [`CrmGateway`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::instrument;

use super::client::CrmClient;
use crate::domain::{
    AppError, BalanceItem, Contact, CrmError, CrmGateway, Deal, Money, NewBalance, NewProductRow,
    NewTransaction, OrderEntity, PaymentProduct, PaymentRecord, ProductRow, TransactionItem,
    format_crm_timestamp,
};

/// Smart-process entity types holding balances and transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrmSchema {
    pub balance_entity_type_id: u32,
    pub transaction_entity_type_id: u32,
}

impl Default for CrmSchema {
    fn default() -> Self {
        Self {
            balance_entity_type_id: 1124,
            transaction_entity_type_id: 1128,
        }
    }
}

impl CrmSchema {
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let balance_entity_type_id = env::var("BALANCE_ENTITY_TYPE_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.balance_entity_type_id);

        let transaction_entity_type_id = env::var("TRANSACTION_ENTITY_TYPE_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.transaction_entity_type_id);

        Self {
            balance_entity_type_id,
            transaction_entity_type_id,
        }
    }

    /// Timeline entity type of balance items
    fn balance_timeline_type(&self) -> String {
        format!("dynamic_{}", self.balance_entity_type_id)
    }

    /// Item field linking a transaction to its parent balance
    fn balance_parent_field(&self) -> String {
        format!("parentId{}", self.balance_entity_type_id)
    }
}

/// [`CrmGateway`] speaking the Bitrix24 REST method set
pub struct Bitrix24Gateway {
    client: CrmClient,
    schema: CrmSchema,
}

impl Bitrix24Gateway {
    pub fn new(client: CrmClient, schema: CrmSchema) -> Self {
        Self { client, schema }
    }
}

/// Deserialize the value at `pointer`; a missing or null value is `None`
fn extract<T: DeserializeOwned>(result: &Value, pointer: &str) -> Result<Option<T>, CrmError> {
    match result.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| CrmError::InvalidResponse(format!("{}: {}", pointer, e))),
    }
}

fn extract_list<T: DeserializeOwned>(result: &Value, pointer: &str) -> Result<Vec<T>, CrmError> {
    match result.pointer(pointer) {
        // An empty list is sometimes sent as `false` or `{}`
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(Vec::new()),
        Some(Value::Object(map)) if map.is_empty() => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| CrmError::InvalidResponse(format!("{}: {}", pointer, e))),
    }
}

/// First non-empty identifier among `pointers`
fn extract_id(result: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| {
        let id = match result.pointer(pointer)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return None,
        };
        (!id.is_empty() && id != "0").then_some(id)
    })
}

#[async_trait]
impl CrmGateway for Bitrix24Gateway {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client.call_result("server.time", &json!({})).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_paid_payments(
        &self,
        payment_id: &str,
        paid_since: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let params = json!({
            "filter": {
                "id": payment_id,
                "paid": "Y",
                "!datePaid": false,
                ">=datePaid": format_crm_timestamp(paid_since),
            },
            "select": ["*"],
        });
        let result = self.client.call_result("sale.payment.list", &params).await?;
        Ok(extract_list(&result, "/payments")?)
    }

    #[instrument(skip(self))]
    async fn find_order_entities(&self, order_id: &str) -> Result<Vec<OrderEntity>, AppError> {
        let params = json!({ "filter": { "orderId": order_id } });
        let result = self.client.call_result("crm.orderentity.list", &params).await?;
        Ok(extract_list(&result, "/orderEntity")?)
    }

    #[instrument(skip(self))]
    async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>, AppError> {
        let result = self
            .client
            .call_result("crm.deal.get", &json!({ "id": deal_id }))
            .await?;
        Ok(extract(&result, "")?)
    }

    #[instrument(skip(self))]
    async fn get_contact(&self, contact_id: &str) -> Result<Option<Contact>, AppError> {
        let result = self
            .client
            .call_result("crm.contact.get", &json!({ "id": contact_id }))
            .await?;
        Ok(extract(&result, "")?)
    }

    #[instrument(skip(self))]
    async fn find_balances(&self, contact_id: &str) -> Result<Vec<BalanceItem>, AppError> {
        let params = json!({
            "entityTypeId": self.schema.balance_entity_type_id,
            "filter": { "contactId": contact_id },
            "select": ["id", "title", "opportunity"],
        });
        let result = self.client.call_result("crm.item.list", &params).await?;
        Ok(extract_list(&result, "/items")?)
    }

    #[instrument(skip(self))]
    async fn update_balance(&self, balance_id: &str, opportunity: Money) -> Result<(), AppError> {
        let params = json!({
            "entityTypeId": self.schema.balance_entity_type_id,
            "id": balance_id,
            "fields": { "opportunity": opportunity.to_string() },
        });
        self.client.call_result("crm.item.update", &params).await?;
        Ok(())
    }

    #[instrument(skip(self, balance), fields(contact_id = %balance.contact_id))]
    async fn create_balance(&self, balance: &NewBalance) -> Result<Option<String>, AppError> {
        let params = json!({
            "entityTypeId": self.schema.balance_entity_type_id,
            "fields": {
                "title": balance.title,
                "createdBy": balance.owner_id,
                "updatedBy": balance.owner_id,
                "movedBy": balance.owner_id,
                "assignedById": balance.owner_id,
                "opportunity": balance.opportunity.to_string(),
                "contactIds": [balance.contact_id],
            },
        });
        let result = self.client.call_result("crm.item.add", &params).await?;
        Ok(extract_id(&result, &["/item/id"]))
    }

    #[instrument(skip(self, comment))]
    async fn add_balance_comment(&self, balance_id: &str, comment: &str) -> Result<(), AppError> {
        let params = json!({
            "fields": {
                "ENTITY_TYPE": self.schema.balance_timeline_type(),
                "ENTITY_ID": balance_id,
                "COMMENT": comment,
            },
        });
        self.client
            .call_result("crm.timeline.comment.add", &params)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_transactions(&self, title: &str) -> Result<Vec<TransactionItem>, AppError> {
        let params = json!({
            "entityTypeId": self.schema.transaction_entity_type_id,
            "filter": { "title": title },
            "select": ["id", "title"],
        });
        let result = self.client.call_result("crm.item.list", &params).await?;
        Ok(extract_list(&result, "/items")?)
    }

    #[instrument(skip(self, transaction), fields(title = %transaction.title))]
    async fn create_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Option<String>, AppError> {
        let owner = &transaction.owner_id;
        let mut fields = json!({
            "title": transaction.title,
            "createdBy": owner,
            "updatedBy": owner,
            "movedBy": owner,
            "assignedById": owner,
            "lastActivityBy": owner,
            "opportunity": transaction.amount.to_string(),
            "createdTime": format_crm_timestamp(transaction.created_time),
            "categoryId": transaction.category_id,
            "parentId2": transaction.deal_id,
        });
        fields[self.schema.balance_parent_field()] = json!(transaction.balance_id);
        if let Some(contact_id) = &transaction.contact_id {
            fields["contactIds"] = json!([contact_id]);
        }

        let params = json!({
            "entityTypeId": self.schema.transaction_entity_type_id,
            "fields": fields,
        });
        let result = self.client.call_result("crm.item.add", &params).await?;
        Ok(extract_id(&result, &["/item/id"]))
    }

    #[instrument(skip(self))]
    async fn list_payment_products(
        &self,
        payment_id: &str,
    ) -> Result<Vec<PaymentProduct>, AppError> {
        let result = self
            .client
            .call_result(
                "crm.item.payment.product.list",
                &json!({ "paymentId": payment_id }),
            )
            .await?;
        Ok(extract_list(&result, "")?)
    }

    #[instrument(skip(self))]
    async fn get_product_row(&self, row_id: &str) -> Result<Option<ProductRow>, AppError> {
        let result = self
            .client
            .call_result("crm.item.productrow.get", &json!({ "id": row_id }))
            .await?;
        Ok(extract(&result, "/productRow")?)
    }

    #[instrument(skip(self, row), fields(owner_id = %row.owner_id))]
    async fn add_product_row(&self, row: &NewProductRow) -> Result<Option<String>, AppError> {
        let params = json!({
            "fields": {
                "ownerId": row.owner_id,
                "ownerType": row.owner_type,
                "productId": row.product_id,
                "productName": row.product_name,
                "price": row.price.to_string(),
                "quantity": row.quantity,
                "taxIncluded": if row.tax_included { "Y" } else { "N" },
                "measureCode": row.measure_code,
            },
        });
        let result = self
            .client
            .call_result("crm.item.productrow.add", &params)
            .await?;
        Ok(extract_id(&result, &["/productRow/id", "/item/id"]))
    }
}
