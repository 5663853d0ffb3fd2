//! CRM record types, write payloads and webhook input.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

use super::error::ValidationError;
use super::money::{self, Money};

/// Form key carrying the payment identifier in the CRM webhook payload
pub const PAYMENT_ID_FORM_KEY: &str = "data[FIELDS][ID]";

/// Format an instant the way the CRM expects timestamps in filters and fields
pub fn format_crm_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

fn normalize_id(value: Value) -> Option<String> {
    let id = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    // The CRM reports "0" for unset links
    if id.is_empty() || id == "0" {
        None
    } else {
        Some(id)
    }
}

/// Identifier sent as a number or a string; `""` and `"0"` mean absent
pub fn deserialize_optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(normalize_id(Value::deserialize(deserializer)?))
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    normalize_id(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("missing identifier"))
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.as_str(), "Y" | "y" | "1" | "true"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    })
}

fn deserialize_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_f64().unwrap_or_default()),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid quantity: {}", s))),
        _ => Ok(0.0),
    }
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s.trim())
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", s, e))),
        _ => Ok(None),
    }
}

/// Payment as returned by `sale.payment.list`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub paid: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub date_paid: Option<DateTime<FixedOffset>>,
    /// Raw payment sum
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    pub sum: Option<Money>,
    /// Sum as processed by the payment system
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    pub ps_sum: Option<Money>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl PaymentRecord {
    /// Payment amount, preferring the processed sum over the raw sum
    pub fn amount(&self) -> Option<Money> {
        self.ps_sum.or(self.sum)
    }

    /// Invoice number identifying the transaction record for this payment
    pub fn natural_key(&self) -> String {
        match self.account_number.as_deref().map(str::trim) {
            Some(number) if !number.is_empty() => number.to_string(),
            _ => format!("Transaction {}", self.id),
        }
    }
}

/// Order to CRM entity binding from `crm.orderentity.list`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntity {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub order_id: Option<String>,
    /// Identifier of the deal owning the order
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub owner_id: Option<String>,
}

/// Deal as returned by `crm.deal.get`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Deal {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub contact_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub assigned_by_id: Option<String>,
    /// Remaining deal fields as sent by the CRM
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Contact as returned by `crm.contact.get`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Contact {
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub second_name: Option<String>,
}

/// Client balance item from `crm.item.list`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BalanceItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    pub opportunity: Option<Money>,
}

/// Transaction item from `crm.item.list`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TransactionItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Line item attached to a payment (`crm.item.payment.product.list`)
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProduct {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub row_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: f64,
}

/// Product row detail from `crm.item.productrow.get`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRow {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    pub price: Option<Money>,
}

/// Fields for a new client balance item
#[derive(Debug, Clone, PartialEq)]
pub struct NewBalance {
    pub title: String,
    pub owner_id: String,
    pub opportunity: Money,
    pub contact_id: String,
}

/// Fields for a new transaction item
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Natural key (invoice number)
    pub title: String,
    pub owner_id: String,
    pub amount: Money,
    pub created_time: DateTime<Utc>,
    pub category_id: u32,
    pub deal_id: String,
    pub balance_id: String,
    pub contact_id: Option<String>,
}

/// Fields for a product row under a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NewProductRow {
    /// Transaction the row belongs to
    pub owner_id: String,
    pub owner_type: String,
    pub product_id: Option<String>,
    pub product_name: String,
    pub price: Money,
    pub quantity: f64,
    pub tax_included: bool,
    pub measure_code: u32,
}

/// Parsed payment webhook
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct PaymentWebhook {
    #[validate(length(min = 1, message = "Payment ID is required"))]
    pub payment_id: String,
}

impl PaymentWebhook {
    /// Extract the payment identifier from a URL-encoded webhook body
    pub fn from_form(body: &str) -> Result<Self, ValidationError> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(body).map_err(|e| ValidationError::InvalidField {
                field: "body".to_string(),
                message: e.to_string(),
            })?;

        let payment_id = pairs
            .into_iter()
            .find(|(key, _)| key == PAYMENT_ID_FORM_KEY)
            .and_then(|(_, value)| normalize_id(Value::String(value)))
            .ok_or_else(|| ValidationError::MissingField(PAYMENT_ID_FORM_KEY.to_string()))?;

        let webhook = Self { payment_id };
        webhook
            .validate()
            .map_err(|e| ValidationError::InvalidField {
                field: PAYMENT_ID_FORM_KEY.to_string(),
                message: e.to_string(),
            })?;
        Ok(webhook)
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// CRM reachability
    pub crm: HealthStatus,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(crm: HealthStatus) -> Self {
        Self {
            status: crm,
            crm,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_payment_record_from_crm_json() {
        let payment: PaymentRecord = serde_json::from_value(json!({
            "id": 42,
            "orderId": "17",
            "paid": "Y",
            "datePaid": "2024-05-01T12:30:00+03:00",
            "sum": "1500.00",
            "psSum": 1499.5,
            "accountNumber": "17/1",
            "currency": "RUB"
        }))
        .unwrap();

        assert_eq!(payment.id, "42");
        assert_eq!(payment.order_id.as_deref(), Some("17"));
        assert!(payment.paid);
        assert_eq!(
            payment.date_paid.unwrap().with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
        );
        assert_eq!(payment.amount(), Some(Money::from_minor(149_950)));
        assert_eq!(payment.natural_key(), "17/1");
    }

    #[test]
    fn test_amount_falls_back_to_raw_sum() {
        let payment: PaymentRecord = serde_json::from_value(json!({
            "id": "7",
            "sum": 250,
            "psSum": null
        }))
        .unwrap();
        assert_eq!(payment.amount(), Some(Money::from_minor(25_000)));
        assert!(!payment.paid);
    }

    #[test]
    fn test_natural_key_synthesized_without_account_number() {
        let payment = PaymentRecord {
            id: "42".to_string(),
            account_number: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(payment.natural_key(), "Transaction 42");
    }

    #[test]
    fn test_deal_treats_zero_contact_as_absent() {
        let deal: Deal = serde_json::from_value(json!({
            "ID": "9",
            "TITLE": "Order #17",
            "CONTACT_ID": "0",
            "ASSIGNED_BY_ID": null,
            "STAGE_ID": "WON"
        }))
        .unwrap();
        assert_eq!(deal.id.as_deref(), Some("9"));
        assert!(deal.contact_id.is_none());
        assert!(deal.assigned_by_id.is_none());
        assert_eq!(deal.attributes.get("STAGE_ID"), Some(&json!("WON")));
    }

    #[test]
    fn test_payment_product_quantity_as_string() {
        let product: PaymentProduct =
            serde_json::from_value(json!({"id": 3, "rowId": "11", "quantity": "2"})).unwrap();
        assert_eq!(product.row_id.as_deref(), Some("11"));
        assert_eq!(product.quantity, 2.0);
    }

    #[test]
    fn test_webhook_from_form() {
        let body = "event=ONSALEPAYMENTPAID&data%5BFIELDS%5D%5BID%5D=42&ts=1714550000";
        let webhook = PaymentWebhook::from_form(body).unwrap();
        assert_eq!(webhook.payment_id, "42");
    }

    #[test]
    fn test_webhook_without_payment_id() {
        let err = PaymentWebhook::from_form("event=ONSALEPAYMENTPAID").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField(PAYMENT_ID_FORM_KEY.to_string())
        );
        assert!(PaymentWebhook::from_form("data%5BFIELDS%5D%5BID%5D=").is_err());
    }

    #[test]
    fn test_format_crm_timestamp() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        assert_eq!(format_crm_timestamp(instant), "2024-05-01T09:30:05+00:00");
    }
}
