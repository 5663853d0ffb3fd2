//! Canned CRM data for pipeline tests.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Contact, Deal, Money, PaymentProduct, PaymentRecord, ProductRow};

use super::mocks::MockCrmGateway;

pub const PAYMENT_ID: &str = "42";
pub const ORDER_ID: &str = "17";
pub const DEAL_ID: &str = "9";
pub const CONTACT_ID: &str = "7";
pub const OWNER_ID: &str = "5";
pub const ACCOUNT_NUMBER: &str = "17/1";

/// Paid payment settled `age` before `now`
pub fn paid_payment(id: &str, amount: Money, now: DateTime<Utc>, age: Duration) -> PaymentRecord {
    PaymentRecord {
        id: id.to_string(),
        order_id: Some(ORDER_ID.to_string()),
        paid: true,
        date_paid: Some((now - age).fixed_offset()),
        sum: Some(amount),
        ps_sum: Some(amount),
        account_number: Some(ACCOUNT_NUMBER.to_string()),
    }
}

pub fn deal() -> Deal {
    Deal {
        id: Some(DEAL_ID.to_string()),
        title: Some("Order #17".to_string()),
        contact_id: Some(CONTACT_ID.to_string()),
        assigned_by_id: Some(OWNER_ID.to_string()),
        ..Default::default()
    }
}

pub fn contact() -> Contact {
    Contact {
        last_name: Some("Ivanov".to_string()),
        name: Some("Ivan".to_string()),
        second_name: Some("Petrovich".to_string()),
    }
}

/// Fully resolvable payment: paid two hours ago, order bound to a deal with a
/// named contact, no balance and no transaction yet
pub fn resolvable_gateway(amount: Money, now: DateTime<Utc>) -> MockCrmGateway {
    MockCrmGateway::new()
        .with_payment(paid_payment(PAYMENT_ID, amount, now, Duration::hours(2)))
        .with_order_entity(ORDER_ID, DEAL_ID)
        .with_deal(DEAL_ID, deal())
        .with_contact(CONTACT_ID, contact())
}

/// Two line items: 2 × 5.00 and 1 × 3.50
pub fn with_two_line_items(gateway: MockCrmGateway, payment_id: &str) -> MockCrmGateway {
    gateway
        .with_payment_products(
            payment_id,
            vec![
                PaymentProduct {
                    id: Some("1".to_string()),
                    row_id: Some("11".to_string()),
                    quantity: 2.0,
                },
                PaymentProduct {
                    id: Some("2".to_string()),
                    row_id: Some("12".to_string()),
                    quantity: 1.0,
                },
            ],
        )
        .with_product_row(
            "11",
            ProductRow {
                product_id: Some("31".to_string()),
                product_name: Some("Widget".to_string()),
                price: Some(Money::from_minor(500)),
            },
        )
        .with_product_row(
            "12",
            ProductRow {
                product_id: Some("32".to_string()),
                product_name: Some("Gadget".to_string()),
                price: Some(Money::from_minor(350)),
            },
        )
}
