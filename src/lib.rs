//! CRM payment relay.
//!
//! Receives paid-payment webhooks from a Bitrix24-style CRM, credits the
//! client's running balance and books an idempotent transaction record with
//! the payment's line items.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
