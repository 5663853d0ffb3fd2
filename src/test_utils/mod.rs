//! Test doubles and fixtures, available under the `test-utils` feature.

pub mod fixtures;
pub mod mocks;

pub use mocks::{CrmOperation, MockCrmGateway, MockJournal, StoredBalance, StoredTransaction};
