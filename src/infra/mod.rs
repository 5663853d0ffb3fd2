//! Infrastructure layer implementations.

pub mod crm;
pub mod journal;

pub use crm::{Bitrix24Gateway, CrmClient, CrmClientConfig, CrmSchema, HttpCrmTransport};
pub use journal::{FileJournal, JournalConfig};
