//! CRM REST integration.

pub mod client;
pub mod gateway;
pub mod params;
pub mod transport;

pub use client::{CrmClient, CrmClientConfig, CrmEnvelope};
pub use gateway::{Bitrix24Gateway, CrmSchema};
pub use params::encode_params;
pub use transport::{CrmTransport, HttpCrmTransport, TransportFailure};
