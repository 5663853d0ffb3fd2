//! Application layer containing the payment pipeline and shared state.

pub mod balance_ledger;
pub mod deal_resolver;
pub mod idempotency;
pub mod key_lock;
pub mod line_items;
pub mod payment_verifier;
pub mod pipeline;
pub mod state;
pub mod transaction_recorder;

pub use balance_ledger::BalanceLedger;
pub use deal_resolver::{DealResolver, assemble_contact_name};
pub use idempotency::TransactionIdempotencyGuard;
pub use key_lock::KeyedLock;
pub use line_items::ProductLineItemSync;
pub use payment_verifier::PaymentVerifier;
pub use pipeline::{PaymentPipeline, PipelineConfig};
pub use state::AppState;
pub use transaction_recorder::TransactionRecorder;
