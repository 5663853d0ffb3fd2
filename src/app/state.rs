//! Application state management.

use std::sync::Arc;

use crate::domain::{CrmGateway, WebhookJournal};

use super::pipeline::{PaymentPipeline, PipelineConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PaymentPipeline>,
    pub gateway: Arc<dyn CrmGateway>,
    pub journal: Arc<dyn WebhookJournal>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(
        gateway: Arc<dyn CrmGateway>,
        journal: Arc<dyn WebhookJournal>,
        config: &PipelineConfig,
    ) -> Self {
        let pipeline = Arc::new(PaymentPipeline::new(Arc::clone(&gateway), config));
        Self {
            pipeline,
            gateway,
            journal,
        }
    }
}
