//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crm_payment_relay::api::create_router;
use crm_payment_relay::app::{AppState, PipelineConfig};
use crm_payment_relay::infra::{
    Bitrix24Gateway, CrmClient, CrmClientConfig, CrmSchema, FileJournal, HttpCrmTransport,
    JournalConfig,
};

/// Application configuration
struct Config {
    /// CRM inbound webhook base URL; embeds the access token
    crm_webhook_url: SecretString,
    host: String,
    port: u16,
    client_config: CrmClientConfig,
    schema: CrmSchema,
    pipeline_config: PipelineConfig,
    journal_config: JournalConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let crm_webhook_url = env::var("CRM_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .context("CRM_WEBHOOK_URL not set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            crm_webhook_url: SecretString::from(crm_webhook_url),
            host,
            port,
            client_config: CrmClientConfig::from_env(),
            schema: CrmSchema::from_env(),
            pipeline_config: PipelineConfig::from_env()
                .context("Invalid pipeline configuration")?,
            journal_config: JournalConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("💳 CRM Payment Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let transport = HttpCrmTransport::new(
        config.crm_webhook_url.clone(),
        config.client_config.timeout,
    )?;
    let client = CrmClient::new(Arc::new(transport), config.client_config.clone());
    info!(
        "   ✓ CRM client created (timeout: {}s, attempts: {})",
        config.client_config.timeout.as_secs(),
        config.client_config.max_attempts
    );

    let gateway = Arc::new(Bitrix24Gateway::new(client, config.schema));
    info!(
        "   ✓ CRM gateway ready (balance type: {}, transaction type: {})",
        config.schema.balance_entity_type_id, config.schema.transaction_entity_type_id
    );

    let journal = Arc::new(FileJournal::new(config.journal_config.clone()));
    info!(
        "   ✓ Journal: {} / {}",
        config.journal_config.raw_input_path.display(),
        config.journal_config.outcome_path.display()
    );

    let app_state = Arc::new(AppState::new(gateway, journal, &config.pipeline_config));
    info!(
        "   ✓ Payment pipeline ready (window: {}h, category: {})",
        config.pipeline_config.payment_window_hours, config.pipeline_config.transaction_category_id
    );

    let router = create_router(app_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
