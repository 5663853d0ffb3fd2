//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
};
use tracing::{error, info, warn};
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AddedLineItem, DuplicatePayment, FailureReport, HealthResponse, HealthStatus,
    LineItemError, LineItemSyncReport, PaymentWebhook, PipelineStep, RecordedPayment,
    WebhookResponse,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRM Payment Relay API",
        version = "0.1.0",
        description = "Books paid CRM orders into client balances and transaction records",
        license(
            name = "MIT"
        )
    ),
    paths(
        payment_webhook_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            WebhookResponse,
            RecordedPayment,
            DuplicatePayment,
            FailureReport,
            PipelineStep,
            LineItemSyncReport,
            AddedLineItem,
            LineItemError,
            HealthResponse,
            HealthStatus,
        )
    ),
    tags(
        (name = "webhooks", description = "CRM event webhooks"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Receive a paid-payment event from the CRM
///
/// The body is the CRM's URL-encoded event form; only `data[FIELDS][ID]` is
/// read. The response is always HTTP 200 and reports the outcome in
/// `success`, with `already_exists` set when the invoice was booked before.
/// Bodies over the size limit are answered the same way, as a
/// `parse_webhook` failure.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "webhooks",
    request_body(
        content = String,
        content_type = "application/x-www-form-urlencoded",
        description = "CRM event form, e.g. `event=ONSALEPAYMENTPAID&data[FIELDS][ID]=42`"
    ),
    responses(
        (status = 200, description = "Processing outcome", body = WebhookResponse)
    )
)]
pub async fn payment_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Json<WebhookResponse> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(status = %rejection.status(), error = %rejection.body_text(), "Unreadable webhook body");
            let response = WebhookResponse::unreadable_body(rejection.body_text());
            if let Err(e) = state.journal.record_outcome(&response).await {
                warn!(error = %e, "Failed to record webhook outcome");
            }
            return Json(response);
        }
    };

    let raw = String::from_utf8_lossy(&body);
    if let Err(e) = state.journal.record_payload(&raw).await {
        warn!(error = %e, "Failed to record raw webhook payload");
    }

    let response = match PaymentWebhook::from_form(&raw) {
        Ok(webhook) => {
            info!(payment_id = %webhook.payment_id, "Payment webhook received");
            WebhookResponse::from(state.pipeline.process(&webhook.payment_id).await)
        }
        Err(e) => {
            warn!(error = %e, "Webhook without a usable payment ID");
            WebhookResponse::invalid_webhook(e)
        }
    };

    if let WebhookResponse::Failed(report) = &response {
        error!(
            payment_id = ?report.payment_id,
            step = %report.step,
            error_kind = %report.error_kind,
            error = %report.error,
            "Payment webhook failed"
        );
    }

    if let Err(e) = state.journal.record_outcome(&response).await {
        warn!(error = %e, "Failed to record webhook outcome");
    }

    Json(response)
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(crm_health(&state).await)
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "CRM reachable"),
        (status = 503, description = "CRM unreachable")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    match crm_health(&state).await.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn crm_health(state: &AppState) -> HealthResponse {
    let crm = match state.gateway.health_check().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            warn!(error = %e, "CRM health check failed");
            HealthStatus::Unhealthy
        }
    };
    HealthResponse::new(crm)
}
