use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    agent::DispatchUnit,
    alert::AlertManagerWebhook,
    metrics,
    router::{RejectedAlert, RouteOutcome},
};

use super::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "alert-watcher",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    if state.agent.is_available().await {
        Json(json!({
            "status": "ready",
            "agent_connected": true,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "agent_connected": false,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct ProcessedAlert {
    dispatch_id: String,
    alert_name: String,
    namespace: String,
    pod: String,
    cluster_context: String,
    status: &'static str,
}

pub async fn webhook_alertmanager(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertManagerWebhook>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    info!(
        %correlation_id,
        webhook_version = %payload.version,
        alert_count = payload.alerts.len(),
        receiver = %payload.receiver,
        group_key = %payload.group_key,
        "Received AlertManager webhook"
    );

    let mut processed: Vec<ProcessedAlert> = Vec::new();
    let mut rejected: Vec<RejectedAlert> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for alert in &payload.alerts {
        let decision = match state.router.classify(alert) {
            Ok(RouteOutcome::Dispatch(decision)) => decision,
            Ok(RouteOutcome::Rejected(rejection)) => {
                info!(
                    %correlation_id,
                    alert_name = %rejection.alert_name,
                    reason = %rejection.reason,
                    "Rejecting unsupported alert type"
                );
                metrics::ALERTS_REJECTED_TOTAL.inc();
                rejected.push(rejection);
                continue;
            }
            Err(e) => {
                warn!(%correlation_id, error = %e, "Skipping malformed alert in batch");
                errors.push(e.to_string());
                continue;
            }
        };

        let unit = DispatchUnit::from_decision(&decision, alert, &correlation_id);

        match state.agent.submit_unit(&unit).await {
            Ok(()) => {
                info!(
                    %correlation_id,
                    dispatch_id = %unit.dispatch_id,
                    alert_name = %unit.alert_name,
                    cluster_context = %unit.cluster_context,
                    "Alert forwarded to agent coordinator"
                );
                metrics::ALERTS_PROCESSED_TOTAL.inc();
                processed.push(processed_entry(unit, "forwarded"));
            }
            Err(e) => {
                warn!(
                    %correlation_id,
                    dispatch_id = %unit.dispatch_id,
                    error = %e,
                    "Forward failed, buffering alert for retry"
                );
                match state.buffer.enqueue(unit.clone(), e.to_string()).await {
                    Ok(_) => {
                        metrics::ALERTS_BUFFERED_TOTAL.inc();
                        processed.push(processed_entry(unit, "buffered"));
                    }
                    Err(buffer_err) => {
                        error!(
                            %correlation_id,
                            dispatch_id = %unit.dispatch_id,
                            error = %buffer_err,
                            "Failed to buffer alert"
                        );
                        errors.push(buffer_err.to_string());
                    }
                }
            }
        }
    }

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };

    let (processed_count, rejected_count, error_count) =
        (processed.len(), rejected.len(), errors.len());
    let body = json!({
        "correlation_id": correlation_id,
        "processed_alerts": processed,
        "processed_count": processed_count,
        "rejected_alerts": rejected,
        "rejected_count": rejected_count,
        "errors": errors,
        "error_count": error_count,
        "supported_alert_types": state.router.supported_alerts(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    (status, Json(body)).into_response()
}

fn processed_entry(unit: DispatchUnit, status: &'static str) -> ProcessedAlert {
    ProcessedAlert {
        dispatch_id: unit.dispatch_id,
        alert_name: unit.alert_name,
        namespace: unit.namespace,
        pod: unit.pod,
        cluster_context: unit.cluster_context,
        status,
    }
}

pub async fn buffer_stats(State(state): State<Arc<AppState>>) -> Response {
    Json(state.buffer.stats().await).into_response()
}

pub async fn buffer_alerts(State(state): State<Arc<AppState>>) -> Response {
    Json(state.buffer.list().await).into_response()
}

pub async fn buffer_flush(State(state): State<Arc<AppState>>) -> Response {
    let report = state.buffer.flush(state.agent.as_ref()).await;
    if report.skipped {
        info!("Manual flush skipped, agent not available");
    }
    Json(report).into_response()
}

pub async fn buffer_purge(State(state): State<Arc<AppState>>) -> Response {
    let purged = state.buffer.purge_failed().await;
    Json(json!({ "purged": purged })).into_response()
}

pub async fn metrics() -> String {
    metrics::gather_metrics()
}
