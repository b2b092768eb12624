mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    agent::ExecutionAgent,
    buffer::DeliveryBuffer,
    router::AlertRouter,
};

pub struct AppState {
    pub router: AlertRouter,
    pub buffer: Arc<DeliveryBuffer>,
    pub agent: Arc<dyn ExecutionAgent>,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(
        router: AlertRouter,
        buffer: Arc<DeliveryBuffer>,
        agent: Arc<dyn ExecutionAgent>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                router,
                buffer,
                agent,
            }),
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/ready", get(routes::ready))
            .route("/webhook/alertmanager", post(routes::webhook_alertmanager))
            .route("/buffer/stats", get(routes::buffer_stats))
            .route("/buffer/alerts", get(routes::buffer_alerts))
            .route("/buffer/flush", post(routes::buffer_flush))
            .route("/buffer/purge", post(routes::buffer_purge))
            .route("/metrics", get(routes::metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
