use std::sync::Arc;
use tracing::info;

use alert_watcher::{
    agent::{ExecutionAgent, HttpExecutionAgent},
    buffer::DeliveryBuffer,
    config::Config,
    metrics,
    router::AlertRouter,
    server::Server,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    info!(
        addr = %config.server.addr,
        agent_endpoint = %config.agent.endpoint,
        "Loaded configuration"
    );

    metrics::register_metrics();

    let agent: Arc<dyn ExecutionAgent> = Arc::new(HttpExecutionAgent::new(&config.agent)?);

    let buffer = Arc::new(DeliveryBuffer::new(config.buffer.clone()));
    buffer.start_background_flush(Arc::clone(&agent));

    let router = AlertRouter::new(config.router.clone());

    let server = Server::new(router, Arc::clone(&buffer), agent);

    info!("Starting server on {}", config.server.addr);
    server.start(&config.server.addr).await?;

    Ok(())
}
