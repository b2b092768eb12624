use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::alert::{AlertManagerAlert, AlertStatus};
use crate::router::RoutingDecision;
use crate::{Error, Result};

// One unit of downstream work, addressed by its dispatch id. The id is
// assigned once at routing time and never changes across retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchUnit {
    pub dispatch_id: String,
    pub alert_name: String,
    pub status: AlertStatus,
    pub namespace: String,
    pub pod: String,
    pub cluster_context: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub correlation_id: String,
}

impl DispatchUnit {
    pub fn from_decision(
        decision: &RoutingDecision,
        alert: &AlertManagerAlert,
        correlation_id: &str,
    ) -> Self {
        Self {
            dispatch_id: decision.dispatch_id.clone(),
            alert_name: decision.alert_name.clone(),
            status: alert.status,
            namespace: alert.namespace().unwrap_or("unknown").to_string(),
            pod: alert.pod().unwrap_or("unknown").to_string(),
            cluster_context: decision.cluster_context.clone(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

// Narrow seam in front of the external durable-execution system. Everything
// past submit_unit (retries, persistence, signal delivery) is its problem.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    async fn submit_unit(&self, unit: &DispatchUnit) -> Result<()>;
    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub endpoint: String,
    pub submit_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8081".to_string(),
            submit_timeout_seconds: 10,
        }
    }
}

pub struct HttpExecutionAgent {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpExecutionAgent {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.submit_timeout_seconds))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ExecutionAgent for HttpExecutionAgent {
    async fn submit_unit(&self, unit: &DispatchUnit) -> Result<()> {
        let url = format!("{}/commands", self.endpoint);

        debug!(
            dispatch_id = %unit.dispatch_id,
            cluster_context = %unit.cluster_context,
            correlation_id = %unit.correlation_id,
            "Submitting dispatch unit to agent coordinator"
        );

        let response = self
            .client
            .post(&url)
            .json(unit)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("failed to reach agent coordinator: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Agent(format!(
                "agent coordinator returned {} for dispatch {}",
                response.status(),
                unit.dispatch_id
            )));
        }

        Ok(())
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Agent availability check failed: {e}");
                false
            }
        }
    }
}
