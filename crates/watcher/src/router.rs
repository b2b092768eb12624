use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::alert::AlertManagerAlert;
use crate::{Error, Result};

const UNKNOWN_NAMESPACE: &str = "unknown";

// Shortest unique suffix kept when a dispatch id is squeezed into the
// length budget. Everything above this is negotiable, the suffix is not.
const MIN_TOKEN_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub supported_alerts: HashSet<String>,
    // Keyed by (provider, region), takes precedence over the namespace table.
    pub context_map: HashMap<(String, String), String>,
    pub namespace_map: HashMap<String, String>,
    pub default_context: String,
    pub max_dispatch_id_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let supported_alerts = ["CrateDBContainerRestart", "CrateDBCloudNotResponsive"]
            .into_iter()
            .map(String::from)
            .collect();

        let context_map = HashMap::from([
            (("aws".to_string(), "us-east-1".to_string()), "eks1-us-east-1-dev".to_string()),
            (("azure".to_string(), "eastus".to_string()), "aks1-eastus-dev".to_string()),
        ]);

        let namespace_map = HashMap::from([
            ("cratedb-prod".to_string(), "aks1-eastus-dev".to_string()),
            ("cratedb-staging".to_string(), "eks1-us-east-1-dev".to_string()),
            ("cratedb-dev".to_string(), "clusterxy".to_string()),
            ("cratedb-test".to_string(), "clusterxy".to_string()),
        ]);

        Self {
            supported_alerts,
            context_map,
            namespace_map,
            default_context: "aks1-eastus-dev".to_string(),
            max_dispatch_id_len: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub alert_name: String,
    pub cluster_context: String,
    pub dispatch_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedAlert {
    pub alert_name: String,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub reason: String,
}

#[derive(Debug)]
pub enum RouteOutcome {
    Dispatch(RoutingDecision),
    Rejected(RejectedAlert),
}

pub struct AlertRouter {
    config: RouterConfig,
}

impl AlertRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn supported_alerts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.supported_alerts.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn classify(&self, alert: &AlertManagerAlert) -> Result<RouteOutcome> {
        let alert_name = alert
            .alert_name()
            .ok_or_else(|| Error::Validation("alert is missing the alertname label".to_string()))?;

        if !self.config.supported_alerts.contains(alert_name) {
            return Ok(RouteOutcome::Rejected(RejectedAlert {
                alert_name: alert_name.to_string(),
                namespace: alert.namespace().map(String::from),
                pod: alert.pod().map(String::from),
                reason: format!(
                    "Unsupported alert type. Supported: {}",
                    self.supported_alerts().join(", ")
                ),
            }));
        }

        Ok(RouteOutcome::Dispatch(RoutingDecision {
            alert_name: alert_name.to_string(),
            cluster_context: self.resolve_cluster_context(alert),
            dispatch_id: self.derive_dispatch_id(alert_name, alert.namespace()),
        }))
    }

    // First matching rule wins: (provider, region) table, then namespace
    // table, then the configured default. Never empty.
    pub fn resolve_cluster_context(&self, alert: &AlertManagerAlert) -> String {
        if let (Some(provider), Some(region)) =
            (alert.labels.get("provider"), alert.labels.get("region"))
        {
            if let Some(context) = self.config.context_map.get(&(provider.clone(), region.clone()))
            {
                return context.clone();
            }
        }

        if let Some(namespace) = alert.namespace() {
            if let Some(context) = self.config.namespace_map.get(namespace) {
                return context.clone();
            }
        }

        self.config.default_context.clone()
    }

    // Dispatch ids name downstream workflow executions, which choke on overly
    // long identifiers. The id is capped at `max_dispatch_id_len`: the unique
    // token shrinks first (down to MIN_TOKEN_LEN), then the namespace segment.
    // The alert name is never truncated.
    pub fn derive_dispatch_id(&self, alert_name: &str, namespace: Option<&str>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let namespace = namespace.unwrap_or(UNKNOWN_NAMESPACE);
        let budget = self.config.max_dispatch_id_len;

        let id = format!("{alert_name}-{namespace}-{token}");
        if id.len() <= budget {
            return id;
        }

        let fixed = alert_name.len() + 1 + namespace.len() + 1;
        let token_len = budget.saturating_sub(fixed).clamp(MIN_TOKEN_LEN, token.len());
        let token = &token[..token_len];

        let id = format!("{alert_name}-{namespace}-{token}");
        if id.len() <= budget {
            return id;
        }

        let ns_budget = budget.saturating_sub(alert_name.len() + 1 + token_len + 1);
        if ns_budget == 0 {
            return format!("{alert_name}-{token}");
        }
        format!("{}-{}-{token}", alert_name, truncate_str(namespace, ns_budget))
    }
}

fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
