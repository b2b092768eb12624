use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// AlertManager webhook payload structures (webhook format v4)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertManagerWebhook {
    pub version: String,
    pub receiver: String,
    pub status: AlertStatus,
    pub alerts: Vec<AlertManagerAlert>,
    #[serde(rename = "groupLabels", default)]
    pub group_labels: HashMap<String, String>,
    #[serde(rename = "commonLabels", default)]
    pub common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations", default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL", default)]
    pub external_url: String,
    #[serde(rename = "groupKey", default)]
    pub group_key: String,
    #[serde(rename = "truncatedAlerts", default)]
    pub truncated_alerts: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertManagerAlert {
    pub status: AlertStatus,
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    // Absent while the alert is still firing.
    #[serde(rename = "endsAt", default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertManagerAlert {
    pub fn alert_name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str).filter(|name| !name.is_empty())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.labels.get("namespace").map(String::as_str).filter(|ns| !ns.is_empty())
    }

    pub fn pod(&self) -> Option<&str> {
        self.labels.get("pod").map(String::as_str).filter(|pod| !pod.is_empty())
    }
}
