use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::buffer::BufferConfig;
use crate::router::RouterConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub router: RouterConfig,
    pub buffer: BufferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let mut router = RouterConfig::default();
        if let Ok(raw) = std::env::var("SUPPORTED_ALERTS") {
            let names: std::collections::HashSet<String> = raw
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
            if !names.is_empty() {
                router.supported_alerts = names;
            }
        }
        if let Ok(context) = std::env::var("DEFAULT_CLUSTER_CONTEXT") {
            if !context.is_empty() {
                router.default_context = context;
            }
        }

        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            agent: AgentConfig {
                endpoint: std::env::var("AGENT_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:8081".to_string()),
                submit_timeout_seconds: env_number("AGENT_SUBMIT_TIMEOUT_SECONDS", 10),
            },
            router,
            buffer: BufferConfig {
                max_size: env_number("BUFFER_MAX_SIZE", 1000),
                max_attempts: env_number("BUFFER_MAX_ATTEMPTS", 3),
                flush_interval_seconds: env_number("BUFFER_FLUSH_INTERVAL_SECONDS", 10),
                expire_after_hours: env_number("BUFFER_EXPIRE_AFTER_HOURS", 24),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.agent.endpoint.is_empty() {
            return Err(crate::Error::Config("AGENT_ENDPOINT must not be empty".to_string()));
        }
        if self.agent.submit_timeout_seconds == 0 {
            return Err(crate::Error::Config(
                "AGENT_SUBMIT_TIMEOUT_SECONDS must be at least 1".to_string(),
            ));
        }
        if self.buffer.max_size == 0 {
            return Err(crate::Error::Config("BUFFER_MAX_SIZE must be positive".to_string()));
        }
        if self.buffer.max_attempts == 0 {
            return Err(crate::Error::Config("BUFFER_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.buffer.flush_interval_seconds == 0 {
            return Err(crate::Error::Config(
                "BUFFER_FLUSH_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }
        if self.router.default_context.is_empty() {
            return Err(crate::Error::Config(
                "DEFAULT_CLUSTER_CONTEXT must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            agent: AgentConfig::default(),
            router: RouterConfig::default(),
            buffer: BufferConfig::default(),
        }
    }
}

fn env_number<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
