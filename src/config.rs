use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::utils::{CircuitBreakerConfig, RetryConfig, RetryPolicy};

// ============================================================================
// Application Configuration
// ============================================================================
//
// Sources, later ones win:
// 1. Built-in defaults
// 2. JSON file named by KITCHEN_FLOW_CONFIG (every field optional)
// 3. KITCHEN_FLOW_* environment variables
//
// ============================================================================

const ENV_CONFIG_FILE: &str = "KITCHEN_FLOW_CONFIG";
const ENV_STORE: &str = "KITCHEN_FLOW_STORE";
const ENV_SCYLLA_NODES: &str = "KITCHEN_FLOW_SCYLLA_NODES";
const ENV_SCYLLA_KEYSPACE: &str = "KITCHEN_FLOW_SCYLLA_KEYSPACE";
const ENV_REDPANDA_BROKERS: &str = "KITCHEN_FLOW_REDPANDA_BROKERS";
const ENV_NOTIFICATION_TOPIC: &str = "KITCHEN_FLOW_NOTIFICATION_TOPIC";
const ENV_METRICS_PORT: &str = "KITCHEN_FLOW_METRICS_PORT";
const ENV_DEAD_LETTER_CAPACITY: &str = "KITCHEN_FLOW_DEAD_LETTER_CAPACITY";
const ENV_ADMIN_RELEASE_ATTEMPTS: &str = "KITCHEN_FLOW_ADMIN_RELEASE_ATTEMPTS";
const ENV_LOG: &str = "KITCHEN_FLOW_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Scylla,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,

    /// Notifications go to the log when unset.
    pub redpanda_brokers: Option<String>,
    pub notification_topic: String,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,

    /// Metrics server is not started when unset.
    pub metrics_port: Option<u16>,

    pub notification_retry: RetryPolicy,
    pub payment_retry: RetryPolicy,
    pub admin_release_attempts: u32,
    pub dead_letter_capacity: usize,

    /// Used when RUST_LOG is not set.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            scylla_nodes: vec!["127.0.0.1:9042".to_string()],
            scylla_keyspace: "kitchen_flow".to_string(),
            redpanda_brokers: None,
            notification_topic: "order-notifications".to_string(),
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 30,
            metrics_port: Some(9090),
            notification_retry: RetryConfig::notifications().into(),
            payment_retry: RetryConfig::payments().into(),
            admin_release_attempts: RetryConfig::admin_override().max_attempts,
            dead_letter_capacity: 1000,
            log_filter: "info,kitchen_flow=debug".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with a custom environment lookup.
    pub fn load_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match get_env(ENV_CONFIG_FILE) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                serde_json::from_str(&raw).with_context(|| format!("Invalid config file {}", path))?
            }
            None => Self::default(),
        };

        if let Some(store) = get_env(ENV_STORE) {
            config.store = match store.to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "scylla" => StoreBackend::Scylla,
                other => bail!("{} must be 'memory' or 'scylla', got '{}'", ENV_STORE, other),
            };
        }

        if let Some(nodes) = get_env(ENV_SCYLLA_NODES) {
            config.scylla_nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(keyspace) = get_env(ENV_SCYLLA_KEYSPACE) {
            config.scylla_keyspace = keyspace;
        }

        if let Some(brokers) = get_env(ENV_REDPANDA_BROKERS) {
            config.redpanda_brokers = Some(brokers).filter(|b| !b.is_empty());
        }

        if let Some(topic) = get_env(ENV_NOTIFICATION_TOPIC) {
            config.notification_topic = topic;
        }

        if let Some(port) = get_env(ENV_METRICS_PORT) {
            let port: u16 = port
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_METRICS_PORT, port))?;
            config.metrics_port = (port != 0).then_some(port);
        }

        if let Some(capacity) = get_env(ENV_DEAD_LETTER_CAPACITY) {
            config.dead_letter_capacity = capacity
                .parse()
                .with_context(|| format!("{} must be a positive integer", ENV_DEAD_LETTER_CAPACITY))?;
        }

        if let Some(attempts) = get_env(ENV_ADMIN_RELEASE_ATTEMPTS) {
            config.admin_release_attempts = attempts
                .parse()
                .with_context(|| format!("{} must be a positive integer", ENV_ADMIN_RELEASE_ATTEMPTS))?;
        }

        if let Some(filter) = get_env(ENV_LOG) {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store == StoreBackend::Scylla && self.scylla_nodes.is_empty() {
            bail!("scylla store selected but no nodes configured");
        }
        if self.dead_letter_capacity == 0 {
            bail!("dead_letter_capacity must be at least 1");
        }
        if self.admin_release_attempts == 0 {
            bail!("admin_release_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn notification_retry(&self) -> RetryConfig {
        RetryConfig::from(&self.notification_retry)
    }

    pub fn payment_retry(&self) -> RetryConfig {
        RetryConfig::from(&self.payment_retry)
    }

    pub fn admin_override_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.admin_release_attempts,
            ..RetryConfig::admin_override()
        }
    }

    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            ..CircuitBreakerConfig::default()
        }
    }
}
