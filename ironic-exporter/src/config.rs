// ironic-exporter/src/config.rs - Environment driven exporter configuration

use anyhow::{Context, Result};
use ironic_exporter_core::CompletionPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::supervisor::RetryPolicy;

pub const DEFAULT_REGION: &str = "qa-de-1";
pub const DEFAULT_AMQP_PORT: u16 = 5672;
pub const DEFAULT_METRICS_PORT: u16 = 9191;
pub const DEFAULT_ROUTING_KEYS: &[&str] = &["info", "error"];

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ExporterConfig {
    pub region: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub broker_user: Option<String>,
    #[serde(skip_serializing)]
    pub broker_password: Option<String>,
    /// Broker start script to pull credentials from when user/password are not set
    pub rabbitmq_start_script: Option<PathBuf>,
    pub notifications_enabled: bool,
    pub routing_keys: Vec<String>,
    pub exclusive_queue: bool,
    pub retain_on_match: bool,
    pub retry_delay_secs: u64,
    pub retry_jitter_min_secs: u64,
    pub retry_jitter_max_secs: u64,
    pub metrics_port: u16,
    pub version: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            broker_host: broker_host_for_region(DEFAULT_REGION),
            broker_port: DEFAULT_AMQP_PORT,
            broker_user: None,
            broker_password: None,
            rabbitmq_start_script: None,
            notifications_enabled: false,
            routing_keys: DEFAULT_ROUTING_KEYS.iter().map(|k| k.to_string()).collect(),
            exclusive_queue: false,
            retain_on_match: false,
            retry_delay_secs: 5,
            retry_jitter_min_secs: 1,
            retry_jitter_max_secs: 3,
            metrics_port: DEFAULT_METRICS_PORT,
            version: String::new(),
        }
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("region", &self.region)
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("broker_user", &self.broker_user)
            .field("broker_password", &self.broker_password.as_ref().map(|_| "***"))
            .field("rabbitmq_start_script", &self.rabbitmq_start_script)
            .field("notifications_enabled", &self.notifications_enabled)
            .field("routing_keys", &self.routing_keys)
            .field("exclusive_queue", &self.exclusive_queue)
            .field("retain_on_match", &self.retain_on_match)
            .field("metrics_port", &self.metrics_port)
            .finish_non_exhaustive()
    }
}

/// Broker service name inside the regional Kubernetes cluster
pub fn broker_host_for_region(region: &str) -> String {
    format!("ironic-rabbitmq.monsoon3.svc.kubernetes.{region}.cloud.sap")
}

impl ExporterConfig {
    /// Create configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let region = lookup("REGION").unwrap_or(defaults.region);
        let broker_host = lookup("RABBITMQ_HOST").unwrap_or_else(|| broker_host_for_region(&region));

        let routing_keys = match lookup("NOTIFICATION_ROUTING_KEYS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.routing_keys,
        };

        let config = Self {
            broker_host,
            broker_port: parse_or("RABBITMQ_PORT", &lookup, defaults.broker_port)?,
            broker_user: lookup("RABBITMQ_USER"),
            broker_password: lookup("RABBITMQ_PASSWORD"),
            rabbitmq_start_script: lookup("RABBITMQ_START_SCRIPT").map(PathBuf::from),
            notifications_enabled: flag("NOTIFICATIONS", &lookup),
            routing_keys,
            exclusive_queue: flag("NOTIFICATION_EXCLUSIVE_QUEUE", &lookup),
            retain_on_match: flag("NOTIFICATION_RETAIN_ON_MATCH", &lookup),
            retry_delay_secs: parse_or("RETRY_DELAY_SECS", &lookup, defaults.retry_delay_secs)?,
            retry_jitter_min_secs: parse_or("RETRY_JITTER_MIN_SECS", &lookup, defaults.retry_jitter_min_secs)?,
            retry_jitter_max_secs: parse_or("RETRY_JITTER_MAX_SECS", &lookup, defaults.retry_jitter_max_secs)?,
            metrics_port: parse_or("PORT_NUMBER", &lookup, defaults.metrics_port)?,
            version: lookup("OS_VERSION").unwrap_or(defaults.version),
            region,
        };

        if config.retry_jitter_min_secs > config.retry_jitter_max_secs {
            anyhow::bail!(
                "RETRY_JITTER_MIN_SECS ({}) is larger than RETRY_JITTER_MAX_SECS ({})",
                config.retry_jitter_min_secs,
                config.retry_jitter_max_secs
            );
        }

        tracing::info!("📡 Exporter Configuration:");
        tracing::info!("   Region: {}", config.region);
        tracing::info!("   Broker: {}:{}", config.broker_host, config.broker_port);
        tracing::info!("   User: {}", config.broker_user.as_deref().unwrap_or("not set"));
        tracing::info!("   Password: {}", if config.broker_password.is_some() { "***provided***" } else { "not set" });
        tracing::info!("   Notifications: {}", if config.notifications_enabled { "enabled" } else { "disabled" });
        tracing::info!("   Routing keys: [{}]", config.routing_keys.join(", "));
        tracing::info!("   Metrics port: {}", config.metrics_port);

        Ok(config)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.metrics_port))
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        if self.retain_on_match {
            CompletionPolicy::Retain
        } else {
            CompletionPolicy::Consume
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.retry_delay_secs),
            jitter_min: Duration::from_secs(self.retry_jitter_min_secs),
            jitter_max: Duration::from_secs(self.retry_jitter_max_secs),
        }
    }
}

fn flag<F>(key: &str, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
