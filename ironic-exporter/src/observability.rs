// ironic-exporter/src/observability.rs - Tracing setup and session context for logs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::broker::QueueBinding;

// ============ SESSION CONTEXT ============

/// Identity of one subscription attempt, carried on every span and log line of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Fresh for every attempt, so reconnects are distinguishable in the logs
    pub session_id: String,
    pub routing_key: String,
    pub queue: String,
    pub attempt: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl SessionContext {
    pub fn new(binding: &QueueBinding, attempt: u64) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            routing_key: binding.routing_key.clone(),
            queue: binding.queue.clone(),
            attempt,
            started_at: Utc::now(),
        }
    }

    pub fn span(&self) -> Span {
        info_span!(
            "notification.session",
            session.id = %self.session_id,
            session.routing_key = %self.routing_key,
            session.queue = %self.queue,
            session.attempt = self.attempt,
        )
    }
}

// ============ SESSION LOGGER ============

/// Structured log lines for session lifecycle transitions
pub struct SessionLogger;

impl SessionLogger {
    pub fn started(ctx: &SessionContext) {
        tracing::info!(
            session.id = %ctx.session_id,
            session.routing_key = %ctx.routing_key,
            session.queue = %ctx.queue,
            session.attempt = ctx.attempt,
            "Subscription session started"
        );
    }

    pub fn ended(ctx: &SessionContext, reason: &str, messages: u64) {
        let uptime_secs = (Utc::now() - ctx.started_at).num_seconds();
        tracing::info!(
            session.id = %ctx.session_id,
            session.routing_key = %ctx.routing_key,
            session.messages = messages,
            session.uptime_secs = uptime_secs,
            reason = %reason,
            "Subscription session ended"
        );
    }

    pub fn failed(ctx: &SessionContext, error: &str, messages: u64) {
        tracing::error!(
            session.id = %ctx.session_id,
            session.routing_key = %ctx.routing_key,
            session.queue = %ctx.queue,
            session.messages = messages,
            error = %error,
            "Subscription session failed"
        );
    }
}

// ============ TRACING SETUP ============

/// Initialize tracing. `RUST_LOG` wins, then `LOGLEVEL` (default `info`).
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOGLEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.to_lowercase())
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_level(true);

    if json {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }
}
