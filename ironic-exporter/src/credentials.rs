// ironic-exporter/src/credentials.rs - Broker credential resolution

use anyhow::{Context, Result};
use std::fmt;

use crate::config::ExporterConfig;

const RABBITMQ_USER_TOKEN: &str = "\"rabbitmq\"";

#[derive(Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl BrokerCredentials {
    /// Explicit user/password first, then the broker start script
    pub fn resolve(config: &ExporterConfig) -> Result<BrokerCredentials> {
        if let (Some(user), Some(password)) = (&config.broker_user, &config.broker_password) {
            return Ok(BrokerCredentials {
                user: user.clone(),
                password: password.clone(),
            });
        }

        let path = config.rabbitmq_start_script.as_ref().context(
            "no broker credentials: set RABBITMQ_USER and RABBITMQ_PASSWORD or RABBITMQ_START_SCRIPT",
        )?;
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read broker start script {}", path.display()))?;

        parse_rabbitmq_start(&script)
            .with_context(|| format!("invalid broker start script {}", path.display()))
    }
}

/// Pull the user and password out of the broker start script.
///
/// The credentials live on the first line that mentions `"rabbitmq"` past column 0,
/// as the first two double-quoted strings of that line.
pub fn parse_rabbitmq_start(script: &str) -> Result<BrokerCredentials> {
    let line = script
        .lines()
        .find(|line| line.find(RABBITMQ_USER_TOKEN).is_some_and(|pos| pos > 0))
        .context("no line with the rabbitmq user found")?;

    let mut quoted = quoted_strings(line);
    match (quoted.next(), quoted.next()) {
        (Some(user), Some(password)) => Ok(BrokerCredentials {
            user: user.to_string(),
            password: password.to_string(),
        }),
        _ => anyhow::bail!("rabbitmq user line does not hold a user and a password"),
    }
}

/// Non-empty `"..."` segments in order of appearance
fn quoted_strings(line: &str) -> impl Iterator<Item = &str> {
    line.split('"')
        .skip(1)
        .step_by(2)
        .filter(|segment| !segment.is_empty())
}
