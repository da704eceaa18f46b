//! Environment-driven configuration for the `atelier-query` binary.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// An environment variable holds an unparseable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// The offending variable.
        var: &'static str,
        /// Why it failed to parse.
        reason: String,
    },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker bootstrap addresses, comma-separated.
    pub brokers: String,
    /// Topics to consume.
    pub topics: Vec<String>,
    /// Consumer group id.
    pub consumer_group: String,
    /// Where to start when the group has no committed offsets.
    pub auto_offset_reset: String,
    /// Postgres connection URL for the read-model database.
    pub database_url: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Prometheus exporter listen address.
    pub metrics_addr: SocketAddr,
    /// Interval for the queue-depth and aggregate-gauge pollers.
    pub poll_interval: Duration,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `DATABASE_URL` is required; everything else has a default suited to a
    /// local single-node setup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `DATABASE_URL` is missing or a numeric or
    /// address variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let brokers = env_or("ATELIER_BROKERS", "localhost:9092");
        let topics = parse_topics(&env_or("ATELIER_TOPICS", "user-events,image-events"));
        let consumer_group = env_or("ATELIER_CONSUMER_GROUP", "atelier-query");
        let auto_offset_reset = env_or("ATELIER_AUTO_OFFSET_RESET", "earliest");

        let max_connections = parse_var("ATELIER_DB_MAX_CONNECTIONS", 5)?;
        let poll_secs: u64 = parse_var("ATELIER_POLL_INTERVAL_SECS", 30)?;

        let metrics_addr = env_or("ATELIER_METRICS_ADDR", "0.0.0.0:9090")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "ATELIER_METRICS_ADDR",
                reason: e.to_string(),
            })?;

        Ok(Self {
            brokers,
            topics,
            consumer_group,
            auto_offset_reset,
            database_url,
            max_connections,
            metrics_addr,
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_split_and_trim() {
        assert_eq!(
            parse_topics("user-events, image-events"),
            vec!["user-events".to_string(), "image-events".to_string()]
        );
        assert_eq!(parse_topics("user-events,,"), vec!["user-events".to_string()]);
    }
}
