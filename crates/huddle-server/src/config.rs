//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use huddle_shared::constants::{
    ping_period, DEFAULT_HTTP_PORT, DEFAULT_MAX_WAITING_POOL, MAX_FRAME_SIZE,
    OUTBOUND_QUEUE_CAPACITY, PONG_WAIT_SECS, WRITE_WAIT_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./huddle.db`
    pub database_path: PathBuf,

    /// How long a connection may stay silent (no frame, no pong) before it
    /// is dropped.
    /// Env: `PONG_WAIT_SECS`
    pub pong_wait: Duration,

    /// Deadline for writing one frame.
    /// Env: `WRITE_WAIT_SECS`
    pub write_wait: Duration,

    /// Largest inbound frame accepted, in bytes.
    /// Env: `MAX_FRAME_SIZE`
    pub max_frame_size: usize,

    /// Bound of each connection's outbound queue.
    /// Env: `OUTBOUND_QUEUE_CAPACITY`
    pub outbound_queue_capacity: usize,

    /// How many waiting users one matching pass considers (oldest first).
    /// Env: `MAX_WAITING_POOL`
    pub max_waiting_pool: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./huddle.db"),
            pong_wait: Duration::from_secs(PONG_WAIT_SECS),
            write_wait: Duration::from_secs(WRITE_WAIT_SECS),
            max_frame_size: MAX_FRAME_SIZE,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            max_waiting_pool: DEFAULT_MAX_WAITING_POOL,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "PONG_WAIT_SECS").filter(|s| *s > 0) {
            config.pong_wait = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "WRITE_WAIT_SECS").filter(|s| *s > 0) {
            config.write_wait = Duration::from_secs(secs);
        }

        if let Some(size) = parse_var::<usize>(&lookup, "MAX_FRAME_SIZE").filter(|s| *s > 0) {
            config.max_frame_size = size;
        }

        if let Some(cap) =
            parse_var::<usize>(&lookup, "OUTBOUND_QUEUE_CAPACITY").filter(|c| *c > 0)
        {
            config.outbound_queue_capacity = cap;
        }

        if let Some(pool) = parse_var::<usize>(&lookup, "MAX_WAITING_POOL") {
            config.max_waiting_pool = pool;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Interval between keepalive pings.
    pub fn ping_period(&self) -> Duration {
        ping_period(self.pong_wait)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_frame_size, 512);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.ping_period(), Duration::from_secs(54));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/h.db"),
            ("PONG_WAIT_SECS", "20"),
            ("MAX_WAITING_POOL", "8"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/h.db"));
        assert_eq!(config.ping_period(), Duration::from_secs(18));
        assert_eq!(config.max_waiting_pool, 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("WRITE_WAIT_SECS", "0"),
            ("OUTBOUND_QUEUE_CAPACITY", "lots"),
        ]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.outbound_queue_capacity, 256);
    }
}
