//! Server configuration, populated from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration for the ingestion server.
///
/// All fields are populated from environment variables with sensible
/// defaults, so the server can be started with zero configuration.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `NETINSIGHT_BIND` | `0.0.0.0:8080` | TCP socket address to listen on |
/// | `NETINSIGHT_DB` | (absent = in-memory) | Path to the SQLite database file |
/// | `NETINSIGHT_BUSY_TIMEOUT_MS` | `5000` | How long a writer waits for the database lock |
/// | `NETINSIGHT_STRICT_KEY_BINDING` | `false` | Only accept a hostname with the key its Profile holds |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    pub bind_addr: SocketAddr,

    /// Path to the SQLite database file.
    /// `None` means use an in-memory store (data is lost on restart).
    pub db_path: Option<String>,

    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,

    /// When set, a submission is accepted only if its hostname already has a
    /// Profile holding the presented key.
    pub strict_key_binding: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: None,
            busy_timeout_ms: 5000,
            strict_key_binding: false,
        }
    }
}

impl ServerConfig {
    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr: SocketAddr = std::env::var("NETINSIGHT_BIND")
            .map(|v| {
                v.parse()
                    .expect("NETINSIGHT_BIND must be a valid socket address (e.g. 0.0.0.0:8080)")
            })
            .unwrap_or(defaults.bind_addr);

        let busy_timeout_ms = std::env::var("NETINSIGHT_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.busy_timeout_ms);

        let strict_key_binding = std::env::var("NETINSIGHT_STRICT_KEY_BINDING")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.strict_key_binding);

        Self {
            bind_addr,
            db_path: std::env::var("NETINSIGHT_DB").ok().filter(|p| !p.is_empty()),
            busy_timeout_ms,
            strict_key_binding,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
