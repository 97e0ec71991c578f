//! Server configuration types.
//!
//! Builder-pattern configuration for the Gangway server.
//!
//! # Example
//!
//! ```rust
//! use gangway_server::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .bind_addr("0.0.0.0:8443")
//!     .worker_num(4)
//!     .build();
//!
//! assert_eq!(config.bind_addr(), "0.0.0.0:8443");
//! assert_eq!(config.worker_num(), 4);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

/// Default bind address for both listeners.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8443";

/// Default number of worker processes.
pub const DEFAULT_WORKER_NUM: usize = 1;

/// Default number of drain retries (one per second).
pub const DEFAULT_DRAIN_RETRIES: u32 = 5;

/// Default interval between drain retries.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the legacy TCP listener (e.g. "0.0.0.0:8443").
    bind_addr: String,

    /// Port advertised in the `Alt-Svc` header for the multiplexed
    /// transport. Defaults to the bind address port.
    alt_svc_port: Option<u16>,

    /// Number of worker processes sharing the listening socket.
    worker_num: usize,

    /// Drain retry budget: how many one-interval waits before busy
    /// connections are force-cancelled.
    drain_retries: u32,

    /// Interval between drain retries.
    drain_interval: Duration,
}

impl ServerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address string.
    #[must_use]
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Parses and returns the bind address as a `SocketAddr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }

    /// Returns the port advertised in `Alt-Svc` responses.
    ///
    /// Falls back to the bind address port when not set explicitly, and to
    /// 443 when the bind address does not parse.
    #[must_use]
    pub fn alt_svc_port(&self) -> u16 {
        self.alt_svc_port
            .or_else(|| self.socket_addr().ok().map(|a| a.port()))
            .unwrap_or(443)
    }

    /// Returns the configured number of worker processes.
    #[must_use]
    pub fn worker_num(&self) -> usize {
        self.worker_num
    }

    /// Returns the drain retry budget.
    #[must_use]
    pub fn drain_retries(&self) -> u32 {
        self.drain_retries
    }

    /// Returns the interval between drain retries.
    #[must_use]
    pub fn drain_interval(&self) -> Duration {
        self.drain_interval
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    bind_addr: String,
    alt_svc_port: Option<u16>,
    worker_num: usize,
    drain_retries: u32,
    drain_interval: Duration,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            alt_svc_port: None,
            worker_num: DEFAULT_WORKER_NUM,
            drain_retries: DEFAULT_DRAIN_RETRIES,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }

    /// Sets the bind address for the legacy TCP listener.
    #[must_use]
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets the port advertised in `Alt-Svc` responses.
    #[must_use]
    pub fn alt_svc_port(mut self, port: u16) -> Self {
        self.alt_svc_port = Some(port);
        self
    }

    /// Sets the number of worker processes.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn worker_num(mut self, n: usize) -> Self {
        self.worker_num = n.max(1);
        self
    }

    /// Sets the drain retry budget.
    #[must_use]
    pub fn drain_retries(mut self, retries: u32) -> Self {
        self.drain_retries = retries;
        self
    }

    /// Sets the interval between drain retries.
    #[must_use]
    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind_addr,
            alt_svc_port: self.alt_svc_port,
            worker_num: self.worker_num,
            drain_retries: self.drain_retries,
            drain_interval: self.drain_interval,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), DEFAULT_BIND_ADDR);
        assert_eq!(config.worker_num(), DEFAULT_WORKER_NUM);
        assert_eq!(config.drain_retries(), DEFAULT_DRAIN_RETRIES);
        assert_eq!(config.drain_interval(), DEFAULT_DRAIN_INTERVAL);
    }

    #[test]
    fn test_alt_svc_port_defaults_to_bind_port() {
        let config = ServerConfig::builder().bind_addr("127.0.0.1:9000").build();
        assert_eq!(config.alt_svc_port(), 9000);
    }

    #[test]
    fn test_alt_svc_port_explicit() {
        let config = ServerConfig::builder()
            .bind_addr("127.0.0.1:9000")
            .alt_svc_port(443)
            .build();
        assert_eq!(config.alt_svc_port(), 443);
    }

    #[test]
    fn test_worker_num_clamped() {
        let config = ServerConfig::builder().worker_num(0).build();
        assert_eq!(config.worker_num(), 1);
    }

    #[test]
    fn test_socket_addr_parsing() {
        let config = ServerConfig::builder().bind_addr("127.0.0.1:8080").build();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_socket_addr_invalid() {
        let config = ServerConfig::builder().bind_addr("nonsense").build();
        assert!(config.socket_addr().is_err());
        // Alt-Svc falls back to 443 when the address does not parse.
        assert_eq!(config.alt_svc_port(), 443);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::builder()
            .bind_addr("0.0.0.0:9090")
            .worker_num(8)
            .drain_retries(3)
            .drain_interval(Duration::from_millis(500))
            .build();

        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.worker_num(), 8);
        assert_eq!(config.drain_retries(), 3);
        assert_eq!(config.drain_interval(), Duration::from_millis(500));
    }
}
