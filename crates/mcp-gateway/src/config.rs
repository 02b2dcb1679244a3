//! Configuration for the MCP gateway.

use std::time::Duration;

/// Protocol and timing constants.
pub mod defaults {
    use std::time::Duration;

    /// Protocol version advertised by `initialize` when none is configured.
    pub const PROTOCOL_VERSION: &str = "2025-11-25";

    /// Protocol version assumed when the `MCP-Protocol-Version` header is absent.
    pub const FALLBACK_PROTOCOL_VERSION: &str = "2025-03-26";

    /// Protocol versions accepted in the `MCP-Protocol-Version` header.
    pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
        &["2025-11-25", "2025-06-18", "2025-03-26"];

    /// Sessions idle longer than this are expired.
    pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    /// Interval between background sweeps for expired sessions.
    pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Maximum buffered events per session for `Last-Event-ID` replay.
    pub const MESSAGE_BUFFER_SIZE: usize = 100;

    /// WebSocket streams without a frame for this long are failed.
    pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Interval between SSE keep-alive comment frames.
    pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(30);

    /// Page size used when a list request carries none (or an invalid one).
    pub const PAGE_SIZE: usize = 100;
}

/// Process-wide gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Protocol version returned by `initialize`. Does not affect which
    /// versions are accepted in request headers.
    pub protocol_version: String,

    /// Server name reported in `serverInfo`.
    pub server_name: String,

    /// Server version reported in `serverInfo`.
    pub server_version: String,

    /// Session idle timeout.
    pub session_timeout: Duration,

    /// Background sweep interval for expired sessions.
    pub session_sweep_interval: Duration,

    /// Per-session message buffer capacity (minimum 1).
    pub message_buffer_size: usize,

    /// WebSocket stream idle timeout.
    pub stream_idle_timeout: Duration,

    /// SSE keep-alive period.
    pub sse_keep_alive: Duration,
}

impl Config {
    /// Create a configuration with an explicit advertised protocol version.
    #[must_use]
    pub fn new(protocol_version: Option<String>) -> Self {
        Self {
            protocol_version: protocol_version
                .unwrap_or_else(|| defaults::PROTOCOL_VERSION.to_string()),
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            session_timeout: defaults::SESSION_TIMEOUT,
            session_sweep_interval: defaults::SESSION_SWEEP_INTERVAL,
            message_buffer_size: defaults::MESSAGE_BUFFER_SIZE,
            stream_idle_timeout: defaults::STREAM_IDLE_TIMEOUT,
            sse_keep_alive: defaults::SSE_KEEP_ALIVE,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// `MCP_PROTOCOL_VERSION` overrides the advertised protocol version.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var("MCP_PROTOCOL_VERSION").ok())
    }

    /// Create a test configuration with short timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            session_timeout: Duration::from_secs(5),
            session_sweep_interval: Duration::from_millis(100),
            stream_idle_timeout: Duration::from_millis(500),
            sse_keep_alive: Duration::from_secs(1),
            ..Self::new(None)
        }
    }

    /// Buffer capacity, never below one event.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.message_buffer_size.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None)
    }
}
