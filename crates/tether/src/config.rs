//! Orchestrator configuration.

use std::time::Duration;

use tether_transport::TransportConfig;

/// Settings for an [`Orchestrator`](crate::Orchestrator).
///
/// Start from [`OrchestratorConfig::new`] and override what you need:
///
/// ```rust
/// use std::time::Duration;
/// use tether::OrchestratorConfig;
///
/// let config = OrchestratorConfig::new("wss://play.example.com/ws")
///     .with_retry_backoff(Duration::from_secs(5))
///     .with_dial_timeout(Some(Duration::from_secs(3)));
/// assert_eq!(config.retry_backoff, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The single endpoint every dial goes to.
    pub address: String,

    /// Fixed delay between a failed dial and the automatic retry.
    /// No growth, no jitter. A backoff too large to add to the current
    /// time (such as `Duration::MAX`) disables the automatic retry.
    ///
    /// Default: 2 seconds.
    pub retry_backoff: Duration,

    /// Deadline for one dial. `None` lets a hung dial sit in `Connecting`
    /// until the OS gives up.
    ///
    /// Default: 10 seconds.
    pub dial_timeout: Option<Duration>,

    /// Capacity of the dial result mailbox. When full, posting a new result
    /// evicts the oldest one.
    ///
    /// Default: 4.
    pub result_capacity: usize,

    /// Treat a transport that dies while `Connected` as a failed dial
    /// (record "connection lost", back off, retry). When `false` a dead
    /// transport is only noticed by sends and explicit connect requests.
    ///
    /// Default: `false`.
    pub reconnect_on_drop: bool,

    /// Queue sizing for every transport the orchestrator opens.
    pub transport: TransportConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:8080/ws".to_string(),
            retry_backoff: Duration::from_secs(2),
            dial_timeout: Some(Duration::from_secs(10)),
            result_capacity: 4,
            reconnect_on_drop: false,
            transport: TransportConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Default settings pointed at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dial_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_reconnect_on_drop(mut self, enabled: bool) -> Self {
        self.reconnect_on_drop = enabled;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Fixes values that would break the orchestrator.
    ///
    /// Called by [`Orchestrator::new`](crate::Orchestrator::new). Rules:
    /// - `result_capacity` is at least 1.
    /// - A zero `dial_timeout` (every dial would time out) becomes the default.
    /// - Transport capacities are at least 1.
    pub fn validated(mut self) -> Self {
        if self.result_capacity == 0 {
            tracing::warn!("result_capacity is 0, clamping to 1");
            self.result_capacity = 1;
        }
        if self.dial_timeout == Some(Duration::ZERO) {
            let fallback = Self::default().dial_timeout;
            tracing::warn!(?fallback, "dial_timeout is zero, using default");
            self.dial_timeout = fallback;
        }
        if self.retry_backoff.is_zero() {
            tracing::warn!("retry_backoff is zero, failed dials retry every tick");
        }
        self.transport = self.transport.validated();
        self
    }
}
