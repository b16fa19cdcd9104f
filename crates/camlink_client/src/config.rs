//! Configuration for the client.

use crate::error::{ClientError, ClientResult};
use std::time::Duration;

/// Default REST base of the camera control API.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/control/api/v1";

/// Default path of the event channel, relative to the base URL.
pub const DEFAULT_CHANNEL_PATH: &str = "/event/websocket";

/// Configuration for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, e.g. `http://camera:8000/control/api/v1`.
    pub base_url: String,
    /// Event channel path appended to the base URL.
    pub channel_path: String,
    /// Timeout for bulk requests.
    pub request_timeout: Duration,
    /// Reconnection behaviour.
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            channel_path: DEFAULT_CHANNEL_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Sets the event channel path.
    pub fn with_channel_path(mut self, path: impl Into<String>) -> Self {
        self.channel_path = path.into();
        self
    }

    /// Sets the bulk request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the reconnection configuration.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Joins the base URL with a resource path.
    pub fn resource_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Returns the WebSocket URL of the event channel.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; a base that already uses
    /// a WebSocket scheme is kept.
    pub fn websocket_url(&self) -> ClientResult<String> {
        let url = self.resource_url(&self.channel_path);
        if let Some(rest) = url.strip_prefix("http://") {
            Ok(format!("ws://{rest}"))
        } else if let Some(rest) = url.strip_prefix("https://") {
            Ok(format!("wss://{rest}"))
        } else if url.starts_with("ws://") || url.starts_with("wss://") {
            Ok(url)
        } else {
            Err(ClientError::InvalidUrl(self.base_url.clone()))
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Configuration for reconnect backoff.
///
/// Retries are unlimited while the session is alive.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays. Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// How long a synced connection must stay up before the backoff starts
    /// over. A connection lost sooner keeps growing the delay.
    pub stable_after: Duration,
}

impl ReconnectConfig {
    /// Creates a reconnect configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            stable_after: Duration::from_secs(1),
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets how long a synced connection must last to reset the backoff.
    pub fn with_stable_after(mut self, duration: Duration) -> Self {
        self.stable_after = duration;
        self
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

/// Exponential backoff state across consecutive failures.
///
/// Delays never decrease until [`Backoff::reset`] and never exceed
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Creates backoff state from a configuration.
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay.min(config.max_delay);
        Self {
            config,
            attempt: 0,
            current_delay,
        }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay to wait before the next attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.current_delay;

        let multiplier = self.config.backoff_multiplier.max(1.0);
        let next = self.current_delay.as_secs_f64() * multiplier;
        let max = self.config.max_delay.as_secs_f64();
        self.current_delay = Duration::from_secs_f64(next.min(max));

        delay
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.config.initial_delay.min(self.config.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("http://camera:8000/control/api/v1")
            .with_channel_path("/events")
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.channel_path, "/events");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.websocket_url().unwrap(),
            "ws://camera:8000/control/api/v1/events"
        );
    }

    #[test]
    fn resource_url_joins_slashes() {
        let config = ClientConfig::new("http://camera/control/api/v1/");
        assert_eq!(
            config.resource_url("/system"),
            "http://camera/control/api/v1/system"
        );
        assert_eq!(
            config.resource_url("system"),
            "http://camera/control/api/v1/system"
        );
    }

    #[test]
    fn websocket_url_schemes() {
        assert_eq!(
            ClientConfig::new("https://camera/api").websocket_url().unwrap(),
            "wss://camera/api/event/websocket"
        );
        assert_eq!(
            ClientConfig::new("ws://camera/api").websocket_url().unwrap(),
            "ws://camera/api/event/websocket"
        );
        assert!(matches!(
            ClientConfig::new("camera/api").websocket_url(),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let mut backoff = Backoff::new(ReconnectConfig::new(
            Duration::from_millis(100),
            Duration::from_secs(30),
        ));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn backoff_respects_cap() {
        let mut backoff = Backoff::new(
            ReconnectConfig::new(Duration::from_secs(1), Duration::from_secs(5))
                .with_backoff_multiplier(10.0),
        );

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays[0], Duration::from_secs(1));
        assert!(delays[1..].iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[test]
    fn backoff_is_monotonic_even_with_shrinking_multiplier() {
        let mut backoff = Backoff::new(
            ReconnectConfig::new(Duration::from_millis(50), Duration::from_secs(1))
                .with_backoff_multiplier(0.5),
        );

        let delays: Vec<_> = (0..10).map(|_| backoff.next_delay()).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn reconnect_defaults() {
        let config = ReconnectConfig::default().with_stable_after(Duration::from_secs(5));
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.stable_after, Duration::from_secs(5));
    }

    #[test]
    fn backoff_reset() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
