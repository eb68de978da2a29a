//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`Client`](crate::Client).
///
/// Durations are (de)serialized as integer milliseconds so the struct can
/// be embedded in a JSON or TOML config file:
///
/// ```json
/// { "ping_interval_ms": 3000, "response_timeout_ms": 10000, "log_messages": false }
/// ```
///
/// Missing keys fall back to [`ClientConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Gap between keepalive pings.
    ///
    /// Default: 3 seconds.
    #[serde(rename = "ping_interval_ms", with = "millis")]
    pub ping_interval: Duration,

    /// How long a call waits for its response before failing with
    /// `ResponseTimeout`. The request itself is not retracted.
    ///
    /// Default: 10 seconds.
    #[serde(rename = "response_timeout_ms", with = "millis")]
    pub response_timeout: Duration,

    /// Echo every successful decoded response at `info`.
    ///
    /// Default: true.
    pub log_messages: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(3),
            response_timeout: Duration::from_secs(10),
            log_messages: true,
        }
    }
}

impl ClientConfig {
    /// Replaces zero durations with their defaults.
    ///
    /// A zero ping interval would make `tokio::time::interval` panic and a
    /// zero timeout would fail every call, so neither is allowed through.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.ping_interval.is_zero() {
            tracing::warn!(
                default = ?defaults.ping_interval,
                "ping_interval is zero, using default"
            );
            self.ping_interval = defaults.ping_interval;
        }
        if self.response_timeout.is_zero() {
            tracing::warn!(
                default = ?defaults.response_timeout,
                "response_timeout is zero, using default"
            );
            self.response_timeout = defaults.response_timeout;
        }
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(3));
        assert_eq!(config.response_timeout, Duration::from_secs(10));
        assert!(config.log_messages);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"response_timeout_ms": 50}"#).unwrap();
        assert_eq!(config.response_timeout, Duration::from_millis(50));
        assert_eq!(config.ping_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_serializes_as_millis() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(json["ping_interval_ms"], 3000);
        assert_eq!(json["response_timeout_ms"], 10000);
        assert_eq!(json["log_messages"], true);
    }

    #[test]
    fn test_validated_replaces_zero_durations() {
        let config = ClientConfig {
            ping_interval: Duration::ZERO,
            response_timeout: Duration::ZERO,
            log_messages: false,
        }
        .validated();
        assert_eq!(config.ping_interval, Duration::from_secs(3));
        assert_eq!(config.response_timeout, Duration::from_secs(10));
        assert!(!config.log_messages);
    }
}
