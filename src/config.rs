//! Session configuration.
//!
//! Everything a [`Session`](crate::Session) needs is injected through
//! [`SessionConfig`]: the GATT identifiers, the timing constants, and the
//! retry policies. Configurations can be built fluently or loaded from JSON
//! (durations in milliseconds, missing fields take their defaults).
//!
//! # Example
//!
//! ```
//! use hublink::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::new()
//!     .request_timeout(Duration::from_secs(60))
//!     .device_notification_interval(1000);
//! assert_eq!(config.request_timeout, Duration::from_secs(60));
//!
//! let config = SessionConfig::from_json(r#"{ "request_timeout": 2000 }"#).unwrap();
//! assert_eq!(config.request_timeout, Duration::from_millis(2000));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::retry::{Backoff, RetryPolicy, DEFAULT_WRITE_ATTEMPTS};

/// Hub service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fd02_0000_1000_8000_00805f9b34fb);

/// Characteristic the hub receives on (host writes).
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000fd02_0001_1000_8000_00805f9b34fb);

/// Characteristic the hub transmits on (host subscribes).
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000fd02_0002_1000_8000_00805f9b34fb);

/// Default interval for device state notifications.
pub const DEFAULT_DEVICE_NOTIFICATION_INTERVAL_MS: u16 = 5000;

/// Default time to scan for a hub.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a correlated response. Flash writes on the hub
/// can be slow, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bound on a single characteristic write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period of the stale request sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default age after which the sweep rejects a pending request.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6 * 60);

/// Default capacity of the outbound frame queue.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 64;

/// Default capacity of the unsolicited event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub service_uuid: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
    /// Interval requested for device state notifications on connect.
    pub device_notification_interval_ms: u16,
    #[serde(with = "duration_ms")]
    pub scan_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Bound on one packet write attempt.
    #[serde(with = "duration_ms")]
    pub write_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub sweep_interval: Duration,
    #[serde(with = "duration_ms")]
    pub stale_after: Duration,
    /// Applied to each connect step.
    pub connect_retry: RetryPolicy,
    /// Applied to each packet write.
    pub write_retry: RetryPolicy,
    /// Upper bound for an inbound frame awaiting its delimiter.
    pub max_frame_size: usize,
    pub write_queue_capacity: usize,
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(HubError::Config("request_timeout must be positive".to_string()));
        }
        if self.write_timeout.is_zero() {
            return Err(HubError::Config("write_timeout must be positive".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(HubError::Config("sweep_interval must be positive".to_string()));
        }
        if self.stale_after.is_zero() {
            return Err(HubError::Config("stale_after must be positive".to_string()));
        }
        if self.write_queue_capacity == 0 || self.event_capacity == 0 {
            return Err(HubError::Config("channel capacities must be positive".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(HubError::Config("max_frame_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    pub fn characteristics(mut self, write: Uuid, notify: Uuid) -> Self {
        self.write_characteristic = write;
        self.notify_characteristic = notify;
        self
    }

    /// Set the device notification interval (milliseconds).
    pub fn device_notification_interval(mut self, interval_ms: u16) -> Self {
        self.device_notification_interval_ms = interval_ms;
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bound on a single packet write. A write that does not finish
    /// in time counts as a failed attempt.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the sweep period and the age at which pending requests go stale.
    pub fn stale_sweep(mut self, interval: Duration, stale_after: Duration) -> Self {
        self.sweep_interval = interval;
        self.stale_after = stale_after;
        self
    }

    pub fn connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    pub fn write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            write_characteristic: WRITE_CHARACTERISTIC_UUID,
            notify_characteristic: NOTIFY_CHARACTERISTIC_UUID,
            device_notification_interval_ms: DEFAULT_DEVICE_NOTIFICATION_INTERVAL_MS,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            connect_retry: RetryPolicy::default(),
            write_retry: RetryPolicy::new(
                DEFAULT_WRITE_ATTEMPTS,
                Backoff::Linear {
                    step: Duration::from_millis(50),
                },
            ),
            max_frame_size: crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uuids() {
        let config = SessionConfig::default();
        assert_eq!(
            config.service_uuid.to_string(),
            "0000fd02-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            config.write_characteristic.to_string(),
            "0000fd02-0001-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            config.notify_characteristic.to_string(),
            "0000fd02-0002-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_default_validates() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_configuration() {
        let config = SessionConfig::new()
            .request_timeout(Duration::from_secs(1))
            .stale_sweep(Duration::from_secs(2), Duration::from_secs(3))
            .device_notification_interval(100)
            .connect_retry(RetryPolicy::once());

        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
        assert_eq!(config.stale_after, Duration::from_secs(3));
        assert_eq!(config.device_notification_interval_ms, 100);
        assert_eq!(config.connect_retry.max_attempts, 1);
    }

    #[test]
    fn test_from_json_partial() {
        let config = SessionConfig::from_json(
            r#"{
                "service_uuid": "0000fd02-0000-1000-8000-00805f9b34fb",
                "sweep_interval": 500,
                "connect_retry": { "max_attempts": 5, "backoff": { "kind": "none" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.sweep_interval, Duration::from_millis(500));
        assert_eq!(config.connect_retry.max_attempts, 5);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_from_json_rejects_zero_timeout() {
        let result = SessionConfig::from_json(r#"{ "request_timeout": 0 }"#);
        assert!(matches!(result, Err(HubError::Config(_))));
    }

    #[test]
    fn test_zero_write_timeout_rejected() {
        let config = SessionConfig::new().write_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(HubError::Config(_))));

        let config = SessionConfig::from_json(r#"{ "write_timeout": 250 }"#).unwrap();
        assert_eq!(config.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_from_json_invalid() {
        let result = SessionConfig::from_json("{ not json");
        assert!(matches!(result, Err(HubError::Json(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }
}
