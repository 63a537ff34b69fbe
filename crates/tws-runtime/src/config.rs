//! Host and client configuration.
//!
//! Durations are written in milliseconds when (de)serialized, so a config
//! can be loaded from JSON like `{"port": 14048, "retention": 300000}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tws_protocol::Wire;

/// Default retention window of a registered instance.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);
/// Default per-call execution timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout of the `~meta` liveness probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Accept connections from other machines
    pub allow_external: bool,
    /// How long an untouched instance survives
    #[serde(with = "duration_ms")]
    pub retention: Duration,
    /// Timeout of calls the host makes to callback objects
    #[serde(with = "duration_ms")]
    pub execution_timeout: Duration,
    /// Run the hosted root object on one dedicated worker
    pub affinity: bool,
    /// Log every request at debug level
    pub verbose_logging: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: Wire::DEFAULT_PORT,
            allow_external: false,
            retention: DEFAULT_RETENTION,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            affinity: false,
            verbose_logging: false,
        }
    }
}

/// Listener a client opens so servers can call objects it passes by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallbackConfig {
    pub port: u16,
    pub allow_external: bool,
    #[serde(with = "duration_ms")]
    pub retention: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port: 0,
            allow_external: false,
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(with = "duration_ms")]
    pub execution_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Enables duplex calls when set.
    pub callback: Option<CallbackConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            callback: None,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
