//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the fields it changes.

mod logging;
mod server;
mod sessions;

pub use logging::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 3000 },
///   "sessions": { "idleTtlSecs": 3600 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener, connection limits, and heartbeat.
    pub server: ServerSettings,
    /// Session retention and access prompts.
    pub sessions: SessionSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        if self.sessions.idle_ttl_secs > 0 && self.sessions.sweep_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "sessions.sweepIntervalSecs must be at least 1 when eviction is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RelaySettings::default().validate().unwrap();
    }

    #[test]
    fn zero_queue_rejected() {
        let mut s = RelaySettings::default();
        s.server.send_queue_capacity = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn timeout_shorter_than_interval_rejected() {
        let mut s = RelaySettings::default();
        s.server.heartbeat_interval_secs = 60;
        s.server.heartbeat_timeout_secs = 30;
        assert!(s.validate().is_err());
    }

    #[test]
    fn disabled_eviction_ignores_sweep_interval() {
        let mut s = RelaySettings::default();
        s.sessions.idle_ttl_secs = 0;
        s.sessions.sweep_interval_secs = 0;
        s.validate().unwrap();
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["server"]["maxConnections"].is_number());
        assert!(json["server"]["heartbeatIntervalSecs"].is_number());
        assert!(json["sessions"]["idleTtlSecs"].is_number());
        assert!(json["sessions"]["accessHint"].is_string());
        assert!(json["logging"]["level"].is_string());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings = serde_json::from_str(r#"{"server":{"port":8080}}"#).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.host, ServerSettings::default().host);
        assert_eq!(s.sessions.idle_ttl_secs, SessionSettings::default().idle_ttl_secs);
    }
}
