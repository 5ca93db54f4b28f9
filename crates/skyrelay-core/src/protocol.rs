//! Wire protocol.
//!
//! Every frame is a JSON object discriminated by its `type` field. Three
//! control types are interpreted by the relay; every other type is opaque
//! and forwarded verbatim, classified by [`MessageKind`] so the access policy
//! can decide whether a subscriber may send it.

use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::SessionKey;

/// Producer registration tag.
pub const REGISTER_PRODUCER: &str = "register_producer";
/// Subscriber join tag.
pub const JOIN_SESSION: &str = "join_session";
/// Privilege escalation tag.
pub const REQUEST_ACCESS: &str = "request_access";

/// Error text sent when a session key is unknown or unusable.
pub const INVALID_ID_MESSAGE: &str = "Invalid ID";
/// Error text sent when a connection tries to identify twice.
pub const ALREADY_IDENTIFIED_MESSAGE: &str = "Connection already identified";
/// Default hint attached to `access_required`.
pub const DEFAULT_ACCESS_HINT: &str = "Enter password to access controls";

// ─────────────────────────────────────────────────────────────────────────────
// MessageKind
// ─────────────────────────────────────────────────────────────────────────────

/// Type of a forwardable (non-control) message.
///
/// Known simulator commands and telemetry streams get their own variant;
/// anything else is carried as [`MessageKind::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Engage or disengage an autopilot system.
    AutopilotToggle,
    /// Set an autopilot target (altitude, heading, vertical speed, speed).
    AutopilotSet,
    /// Pause or resume the simulation.
    PauseToggle,
    /// Save the current flight.
    SaveGame,
    /// Raise or lower the landing gear.
    ToggleGear,
    /// Arm or disarm spoilers.
    ToggleSpoilers,
    /// Extend or retract the speedbrake.
    ToggleSpeedbrake,
    /// Set or release the parking brake.
    ToggleParkingBrake,
    /// Step the flaps up or down.
    ChangeFlaps,
    /// Move the throttle.
    ThrottleControl,
    /// Switch an exterior light.
    ToggleLight,
    /// Switch a cabin system.
    ToggleCabin,
    /// Switch between GPS and NAV guidance.
    ToggleNavMode,
    /// Position, attitude, and instrument telemetry.
    FlightData,
    /// Autopilot mode and target readout.
    AutopilotState,
    /// Nearby AI traffic positions.
    AiTraffic,
    /// Save succeeded.
    SaveComplete,
    /// Save failed.
    SaveError,
    /// Any other type tag.
    Other(String),
}

impl MessageKind {
    /// Classify a raw `type` tag.
    pub fn from_type(tag: &str) -> Self {
        match tag {
            "autopilot_toggle" => Self::AutopilotToggle,
            "autopilot_set" => Self::AutopilotSet,
            "pause_toggle" => Self::PauseToggle,
            "save_game" => Self::SaveGame,
            "toggle_gear" => Self::ToggleGear,
            "toggle_spoilers" => Self::ToggleSpoilers,
            "toggle_speedbrake" => Self::ToggleSpeedbrake,
            "toggle_parking_brake" => Self::ToggleParkingBrake,
            "change_flaps" => Self::ChangeFlaps,
            "throttle_control" => Self::ThrottleControl,
            "toggle_light" => Self::ToggleLight,
            "toggle_cabin" => Self::ToggleCabin,
            "toggle_nav_mode" => Self::ToggleNavMode,
            "flight_data" => Self::FlightData,
            "autopilot_state" => Self::AutopilotState,
            "ai_traffic" => Self::AiTraffic,
            "save_complete" => Self::SaveComplete,
            "save_error" => Self::SaveError,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AutopilotToggle => "autopilot_toggle",
            Self::AutopilotSet => "autopilot_set",
            Self::PauseToggle => "pause_toggle",
            Self::SaveGame => "save_game",
            Self::ToggleGear => "toggle_gear",
            Self::ToggleSpoilers => "toggle_spoilers",
            Self::ToggleSpeedbrake => "toggle_speedbrake",
            Self::ToggleParkingBrake => "toggle_parking_brake",
            Self::ChangeFlaps => "change_flaps",
            Self::ThrottleControl => "throttle_control",
            Self::ToggleLight => "toggle_light",
            Self::ToggleCabin => "toggle_cabin",
            Self::ToggleNavMode => "toggle_nav_mode",
            Self::FlightData => "flight_data",
            Self::AutopilotState => "autopilot_state",
            Self::AiTraffic => "ai_traffic",
            Self::SaveComplete => "save_complete",
            Self::SaveError => "save_error",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Secrets a producer attaches to its session.
#[derive(Debug)]
pub struct Credentials {
    /// Owner secret; always accepted.
    pub primary: SecretString,
    /// Guest secret; accepted only while `secondary_enabled`.
    pub secondary: SecretString,
    /// Whether the guest secret grants access.
    pub secondary_enabled: bool,
}

impl Credentials {
    /// Build credentials. When `secondary_enabled` is not given, the guest
    /// secret is enabled iff it is non-empty.
    pub fn new(primary: String, secondary: String, secondary_enabled: Option<bool>) -> Self {
        let enabled = secondary_enabled.unwrap_or(!secondary.is_empty());
        Self {
            primary: SecretString::from(primary),
            secondary: SecretString::from(secondary),
            secondary_enabled: enabled,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterProducerFrame {
    key: String,
    primary_secret: String,
    #[serde(default)]
    secondary_secret: String,
    #[serde(default)]
    secondary_secret_enabled: Option<bool>,
}

#[derive(Deserialize)]
struct JoinSessionFrame {
    key: String,
}

#[derive(Deserialize)]
struct RequestAccessFrame {
    secret: String,
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum InboundMessage {
    /// Producer claims (or reclaims) a session key.
    RegisterProducer {
        /// Session key.
        key: SessionKey,
        /// Secrets subscribers may present.
        credentials: Credentials,
    },
    /// Subscriber attaches to an existing session.
    JoinSession {
        /// Session key.
        key: SessionKey,
    },
    /// Subscriber asks for command privileges.
    RequestAccess {
        /// Presented secret.
        secret: SecretString,
    },
    /// Opaque message to pass through.
    Forward {
        /// Classified type tag.
        kind: MessageKind,
        /// Original frame text, forwarded byte-for-byte.
        raw: Arc<str>,
    },
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedMessage(format!("invalid JSON: {e}")))?;

        let tag = match value.as_object().map(|m| m.get("type")) {
            None => return Err(malformed("expected a JSON object")),
            Some(Some(Value::String(tag))) => tag.clone(),
            Some(_) => return Err(malformed("missing string `type` field")),
        };

        match tag.as_str() {
            REGISTER_PRODUCER => {
                let frame: RegisterProducerFrame = decode(value, REGISTER_PRODUCER)?;
                Ok(Self::RegisterProducer {
                    key: SessionKey::from(frame.key),
                    credentials: Credentials::new(
                        frame.primary_secret,
                        frame.secondary_secret,
                        frame.secondary_secret_enabled,
                    ),
                })
            }
            JOIN_SESSION => {
                let frame: JoinSessionFrame = decode(value, JOIN_SESSION)?;
                Ok(Self::JoinSession {
                    key: SessionKey::from(frame.key),
                })
            }
            REQUEST_ACCESS => {
                let frame: RequestAccessFrame = decode(value, REQUEST_ACCESS)?;
                Ok(Self::RequestAccess {
                    secret: SecretString::from(frame.secret),
                })
            }
            other => Ok(Self::Forward {
                kind: MessageKind::from_type(other),
                raw: Arc::from(text),
            }),
        }
    }

    /// Tag used for logging.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::RegisterProducer { .. } => REGISTER_PRODUCER,
            Self::JoinSession { .. } => JOIN_SESSION,
            Self::RequestAccess { .. } => REQUEST_ACCESS,
            Self::Forward { kind, .. } => kind.as_str(),
        }
    }
}

fn malformed(reason: &str) -> RelayError {
    RelayError::MalformedMessage(reason.to_owned())
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, tag: &str) -> Result<T, RelayError> {
    serde_json::from_value(value)
        .map_err(|e| RelayError::MalformedMessage(format!("invalid {tag}: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Messages the relay itself originates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Producer registration acknowledged.
    Registered {
        /// The registered key.
        key: SessionKey,
    },
    /// Subscriber joined.
    #[serde(rename_all = "camelCase")]
    Joined {
        /// Whether a producer is attached right now.
        producer_online: bool,
    },
    /// Request rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Access request accepted.
    AccessGranted,
    /// Access request rejected.
    AccessDenied,
    /// Privileged command dropped for lack of access.
    AccessRequired {
        /// User-facing prompt.
        hint: String,
    },
    /// The session's producer disconnected.
    ProducerOffline,
}

impl ServerMessage {
    /// `error{"Invalid ID"}`.
    pub fn invalid_id() -> Self {
        Self::Error {
            message: INVALID_ID_MESSAGE.to_owned(),
        }
    }

    /// `error{"Connection already identified"}`.
    pub fn already_identified() -> Self {
        Self::Error {
            message: ALREADY_IDENTIFIED_MESSAGE.to_owned(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
