//! Access control: which message kinds need privileges, and who gets them.

use secrecy::{ExposeSecret, SecretString};
use skyrelay_core::{Credentials, MessageKind};
use subtle::ConstantTimeEq;

use super::connection::ConnectionHandle;
use super::session::Session;

/// Outcome of an access request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    /// Secret matched; the connection is now authorized.
    Granted,
    /// Secret did not match an enabled credential.
    Denied,
}

/// Whether delivering `kind` to the producer requires prior access.
///
/// Every command that mutates simulator state is listed explicitly. No
/// wildcard arm: a new `MessageKind` variant does not compile until it is
/// classified here.
pub fn is_privileged(kind: &MessageKind) -> bool {
    match kind {
        MessageKind::AutopilotToggle
        | MessageKind::AutopilotSet
        | MessageKind::PauseToggle
        | MessageKind::SaveGame
        | MessageKind::ToggleGear
        | MessageKind::ToggleSpoilers
        | MessageKind::ToggleSpeedbrake
        | MessageKind::ToggleParkingBrake
        | MessageKind::ChangeFlaps
        | MessageKind::ThrottleControl
        | MessageKind::ToggleLight
        | MessageKind::ToggleCabin
        | MessageKind::ToggleNavMode => true,
        MessageKind::FlightData
        | MessageKind::AutopilotState
        | MessageKind::AiTraffic
        | MessageKind::SaveComplete
        | MessageKind::SaveError
        | MessageKind::Other(_) => false,
    }
}

/// Check `supplied` against the primary secret and, when enabled, the
/// secondary secret. Comparisons are constant-time.
pub fn credentials_match(credentials: &Credentials, supplied: &SecretString) -> bool {
    let supplied = supplied.expose_secret().as_bytes();
    let primary = secret_eq(credentials.primary.expose_secret().as_bytes(), supplied);
    let secondary = secret_eq(credentials.secondary.expose_secret().as_bytes(), supplied);
    primary || (credentials.secondary_enabled && secondary)
}

fn secret_eq(stored: &[u8], supplied: &[u8]) -> bool {
    bool::from(stored.ct_eq(supplied))
}

/// Validate `supplied` for `handle` against `session`'s credentials.
///
/// On success the handle is authorized for the rest of its lifetime. A
/// failed attempt leaves any existing authorization in place.
pub fn request_access(
    session: &Session,
    handle: &ConnectionHandle,
    supplied: &SecretString,
) -> AccessDecision {
    if session.with_credentials(|c| credentials_match(c, supplied)) && handle.grant_access() {
        AccessDecision::Granted
    } else {
        AccessDecision::Denied
    }
}
