//! Errors raised while assembling [`RelaySettings`](crate::RelaySettings).

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("settings file unreadable: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or does not fit the schema.
    #[error("settings JSON rejected: {0}")]
    Json(#[from] serde_json::Error),
    /// Values parsed but contradict each other or fall out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Shorthand for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: SettingsError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, SettingsError::Io(_)));
        assert_eq!(err.to_string(), "settings file unreadable: denied");
    }

    #[test]
    fn schema_mismatch_is_json_error() {
        let err: SettingsError = serde_json::from_str::<u16>("\"port\"").unwrap_err().into();
        assert!(err.to_string().starts_with("settings JSON rejected"));
    }

    #[test]
    fn invalid_value_names_the_problem() {
        let err = SettingsError::InvalidValue("heartbeat timeout below interval".into());
        assert!(err.to_string().ends_with("heartbeat timeout below interval"));
    }
}
