//! Settings error types.

use thiserror::Error;

/// Errors that make the configuration unusable.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required setting was not provided by any layer.
    #[error("{0} not set")]
    Missing(&'static str),
    /// A settings value was present but invalid.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display() {
        let err = SettingsError::Missing("$PORT");
        assert_eq!(err.to_string(), "$PORT not set");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("port out of range".to_string());
        assert_eq!(err.to_string(), "invalid settings value: port out of range");
    }
}
