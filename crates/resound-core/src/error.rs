//! Error types for Resound

use thiserror::Error;

/// The main error type for Resound operations
#[derive(Debug, Error)]
pub enum ResoundError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("Audio error: {0}")]
    AudioError(String),
}

/// Result type alias for Resound operations
pub type Result<T> = std::result::Result<T, ResoundError>;

impl From<toml::de::Error> for ResoundError {
    fn from(err: toml::de::Error) -> Self {
        ResoundError::TomlParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_error_conversion() {
        let err = toml::from_str::<toml::Value>("key = ").unwrap_err();
        let converted: ResoundError = err.into();
        assert!(matches!(converted, ResoundError::TomlParseError(_)));
    }

    #[test]
    fn test_display() {
        let err = ResoundError::AudioError("no device".into());
        assert_eq!(err.to_string(), "Audio error: no device");
    }
}
