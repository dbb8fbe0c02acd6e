//! Error types for the outreach-common crate.
//!
//! Configuration problems are detected once, at start-up, and reported with
//! the offending field so the operator can fix the RON file.

use std::io;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// I/O error while reading configuration or opening a configured path.
    #[error("I/O error during configuration: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidConfiguration`]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingField("api_key");
        assert_eq!(err.to_string(), "Missing required field: api_key");

        let err = ConfigError::invalid("mps_limit", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for mps_limit: must be greater than zero"
        );
    }

    #[test]
    fn test_io_error_source_is_preserved() {
        let err = ConfigError::from(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "access denied",
        ));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("access denied"));
    }
}
