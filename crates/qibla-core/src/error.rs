//! Centralized error types for the Qibla application.
//!
//! This module provides a typed error hierarchy that:
//! - Enables precise error handling throughout the codebase
//! - Provides user-friendly messages suitable for display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Positioning or compass failure, carrying the locate crate's user message.
    #[error("Location error: {0}")]
    Location(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Recover a typed cause from an `anyhow` chain, falling back to `Other`.
    pub fn classify(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ConfigError>() {
            Ok(config) => return AppError::Config(config),
            Err(err) => err,
        };
        match err.downcast::<std::io::Error>() {
            Ok(io) => AppError::Io(io),
            Err(err) => AppError::Other(err),
        }
    }

    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Location(msg) => msg,
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let net_err = NetworkError::Timeout;
        let app_err: AppError = net_err.into();
        assert!(matches!(app_err, AppError::Network(NetworkError::Timeout)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Network(NetworkError::Timeout);
        assert_eq!(
            app_err.user_message(),
            "The request timed out. Please try again."
        );
    }

    #[test]
    fn test_server_error_messages_split_on_5xx() {
        let upstream = NetworkError::ServerError {
            status: 503,
            message: "down".into(),
        };
        let client = NetworkError::ServerError {
            status: 404,
            message: "missing".into(),
        };
        assert!(upstream.user_message().contains("later"));
        assert_eq!(client.user_message(), "The request failed. Please try again.");
    }

    #[test]
    fn test_classify_recovers_config_error_through_context() {
        use anyhow::Context;

        let result: Result<(), ConfigError> = Err(ConfigError::ParseError("bad".into()));
        let err = result.context("Failed to parse config.toml").unwrap_err();

        let app_err = AppError::classify(err);
        assert!(matches!(app_err, AppError::Config(ConfigError::ParseError(_))));
        assert_eq!(
            app_err.user_message(),
            "Configuration file is malformed. Check your settings."
        );
    }

    #[test]
    fn test_classify_recovers_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let app_err = AppError::classify(anyhow::Error::new(io));
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_classify_falls_back_to_other() {
        let app_err = AppError::classify(anyhow::anyhow!("something odd"));
        assert!(matches!(app_err, AppError::Other(_)));
        assert_eq!(
            app_err.user_message(),
            "An unexpected error occurred. Please try again."
        );
    }

    #[test]
    fn test_location_message_passes_through() {
        let err = AppError::Location("Location access denied by user.".into());
        assert_eq!(err.user_message(), "Location access denied by user.");
    }
}
