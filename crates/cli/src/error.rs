//! CLI error types.

use error_stack::Report;
use pensiun_common::error::PensiunError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Key loading or signing failed
    #[error("Signing error: {0}")]
    Signing(String),
    /// Signature did not verify
    #[error("Verification failed: {0}")]
    Verification(String),
    /// Remote API rejected the request
    #[error("API error: HTTP {status} - {body}")]
    Api { status: u16, body: String },
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),
    /// Invalid command line input
    #[error("Invalid input: {0}")]
    Input(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<Report<PensiunError>> for CliError {
    fn from(report: Report<PensiunError>) -> Self {
        log::debug!("{:?}", report);
        let message = report.to_string();
        match report.current_context() {
            PensiunError::Configuration { .. } => CliError::Config(message),
            PensiunError::KeyMaterial { .. }
            | PensiunError::Signing { .. }
            | PensiunError::Canonicalization { .. }
            | PensiunError::KeyStore { .. } => CliError::Signing(message),
            PensiunError::Verification { .. } => CliError::Verification(message),
            PensiunError::Api { status, message } => CliError::Api {
                status: *status,
                body: message.clone(),
            },
            PensiunError::Http { .. } => CliError::Http(message),
            PensiunError::InvalidRequest { .. } => CliError::Input(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_cli_error_display() {
        assert_eq!(
            format!("{}", CliError::Config("test".into())),
            "Configuration error: test"
        );
        assert_eq!(
            format!(
                "{}",
                CliError::Api {
                    status: 403,
                    body: "forbidden".into()
                }
            ),
            "API error: HTTP 403 - forbidden"
        );
        assert_eq!(
            format!("{}", CliError::Http("test".into())),
            "HTTP error: test"
        );
    }

    #[test]
    fn test_cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(matches!(cli_err, CliError::Io(_)));
        assert!(cli_err.source().is_some());
    }

    #[test]
    fn test_cli_error_from_report() {
        let report = Report::new(PensiunError::Api {
            status: 401,
            message: "bad signature".into(),
        });
        match CliError::from(report) {
            CliError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad signature");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }

        let report = Report::new(PensiunError::KeyMaterial {
            message: "HMAC secret is empty".into(),
        });
        assert!(matches!(CliError::from(report), CliError::Signing(_)));
    }
}
