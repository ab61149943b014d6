//! Error types for the pensiun signing toolkit.
//!
//! All fallible library operations return `Result<T, Report<PensiunError>>`.
//! The variant names the failing concern; context is attached to the report.

use derive_more::Display;

#[derive(Debug, Display)]
pub enum PensiunError {
    /// Settings are missing, malformed or failed validation.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// Key material is absent, malformed or of the wrong type.
    #[display("Key material error: {message}")]
    KeyMaterial { message: String },

    /// Producing a signature failed.
    #[display("Signing error: {message}")]
    Signing { message: String },

    /// A token or signature did not verify.
    #[display("Verification error: {message}")]
    Verification { message: String },

    /// Payload could not be turned into its canonical form.
    #[display("Canonicalization error: {message}")]
    Canonicalization { message: String },

    /// Reading or writing the key store failed.
    #[display("Key store error: {message}")]
    KeyStore { message: String },

    /// Transport level HTTP failure (connection, timeout, unreadable body).
    #[display("HTTP error: {message}")]
    Http { message: String },

    /// The remote API answered with a non-success status.
    #[display("API error: HTTP {status} - {message}")]
    Api { status: u16, message: String },

    /// Caller supplied an invalid request.
    #[display("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl core::error::Error for PensiunError {}

impl PensiunError {
    /// HTTP status of an [`PensiunError::Api`] error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
