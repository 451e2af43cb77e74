//! Error handling for the Robocar protocol
//!
//! All fallible operations in this crate return [`Result`]. Errors from
//! underlying libraries are converted automatically with `thiserror`.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
///
/// # Automatic Conversions
///
/// - `std::io::Error` → `ProtocolError::Io`
/// - `serde_json::Error` → `ProtocolError::Json`
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (pairing store reads and writes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport operation (advertise, discover, connect, send) failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ProtocolError {
    /// Check if this error is recoverable (the operation can be retried)
    ///
    /// Transport failures are transient by nature; store corruption is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Transport(_) | ProtocolError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProtocolError::Transport("out of radio range".to_string());
        assert_eq!(error.to_string(), "Transport error: out of radio range");
    }

    #[test]
    fn test_io_error_conversion() {
        use std::io::{Error, ErrorKind};

        let io_error = Error::new(ErrorKind::NotFound, "file not found");
        let protocol_error: ProtocolError = io_error.into();

        assert!(matches!(protocol_error, ProtocolError::Io(_)));
        assert!(protocol_error.is_recoverable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json = r#"{"invalid json"#;
        let json_error = serde_json::from_str::<serde_json::Value>(json).unwrap_err();
        let protocol_error: ProtocolError = json_error.into();

        assert!(matches!(protocol_error, ProtocolError::Json(_)));
        assert!(!protocol_error.is_recoverable());
    }
}
