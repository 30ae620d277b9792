//! Error handling for Reverie
//!
//! Per-segment faults (`Fetch`, `Decode`) are recovered by the player; the
//! rest surface to the caller.

use thiserror::Error;

/// Result type alias for Reverie operations
pub type Result<T> = std::result::Result<T, ReverieError>;

/// Main error type for Reverie operations
#[derive(Error, Debug)]
pub enum ReverieError {
    // Segment Errors
    #[error("Failed to fetch audio '{reference}': {reason}")]
    Fetch { reference: String, reason: String },

    #[error("Invalid audio data: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Session Errors
    #[error("Audio context unavailable: {reason}")]
    Context { reason: String },

    #[error("No segments to play")]
    NoSegments,

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReverieError {
    pub(crate) fn fetch(reference: impl Into<String>, reason: impl ToString) -> Self {
        ReverieError::Fetch {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        ReverieError::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn context(reason: impl Into<String>) -> Self {
        ReverieError::Context {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ReverieError::Fetch { .. } => "FETCH_ERROR",
            ReverieError::Decode { .. } => "DECODE_ERROR",
            ReverieError::Context { .. } => "CONTEXT_ERROR",
            ReverieError::NoSegments => "NO_SEGMENTS",
            ReverieError::InvalidConfig { .. } => "INVALID_CONFIG",
            ReverieError::Io(_) => "IO_ERROR",
            ReverieError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable without user interaction
    ///
    /// A recoverable error only costs the affected segment; the session
    /// keeps playing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReverieError::Fetch { .. } | ReverieError::Decode { .. }
        )
    }

    /// Get a user-facing message, or None for faults that stay silent
    pub fn user_message(&self) -> Option<String> {
        match self {
            ReverieError::Context { .. } => Some(
                "Audio could not start. Tap play again to allow sound output.".to_string(),
            ),
            ReverieError::NoSegments => {
                Some("This session has nothing to play yet.".to_string())
            }
            ReverieError::InvalidConfig { reason } => {
                Some(format!("The engine configuration is invalid: {}", reason))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ReverieError::fetch("https://x/a.wav", "timeout").error_code(),
            "FETCH_ERROR"
        );
        assert_eq!(ReverieError::decode("bad header").error_code(), "DECODE_ERROR");
        assert_eq!(ReverieError::context("closed").error_code(), "CONTEXT_ERROR");
        assert_eq!(ReverieError::NoSegments.error_code(), "NO_SEGMENTS");
    }

    #[test]
    fn test_segment_faults_are_recoverable() {
        assert!(ReverieError::fetch("a", "404").is_recoverable());
        assert!(ReverieError::decode("not audio").is_recoverable());
        assert!(!ReverieError::context("suspended").is_recoverable());
        assert!(!ReverieError::NoSegments.is_recoverable());
    }

    #[test]
    fn test_segment_faults_are_silent() {
        assert!(ReverieError::fetch("a", "404").user_message().is_none());
        assert!(ReverieError::context("no gesture").user_message().is_some());
    }

    #[test]
    fn test_display_includes_reference() {
        let err = ReverieError::fetch("seg-3.wav", "connection reset");
        let msg = err.to_string();
        assert!(msg.contains("seg-3.wav"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ReverieError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
