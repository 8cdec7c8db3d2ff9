// src/error.rs
//! Unified error handling for EMG Stream
//!
//! Each layer owns a narrow error enum (`SourceError`, `HandshakeError`,
//! `ConfigError`); they all convert into [`EmgError`] so callers can use `?`
//! across layer boundaries. Frame rejection is deliberately absent here: an
//! invalid frame is an ordinary [`FrameFault`](crate::protocol::FrameFault)
//! value, not an error.

use crate::acquisition::SessionState;
use crate::config::ConfigError;
use crate::hal::{HandshakeError, SourceError};
use thiserror::Error;

/// Unified error type for the crate
#[derive(Debug, Error)]
pub enum EmgError {
    /// Configuration could not be loaded or failed validation
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The byte source failed
    #[error("byte source error: {0}")]
    Source(#[from] SourceError),

    /// The device rejected or did not answer a command
    #[error("device handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Envelope window parameters are unusable
    #[error("invalid envelope parameters: window {window}, overlap {overlap}")]
    InvalidEnvelope {
        /// Window length in samples
        window: usize,
        /// Overlap in samples
        overlap: usize,
    },

    /// Operation not allowed in the current session state
    #[error("invalid session transition: {operation} not allowed in state {state:?}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },
}

/// Result alias used throughout the crate
pub type EmgResult<T> = Result<T, EmgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_display() {
        let error = EmgError::InvalidEnvelope { window: 0, overlap: 3 };
        let formatted = error.to_string();
        assert!(formatted.contains("window 0"));
        assert!(formatted.contains("overlap 3"));
    }

    #[test]
    fn test_source_error_conversion() {
        let error: EmgError = SourceError::Closed.into();
        assert!(matches!(error, EmgError::Source(SourceError::Closed)));
        assert!(error.to_string().starts_with("byte source error"));
    }

    #[test]
    fn test_invalid_state_display() {
        let error = EmgError::InvalidState {
            operation: "start",
            state: SessionState::Streaming,
        };
        assert!(error.to_string().contains("start"));
        assert!(error.to_string().contains("Streaming"));
    }
}
