//! Error taxonomy for realtime sessions.
//!
//! Credential, media and negotiation failures are fatal to the session attempt
//! that raised them and are reported to the caller. Parse and cleanup failures
//! are non-fatal: the dispatcher drops malformed messages and teardown logs
//! whatever it could not release.

use std::fmt;

/// The trusted intermediary could not provide an ephemeral credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential endpoint unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("credential endpoint returned status {0}")]
    Status(u16),
    #[error("malformed credential response: {0}")]
    Malformed(String),
}

/// Local audio input could not be acquired.
#[derive(Debug, thiserror::Error)]
pub enum MediaAccessError {
    #[error("permission to capture audio was denied: {0}")]
    PermissionDenied(String),
    #[error("no audio input device is available")]
    NoDevice,
    #[error("audio device unavailable: {0}")]
    Unavailable(String),
}

/// A failure reported by the underlying peer connection or control channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The offer/answer exchange with the remote endpoint did not complete.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("negotiation endpoint unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("negotiation endpoint returned status {0}")]
    Status(u16),
    #[error("malformed SDP answer: {0}")]
    MalformedAnswer(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// An inbound control-channel message could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse control message: {0}")]
pub struct MessageParseError(#[from] serde_json::Error);

/// One or more resources could not be released during teardown.
#[derive(Debug)]
pub struct CleanupError {
    failures: Vec<TransportError>,
}

impl CleanupError {
    /// Returns `Ok` when nothing failed, otherwise an error carrying every failure.
    pub fn from_failures(failures: Vec<TransportError>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }

    pub fn failures(&self) -> &[TransportError] {
        &self.failures
    }
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanup failed:")?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CleanupError {}

/// Any error that ends a session attempt.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        Self::Negotiation(NegotiationError::Transport(err))
    }
}
