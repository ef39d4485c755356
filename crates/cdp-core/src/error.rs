//! Session-core error taxonomy.
//!
//! Mirrors the reference codebase's alternate error style (hand-written
//! `Display`/`Error` impl, as in its server-side error types) rather than
//! `thiserror`, since both idioms are native to this codebase and this is
//! the boundary where the reference uses the manual one. Each variant
//! records enough context to log meaningfully without the caller
//! re-deriving it from the frame it came from.

use std::fmt;

/// Errors raised by the session registry and the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame named a `LocalSessionId` not present in the registry.
    SessionNotFound {
        /// The unrecognized local session id.
        local_session_id: u32,
    },

    /// Frame's `RemoteSessionId` didn't match the value recorded at session
    /// creation.
    SessionMismatch {
        /// Local session id the frame was addressed to.
        local_session_id: u32,
        /// Remote session id recorded for this session.
        expected_remote_session_id: u32,
        /// Remote session id the frame actually carried.
        actual_remote_session_id: u32,
    },

    /// The session is disposed; no further operations are accepted.
    SessionDisposed {
        /// The disposed session's local id.
        local_session_id: u32,
    },

    /// A message arrived that the current handshake state doesn't accept
    /// (wrong sub-type for the state, or a reply-only message arriving as a
    /// request). Treated as a security fault: after cryptor activation, an
    /// unexpected message implies either a bug or a tampering attempt.
    UnexpectedMessage {
        /// Local session id the frame belonged to.
        local_session_id: u32,
        /// Message type byte that was unexpected.
        msg_type: u8,
    },

    /// HMAC verification failed while decrypting a frame. Terminal.
    CryptoIntegrity {
        /// Local session id the frame belonged to.
        local_session_id: u32,
    },

    /// Device-authentication thumbprint didn't match `(local.nonce,
    /// remote.nonce)`. Terminal.
    InvalidThumbprint {
        /// Local session id the frame belonged to.
        local_session_id: u32,
    },

    /// A session-plane fragment's index or declared size is inconsistent
    /// with the message it's supposed to belong to. Non-terminal: the
    /// message is dropped, the session stays alive.
    ReassemblyOverflow {
        /// Local session id the frame belonged to.
        local_session_id: u32,
        /// Sequence number of the offending message.
        sequence_number: u32,
    },

    /// A session-plane frame named a channel id with no registered handler.
    /// Non-terminal: dropped and logged.
    ChannelNotFound {
        /// Local session id the frame belonged to.
        local_session_id: u32,
        /// The unrecognized channel id.
        channel_id: u64,
    },

    /// Underlying wire-format decode/encode failure.
    Protocol(cdp_proto::ProtocolError),

    /// Underlying cryptographic failure other than an HMAC mismatch (e.g.
    /// key-derivation failure, malformed remote public key). Terminal.
    Crypto(cdp_crypto::CryptoError),
}

impl SessionError {
    /// Whether this error disposes the session (terminal) or only aborts
    /// the current frame, per §7's propagation policy.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CryptoIntegrity { .. }
                | Self::InvalidThumbprint { .. }
                | Self::UnexpectedMessage { .. }
                | Self::Crypto(_)
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { local_session_id } => {
                write!(f, "session not found: {local_session_id:#x}")
            },
            Self::SessionMismatch { local_session_id, expected_remote_session_id, actual_remote_session_id } => {
                write!(
                    f,
                    "session {local_session_id:#x} remote id mismatch: expected {expected_remote_session_id:#x}, got {actual_remote_session_id:#x}"
                )
            },
            Self::SessionDisposed { local_session_id } => {
                write!(f, "session {local_session_id:#x} is disposed")
            },
            Self::UnexpectedMessage { local_session_id, msg_type } => {
                write!(f, "unexpected message type {msg_type:#04x} for session {local_session_id:#x}")
            },
            Self::CryptoIntegrity { local_session_id } => {
                write!(f, "HMAC verification failed for session {local_session_id:#x}")
            },
            Self::InvalidThumbprint { local_session_id } => {
                write!(f, "device authentication thumbprint mismatch for session {local_session_id:#x}")
            },
            Self::ReassemblyOverflow { local_session_id, sequence_number } => {
                write!(f, "fragment overflow for session {local_session_id:#x}, sequence {sequence_number}")
            },
            Self::ChannelNotFound { local_session_id, channel_id } => {
                write!(f, "unknown channel {channel_id} for session {local_session_id:#x}")
            },
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<cdp_proto::ProtocolError> for SessionError {
    fn from(err: cdp_proto::ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<cdp_crypto::CryptoError> for SessionError {
    fn from(err: cdp_crypto::CryptoError) -> Self {
        Self::Crypto(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_flagged() {
        assert!(SessionError::CryptoIntegrity { local_session_id: 1 }.is_terminal());
        assert!(SessionError::InvalidThumbprint { local_session_id: 1 }.is_terminal());
        assert!(SessionError::UnexpectedMessage { local_session_id: 1, msg_type: 1 }.is_terminal());
    }

    #[test]
    fn non_terminal_errors_are_not_flagged() {
        assert!(!SessionError::SessionNotFound { local_session_id: 1 }.is_terminal());
        assert!(!SessionError::ChannelNotFound { local_session_id: 1, channel_id: 2 }.is_terminal());
        assert!(
            !SessionError::ReassemblyOverflow { local_session_id: 1, sequence_number: 7 }.is_terminal()
        );
        assert!(!SessionError::SessionDisposed { local_session_id: 1 }.is_terminal());
    }

    #[test]
    fn display_includes_session_id() {
        let err = SessionError::SessionNotFound { local_session_id: 0xDEAD };
        assert!(err.to_string().contains("dead"));
    }
}
