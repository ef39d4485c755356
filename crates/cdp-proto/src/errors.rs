//! Protocol-level decode/encode errors.

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while parsing or serializing frames and sub-protocol payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer shorter than the fixed header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum required length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Declared payload/additional-headers length runs past the buffer end.
    #[error("frame truncated: expected {expected} more bytes, got {actual}")]
    FrameTruncated {
        /// Declared remaining length.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Header signature didn't match [`crate::CommonHeader::SIG`].
    #[error("invalid frame signature")]
    InvalidSignature,

    /// Header version byte isn't one this implementation understands.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Declared payload size exceeds [`crate::CommonHeader::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Declared or actual size.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },

    /// A single additional-header entry or the whole list is too large to encode.
    #[error("additional header section too large: {size} bytes")]
    AdditionalHeaderTooLarge {
        /// Size that was rejected.
        size: usize,
    },

    /// The additional-header TLV list ran out of bytes mid-entry.
    #[error("additional header list truncated")]
    AdditionalHeaderTruncated,

    /// A sub-protocol message type byte wasn't recognized.
    #[error("unrecognized sub-message type: {0:#04x}")]
    UnknownSubMessageType(u8),

    /// CBOR serialization of a payload body failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization of a payload body failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
