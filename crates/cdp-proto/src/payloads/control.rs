//! Control sub-protocol message bodies (channel lifecycle).
//!
//! `StartChannelResponse` is the one payload in this crate that is *not*
//! CBOR: its wire form is a raw 9-byte tuple (`result: u8`, `channel_id: u64`
//! BE), fixed by the literal test vector in the channel-open scenario. Every
//! other Control body is CBOR like the Connect sub-protocol.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// One-byte wire tag identifying a [`ControlMessage`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlMessageKind {
    /// [`StartChannelRequest`].
    StartChannelRequest = 1,
    /// [`StartChannelResponse`].
    StartChannelResponse = 2,
}

impl ControlMessageKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::StartChannelRequest),
            2 => Ok(Self::StartChannelResponse),
            other => Err(ProtocolError::UnknownSubMessageType(other)),
        }
    }
}

/// Request to open a channel bound to a registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartChannelRequest {
    /// Application identifier looked up in the app registry.
    pub app_id: String,
    /// Human-readable application name, also passed to the app registry.
    pub app_name: String,
}

/// Result code carried by [`StartChannelResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StartChannelResult {
    /// Channel opened; `channel_id` is valid.
    Success = 0,
    /// Channel open failed; `channel_id` is `0` and meaningless.
    Failure = 1,
}

impl StartChannelResult {
    fn from_u8(value: u8) -> Self {
        if value == 0 { Self::Success } else { Self::Failure }
    }
}

/// Reply to [`StartChannelRequest`].
///
/// Encoded as raw bytes, not CBOR: `[result: u8][channel_id: u64 BE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartChannelResponse {
    /// Outcome of the channel-open attempt.
    pub result: StartChannelResult,
    /// Newly allocated channel id. `0` when `result` is [`StartChannelResult::Failure`].
    pub channel_id: u64,
}

impl StartChannelResponse {
    const WIRE_LEN: usize = 9;

    fn encode(self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0] = self.result as u8;
        out[1..].copy_from_slice(&self.channel_id.to_be_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(ProtocolError::FrameTruncated { expected: Self::WIRE_LEN, actual: bytes.len() });
        }
        let mut channel_id_bytes = [0u8; 8];
        channel_id_bytes.copy_from_slice(&bytes[1..]);
        Ok(Self { result: StartChannelResult::from_u8(bytes[0]), channel_id: u64::from_be_bytes(channel_id_bytes) })
    }
}

/// Every message body carried by a `Control` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// [`StartChannelRequest`].
    StartChannelRequest(StartChannelRequest),
    /// [`StartChannelResponse`].
    StartChannelResponse(StartChannelResponse),
}

impl ControlMessage {
    /// Build a [`ControlMessage::StartChannelRequest`].
    #[must_use]
    pub fn start_channel_request(app_id: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self::StartChannelRequest(StartChannelRequest { app_id: app_id.into(), app_name: app_name.into() })
    }

    /// The wire tag for this variant.
    #[must_use]
    pub const fn kind(&self) -> ControlMessageKind {
        match self {
            Self::StartChannelRequest(_) => ControlMessageKind::StartChannelRequest,
            Self::StartChannelResponse(_) => ControlMessageKind::StartChannelResponse,
        }
    }

    /// Encode the tag byte followed by the body (CBOR, except
    /// `StartChannelResponse` which is raw bytes).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::CborEncode`] if CBOR serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.kind() as u8];
        match self {
            Self::StartChannelRequest(inner) => {
                ciborium::ser::into_writer(inner, &mut buf).map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
            },
            Self::StartChannelResponse(inner) => buf.extend_from_slice(&inner.encode()),
        }
        Ok(buf)
    }

    /// Decode a tag byte followed by the body.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownSubMessageType`] if the tag byte isn't
    /// recognized, [`ProtocolError::CborDecode`] if a CBOR body fails to
    /// parse, or [`ProtocolError::FrameTruncated`] if the raw
    /// `StartChannelResponse` body isn't exactly 9 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) = bytes.split_first().ok_or(ProtocolError::UnknownSubMessageType(0))?;
        match ControlMessageKind::from_u8(tag)? {
            ControlMessageKind::StartChannelRequest => Ok(Self::StartChannelRequest(
                ciborium::de::from_reader(body).map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            )),
            ControlMessageKind::StartChannelResponse => {
                Ok(Self::StartChannelResponse(StartChannelResponse::decode(body)?))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_channel_request_round_trips() {
        let msg = ControlMessage::start_channel_request("com.example.app", "Example App");
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded[0], ControlMessageKind::StartChannelRequest as u8);
        assert_eq!(ControlMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn start_channel_response_matches_literal_test_vector() {
        let msg = ControlMessage::StartChannelResponse(StartChannelResponse {
            result: StartChannelResult::Success,
            channel_id: 1,
        });
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded, vec![
            ControlMessageKind::StartChannelResponse as u8,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x01,
        ]);
        assert_eq!(ControlMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn start_channel_response_rejects_short_body() {
        let bytes = [ControlMessageKind::StartChannelResponse as u8, 0, 0, 0];
        assert!(matches!(ControlMessage::decode(&bytes), Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn rejects_unknown_tag() {
        let bytes = [0xFFu8];
        assert_eq!(ControlMessage::decode(&bytes), Err(ProtocolError::UnknownSubMessageType(0xFF)));
    }
}
