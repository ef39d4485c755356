//! Connect sub-protocol message bodies.
//!
//! `CommonHeader::msg_type` only distinguishes `Connect` frames from
//! `Control`/`Session` ones; it doesn't say which of the handshake messages
//! below a given Connect frame carries. Each [`ConnectionMessage`] therefore
//! encodes itself as a one-byte [`ConnectionMessageKind`] tag followed by a
//! CBOR body, and decodes by reading the tag first.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Result code carried by [`ConnectResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ConnectResult {
    /// Handshake accepted; authentication is still pending.
    Pending = 1,
    /// Handshake rejected.
    Rejected = 2,
}

/// Peer-originated request to begin a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// P-256 public key, X coordinate.
    pub public_key_x: [u8; 32],
    /// P-256 public key, Y coordinate.
    pub public_key_y: [u8; 32],
    /// Peer's 64-byte handshake nonce.
    pub nonce: [u8; 64],
}

/// Reply to [`ConnectRequest`], carrying our own key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Handshake result.
    pub result: ConnectResult,
    /// Our 64-byte handshake nonce.
    pub nonce: [u8; 64],
    /// Our P-256 public key, X coordinate.
    pub public_key_x: [u8; 32],
    /// Our P-256 public key, Y coordinate.
    pub public_key_y: [u8; 32],
    /// HMAC trailer size this session will use, in bytes.
    pub hmac_size: u32,
    /// Maximum fragment size this session will use, in bytes.
    pub message_fragment_size: u32,
}

/// Device-level authentication request (certificate-backed thumbprint check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthRequest {
    /// Thumbprint computed by the peer over `(local_nonce, remote_nonce)`.
    pub thumbprint: Vec<u8>,
    /// Peer's certificate-backed authentication payload.
    pub auth_payload: Vec<u8>,
}

/// Reply to [`DeviceAuthRequest`] / [`UserDeviceAuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthResponse {
    /// Our certificate-backed authentication payload.
    pub auth_payload: Vec<u8>,
}

/// User-context variant of [`DeviceAuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeviceAuthRequest {
    /// User identifier this authentication is scoped to.
    pub user_id: u64,
    /// Thumbprint computed by the peer over `(local_nonce, remote_nonce)`.
    pub thumbprint: Vec<u8>,
    /// Peer's certificate-backed authentication payload.
    pub auth_payload: Vec<u8>,
}

/// Reply to [`UserDeviceAuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeviceAuthResponse {
    /// Our certificate-backed authentication payload.
    pub auth_payload: Vec<u8>,
}

/// Transport kinds advertised during transport upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// Bluetooth RFCOMM.
    Bluetooth,
    /// TCP/IP.
    Tcp,
}

/// A transport endpoint advertised in [`UpgradeRequest`] / [`UpgradeResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEndpoint {
    /// Transport kind.
    pub transport: TransportKind,
    /// Host address (IP or Bluetooth address, transport-dependent).
    pub host: String,
    /// Port, when the transport is port-addressed.
    pub port: u16,
}

/// Request to begin a transport upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    /// Endpoints the peer is offering to connect through.
    pub endpoints: Vec<TransportEndpoint>,
}

/// Reply advertising our own upgrade endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeResponse {
    /// Endpoints we're offering.
    pub endpoints: Vec<TransportEndpoint>,
}

/// Finalizes a previously negotiated transport upgrade. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpgradeFinalization;

/// Acknowledges [`UpgradeFinalization`]. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpgradeFinalizationResponse;

/// Reports that a transport upgrade attempt failed. No reply is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeFailure {
    /// Platform result code describing the failure.
    pub hresult: i32,
}

/// Opaque request echoed back verbatim by [`TransportConfirmation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Opaque request body.
    pub body: Vec<u8>,
}

/// Echo reply to [`TransportRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfirmation {
    /// Echo of the request body.
    pub body: Vec<u8>,
}

/// Signals that authentication is complete from the peer's perspective.
/// Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthDoneRequest;

/// Reply to [`AuthDoneRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDoneResponse {
    /// Platform result code; `0` indicates success.
    pub hresult: i32,
}

/// Opaque device metadata exchanged once a session is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoMessage {
    /// Opaque device-info payload.
    pub info: Vec<u8>,
}

/// Acknowledgement-only reply to [`DeviceInfoMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceInfoResponseMessage;

/// One-byte wire tag identifying a [`ConnectionMessage`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionMessageKind {
    /// [`ConnectRequest`].
    ConnectRequest = 1,
    /// [`ConnectResponse`].
    ConnectResponse = 2,
    /// [`DeviceAuthRequest`].
    DeviceAuthRequest = 3,
    /// [`DeviceAuthResponse`].
    DeviceAuthResponse = 4,
    /// [`UserDeviceAuthRequest`].
    UserDeviceAuthRequest = 5,
    /// [`UserDeviceAuthResponse`].
    UserDeviceAuthResponse = 6,
    /// [`UpgradeRequest`].
    UpgradeRequest = 7,
    /// [`UpgradeResponse`].
    UpgradeResponse = 8,
    /// [`UpgradeFinalization`].
    UpgradeFinalization = 9,
    /// [`UpgradeFinalizationResponse`].
    UpgradeFinalizationResponse = 10,
    /// [`UpgradeFailure`].
    UpgradeFailure = 11,
    /// [`TransportRequest`].
    TransportRequest = 12,
    /// [`TransportConfirmation`].
    TransportConfirmation = 13,
    /// [`AuthDoneRequest`].
    AuthDoneRequest = 14,
    /// [`AuthDoneResponse`].
    AuthDoneResponse = 15,
    /// [`DeviceInfoMessage`].
    DeviceInfoMessage = 16,
    /// [`DeviceInfoResponseMessage`].
    DeviceInfoResponseMessage = 17,
}

impl ConnectionMessageKind {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::ConnectRequest,
            2 => Self::ConnectResponse,
            3 => Self::DeviceAuthRequest,
            4 => Self::DeviceAuthResponse,
            5 => Self::UserDeviceAuthRequest,
            6 => Self::UserDeviceAuthResponse,
            7 => Self::UpgradeRequest,
            8 => Self::UpgradeResponse,
            9 => Self::UpgradeFinalization,
            10 => Self::UpgradeFinalizationResponse,
            11 => Self::UpgradeFailure,
            12 => Self::TransportRequest,
            13 => Self::TransportConfirmation,
            14 => Self::AuthDoneRequest,
            15 => Self::AuthDoneResponse,
            16 => Self::DeviceInfoMessage,
            17 => Self::DeviceInfoResponseMessage,
            other => return Err(ProtocolError::UnknownSubMessageType(other)),
        })
    }
}

/// Every message body carried by a `Connect` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    /// [`ConnectRequest`].
    ConnectRequest(ConnectRequest),
    /// [`ConnectResponse`].
    ConnectResponse(ConnectResponse),
    /// [`DeviceAuthRequest`].
    DeviceAuthRequest(DeviceAuthRequest),
    /// [`DeviceAuthResponse`].
    DeviceAuthResponse(DeviceAuthResponse),
    /// [`UserDeviceAuthRequest`].
    UserDeviceAuthRequest(UserDeviceAuthRequest),
    /// [`UserDeviceAuthResponse`].
    UserDeviceAuthResponse(UserDeviceAuthResponse),
    /// [`UpgradeRequest`].
    UpgradeRequest(UpgradeRequest),
    /// [`UpgradeResponse`].
    UpgradeResponse(UpgradeResponse),
    /// [`UpgradeFinalization`].
    UpgradeFinalization(UpgradeFinalization),
    /// [`UpgradeFinalizationResponse`].
    UpgradeFinalizationResponse(UpgradeFinalizationResponse),
    /// [`UpgradeFailure`].
    UpgradeFailure(UpgradeFailure),
    /// [`TransportRequest`].
    TransportRequest(TransportRequest),
    /// [`TransportConfirmation`].
    TransportConfirmation(TransportConfirmation),
    /// [`AuthDoneRequest`].
    AuthDoneRequest(AuthDoneRequest),
    /// [`AuthDoneResponse`].
    AuthDoneResponse(AuthDoneResponse),
    /// [`DeviceInfoMessage`].
    DeviceInfoMessage(DeviceInfoMessage),
    /// [`DeviceInfoResponseMessage`].
    DeviceInfoResponseMessage(DeviceInfoResponseMessage),
}

impl ConnectionMessage {
    /// The wire tag for this variant.
    #[must_use]
    pub const fn kind(&self) -> ConnectionMessageKind {
        match self {
            Self::ConnectRequest(_) => ConnectionMessageKind::ConnectRequest,
            Self::ConnectResponse(_) => ConnectionMessageKind::ConnectResponse,
            Self::DeviceAuthRequest(_) => ConnectionMessageKind::DeviceAuthRequest,
            Self::DeviceAuthResponse(_) => ConnectionMessageKind::DeviceAuthResponse,
            Self::UserDeviceAuthRequest(_) => ConnectionMessageKind::UserDeviceAuthRequest,
            Self::UserDeviceAuthResponse(_) => ConnectionMessageKind::UserDeviceAuthResponse,
            Self::UpgradeRequest(_) => ConnectionMessageKind::UpgradeRequest,
            Self::UpgradeResponse(_) => ConnectionMessageKind::UpgradeResponse,
            Self::UpgradeFinalization(_) => ConnectionMessageKind::UpgradeFinalization,
            Self::UpgradeFinalizationResponse(_) => ConnectionMessageKind::UpgradeFinalizationResponse,
            Self::UpgradeFailure(_) => ConnectionMessageKind::UpgradeFailure,
            Self::TransportRequest(_) => ConnectionMessageKind::TransportRequest,
            Self::TransportConfirmation(_) => ConnectionMessageKind::TransportConfirmation,
            Self::AuthDoneRequest(_) => ConnectionMessageKind::AuthDoneRequest,
            Self::AuthDoneResponse(_) => ConnectionMessageKind::AuthDoneResponse,
            Self::DeviceInfoMessage(_) => ConnectionMessageKind::DeviceInfoMessage,
            Self::DeviceInfoResponseMessage(_) => ConnectionMessageKind::DeviceInfoResponseMessage,
        }
    }

    /// Encode the tag byte followed by the CBOR body.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::CborEncode`] if CBOR serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.kind() as u8];
        let result = match self {
            Self::ConnectRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::ConnectResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::DeviceAuthRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::DeviceAuthResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UserDeviceAuthRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UserDeviceAuthResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UpgradeRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UpgradeResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UpgradeFinalization(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UpgradeFinalizationResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::UpgradeFailure(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::TransportRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::TransportConfirmation(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::AuthDoneRequest(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::AuthDoneResponse(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::DeviceInfoMessage(inner) => ciborium::ser::into_writer(inner, &mut buf),
            Self::DeviceInfoResponseMessage(inner) => ciborium::ser::into_writer(inner, &mut buf),
        };
        result.map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a tag byte followed by a CBOR body.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownSubMessageType`] if the tag byte isn't
    /// recognized, or [`ProtocolError::CborDecode`] if the body doesn't parse.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) =
            bytes.split_first().ok_or(ProtocolError::UnknownSubMessageType(0))?;
        let kind = ConnectionMessageKind::from_u8(tag)?;
        let decode_err = |e: ciborium::de::Error<_>| ProtocolError::CborDecode(e.to_string());
        Ok(match kind {
            ConnectionMessageKind::ConnectRequest => {
                Self::ConnectRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::ConnectResponse => {
                Self::ConnectResponse(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::DeviceAuthRequest => {
                Self::DeviceAuthRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::DeviceAuthResponse => {
                Self::DeviceAuthResponse(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UserDeviceAuthRequest => {
                Self::UserDeviceAuthRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UserDeviceAuthResponse => {
                Self::UserDeviceAuthResponse(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UpgradeRequest => {
                Self::UpgradeRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UpgradeResponse => {
                Self::UpgradeResponse(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UpgradeFinalization => {
                Self::UpgradeFinalization(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::UpgradeFinalizationResponse => Self::UpgradeFinalizationResponse(
                ciborium::de::from_reader(body).map_err(decode_err)?,
            ),
            ConnectionMessageKind::UpgradeFailure => {
                Self::UpgradeFailure(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::TransportRequest => {
                Self::TransportRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::TransportConfirmation => {
                Self::TransportConfirmation(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::AuthDoneRequest => {
                Self::AuthDoneRequest(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::AuthDoneResponse => {
                Self::AuthDoneResponse(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::DeviceInfoMessage => {
                Self::DeviceInfoMessage(ciborium::de::from_reader(body).map_err(decode_err)?)
            },
            ConnectionMessageKind::DeviceInfoResponseMessage => Self::DeviceInfoResponseMessage(
                ciborium::de::from_reader(body).map_err(decode_err)?,
            ),
        })
    }
}
