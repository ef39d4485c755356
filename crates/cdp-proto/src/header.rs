//! Common frame header: fixed-size, zero-copy, Big Endian network byte order.
//!
//! The header carries everything needed to route and reassemble a frame
//! without touching the (possibly encrypted) payload: session id, sequence
//! number, fragment position, channel id, and the declared payload size. The
//! ordered list of additional-header TLVs immediately follows the fixed part
//! and is sized by `additional_headers_size`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Top-level message kind carried in [`CommonHeader::msg_type`].
///
/// Selects which sub-protocol (if any) parses the payload: `Connect` and
/// `Control` frames carry a tagged payload handled by this crate;
/// `Session` frames carry opaque application bytes handled by the
/// reassembler; anything else is logged and dropped by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Handshake / connection-management sub-protocol.
    Connect,
    /// Control-plane sub-protocol (channel open, etc).
    Control,
    /// Session-plane application data (fragmented, reassembled by sequence number).
    Session,
    /// Reliability-layer acknowledgement. Out of scope; logged and dropped.
    ReliabilityResponse,
    /// Any value not recognized by this implementation.
    Unknown(u8),
}

impl MessageType {
    const CONNECT: u8 = 1;
    const CONTROL: u8 = 2;
    const SESSION: u8 = 3;
    const RELIABILITY_RESPONSE: u8 = 4;

    /// Decode from the raw wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            Self::CONNECT => Self::Connect,
            Self::CONTROL => Self::Control,
            Self::SESSION => Self::Session,
            Self::RELIABILITY_RESPONSE => Self::ReliabilityResponse,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the raw wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Connect => Self::CONNECT,
            Self::Control => Self::CONTROL,
            Self::Session => Self::SESSION,
            Self::ReliabilityResponse => Self::RELIABILITY_RESPONSE,
            Self::Unknown(raw) => raw,
        }
    }
}

/// Fixed 46-byte frame header (Big Endian network byte order).
///
/// Followed on the wire by `additional_headers_size` bytes of TLV data, then
/// `payload_size` bytes of payload (plaintext or AES-CBC ciphertext), then -
/// when a cryptor is active - an HMAC-SHA256 trailer whose length the
/// handshake negotiated out of band (see `cdp-crypto::Cryptor`).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CommonHeader {
    sig: [u8; 4],
    version: u8,
    pub(crate) msg_type: u8,
    flags: [u8; 2],
    pub(crate) payload_size: [u8; 4],
    session_id: [u8; 8],
    sequence_number: [u8; 4],
    fragment_index: [u8; 2],
    fragment_count: [u8; 2],
    request_id: [u8; 8],
    channel_id: [u8; 8],
    pub(crate) additional_headers_size: [u8; 2],
}

impl CommonHeader {
    /// Size of the fixed portion of the header.
    pub const SIZE: usize = 46;

    /// Magic signature identifying a CDP frame.
    pub const SIG: [u8; 4] = *b"CDP1";

    /// Current wire version.
    pub const VERSION: u8 = 1;

    /// Maximum payload size accepted by this implementation (16 MB).
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// The host-role flag bit within the low 32 bits of the composite session id.
    pub const SESSION_ID_HOST_FLAG: u32 = 1 << 31;

    /// Build a fresh header for the given message type, session and channel.
    #[must_use]
    pub fn new(msg_type: MessageType, session_id: u64, channel_id: u64) -> Self {
        Self {
            sig: Self::SIG,
            version: Self::VERSION,
            msg_type: msg_type.to_u8(),
            flags: [0, 0],
            payload_size: [0; 4],
            session_id: session_id.to_be_bytes(),
            sequence_number: [0; 4],
            fragment_index: [0; 2],
            fragment_count: [0; 2],
            request_id: [0; 8],
            channel_id: channel_id.to_be_bytes(),
            additional_headers_size: [0; 2],
        }
    }

    /// Parse a header from the front of `bytes`. Does not consume the TLV
    /// section or payload; callers use the returned header's declared sizes
    /// to locate them.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than [`Self::SIZE`] bytes are available.
    /// - [`ProtocolError::InvalidSignature`] if the signature doesn't match.
    /// - [`ProtocolError::UnsupportedVersion`] if the version byte is unrecognized.
    /// - [`ProtocolError::PayloadTooLarge`] if the declared payload size exceeds the maximum.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if header.sig != Self::SIG {
            return Err(ProtocolError::InvalidSignature);
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        let payload_size = header.payload_size();
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize to a fixed-size byte array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Message type byte, decoded.
    #[must_use]
    pub fn msg_type(&self) -> MessageType {
        MessageType::from_u8(self.msg_type)
    }

    /// Set the message type.
    pub fn set_msg_type(&mut self, msg_type: MessageType) {
        self.msg_type = msg_type.to_u8();
    }

    /// Raw flags bitfield.
    #[must_use]
    pub fn flags(&self) -> u16 {
        u16::from_be_bytes(self.flags)
    }

    /// Set the raw flags bitfield.
    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags.to_be_bytes();
    }

    /// Declared payload length in bytes (excludes the HMAC trailer).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Set the declared payload length.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }

    /// 64-bit composite session id: `(local << 32) | host_flag | remote`.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        u64::from_be_bytes(self.session_id)
    }

    /// Set the composite session id.
    pub fn set_session_id(&mut self, session_id: u64) {
        self.session_id = session_id.to_be_bytes();
    }

    /// Originator's local session id (bits 63..32).
    #[must_use]
    pub fn originator_local_session_id(&self) -> u32 {
        (self.session_id() >> 32) as u32
    }

    /// Originator's view of the peer's local session id (bits 30..0), with
    /// the host-role flag masked off.
    #[must_use]
    pub fn originator_remote_session_id(&self) -> u32 {
        (self.session_id() as u32) & !Self::SESSION_ID_HOST_FLAG
    }

    /// Set the originator's view of the peer's local session id (bits 30..0),
    /// leaving the host-role flag and the high half untouched.
    ///
    /// Used once, when a responder assigns its own local session id into the
    /// reply to a peer's first frame (whose low half arrives as `0`).
    pub fn set_originator_remote_session_id(&mut self, value: u32) {
        let flag = (self.session_id() as u32) & Self::SESSION_ID_HOST_FLAG;
        let high = self.session_id() >> 32;
        let low = (value & !Self::SESSION_ID_HOST_FLAG) | flag;
        self.set_session_id((high << 32) | u64::from(low));
    }

    /// The host-role flag bit (bit 31 of the low half).
    #[must_use]
    pub fn host_role_flag(&self) -> bool {
        (self.session_id() as u32) & Self::SESSION_ID_HOST_FLAG != 0
    }

    /// Flip the host-role flag bit, leaving the rest of the session id intact.
    ///
    /// Used to correct the originator bit on an outbound copy of a received
    /// header so replies carry the right side of the conversation.
    pub fn correct_client_session_bit(&mut self) {
        let low = (self.session_id() as u32) ^ Self::SESSION_ID_HOST_FLAG;
        let high = (self.session_id() >> 32) as u32;
        self.set_session_id((u64::from(high) << 32) | u64::from(low));
    }

    /// Sequence number of the (possibly fragmented) message this frame belongs to.
    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        u32::from_be_bytes(self.sequence_number)
    }

    /// Set the sequence number.
    pub fn set_sequence_number(&mut self, value: u32) {
        self.sequence_number = value.to_be_bytes();
    }

    /// Index of this fragment within its message (0-based).
    #[must_use]
    pub fn fragment_index(&self) -> u16 {
        u16::from_be_bytes(self.fragment_index)
    }

    /// Set the fragment index.
    pub fn set_fragment_index(&mut self, value: u16) {
        self.fragment_index = value.to_be_bytes();
    }

    /// Total number of fragments in this message.
    #[must_use]
    pub fn fragment_count(&self) -> u16 {
        u16::from_be_bytes(self.fragment_count)
    }

    /// Set the fragment count.
    pub fn set_fragment_count(&mut self, value: u16) {
        self.fragment_count = value.to_be_bytes();
    }

    /// Request id for request/reply correlation (0 for unsolicited frames,
    /// and zeroed on outbound control replies per the channel-open contract).
    #[must_use]
    pub fn request_id(&self) -> u64 {
        u64::from_be_bytes(self.request_id)
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, value: u64) {
        self.request_id = value.to_be_bytes();
    }

    /// Channel id this frame belongs to (session-plane frames only).
    #[must_use]
    pub fn channel_id(&self) -> u64 {
        u64::from_be_bytes(self.channel_id)
    }

    /// Set the channel id.
    pub fn set_channel_id(&mut self, value: u64) {
        self.channel_id = value.to_be_bytes();
    }

    /// Declared byte length of the additional-header TLV section.
    #[must_use]
    pub fn additional_headers_size(&self) -> u16 {
        u16::from_be_bytes(self.additional_headers_size)
    }

    /// Set the declared byte length of the additional-header TLV section.
    pub fn set_additional_headers_size(&mut self, value: u16) {
        self.additional_headers_size = value.to_be_bytes();
    }
}

impl std::fmt::Debug for CommonHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommonHeader")
            .field("msg_type", &self.msg_type())
            .field("flags", &self.flags())
            .field("payload_size", &self.payload_size())
            .field("session_id", &format!("{:#018x}", self.session_id()))
            .field("sequence_number", &self.sequence_number())
            .field("fragment_index", &self.fragment_index())
            .field("fragment_count", &self.fragment_count())
            .field("request_id", &self.request_id())
            .field("channel_id", &self.channel_id())
            .field("additional_headers_size", &self.additional_headers_size())
            .finish()
    }
}

impl PartialEq for CommonHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for CommonHeader {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_bytes<const N: usize>() -> impl Strategy<Value = [u8; N]> {
        prop::collection::vec(any::<u8>(), N).prop_map(|v| {
            let mut arr = [0u8; N];
            arr.copy_from_slice(&v);
            arr
        })
    }

    impl Arbitrary for CommonHeader {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                any::<u8>(),
                arbitrary_bytes::<2>(),
                0u32..=Self::MAX_PAYLOAD_SIZE,
                arbitrary_bytes::<8>(),
                arbitrary_bytes::<4>(),
                arbitrary_bytes::<2>(),
                arbitrary_bytes::<2>(),
                arbitrary_bytes::<8>(),
                arbitrary_bytes::<8>(),
                any::<u16>(),
            )
                .prop_map(
                    |(
                        msg_type,
                        flags,
                        payload_size,
                        session_id,
                        sequence_number,
                        fragment_index,
                        fragment_count,
                        request_id,
                        channel_id,
                        additional_headers_size,
                    )| Self {
                        sig: Self::SIG,
                        version: Self::VERSION,
                        msg_type,
                        flags,
                        payload_size: payload_size.to_be_bytes(),
                        session_id,
                        sequence_number,
                        fragment_index,
                        fragment_count,
                        request_id,
                        channel_id,
                        additional_headers_size: additional_headers_size.to_be_bytes(),
                    },
                )
                .boxed()
        }
    }

    #[test]
    fn header_size_is_46_bytes() {
        assert_eq!(std::mem::size_of::<CommonHeader>(), CommonHeader::SIZE);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<CommonHeader>()) {
            let bytes = header.to_bytes();
            let parsed = CommonHeader::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(&header, parsed);
        }
    }

    #[test]
    fn reject_short_buffer() {
        let short = [0u8; 10];
        assert_eq!(
            CommonHeader::from_bytes(&short),
            Err(ProtocolError::FrameTooShort { expected: 46, actual: 10 })
        );
    }

    #[test]
    fn reject_bad_signature() {
        let mut header = CommonHeader::new(MessageType::Connect, 0, 0);
        header.sig = *b"XXXX";
        let bytes = header.to_bytes();
        assert_eq!(CommonHeader::from_bytes(&bytes), Err(ProtocolError::InvalidSignature));
    }

    #[test]
    fn reject_unsupported_version() {
        let mut header = CommonHeader::new(MessageType::Connect, 0, 0);
        header.version = 0xFF;
        let bytes = header.to_bytes();
        assert_eq!(CommonHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(0xFF)));
    }

    #[test]
    fn host_role_flag_round_trips() {
        let mut header = CommonHeader::new(MessageType::Connect, 0, 0);
        header.set_session_id((7u64 << 32) | 3);
        assert!(!header.host_role_flag());
        assert_eq!(header.originator_local_session_id(), 7);
        assert_eq!(header.originator_remote_session_id(), 3);

        header.correct_client_session_bit();
        assert!(header.host_role_flag());
        assert_eq!(header.originator_local_session_id(), 7);
        assert_eq!(header.originator_remote_session_id(), 3);

        header.correct_client_session_bit();
        assert!(!header.host_role_flag());
    }

    #[test]
    fn set_originator_remote_session_id_preserves_flag_and_high_half() {
        let mut header = CommonHeader::new(MessageType::Connect, 7u64 << 32, 0);
        header.correct_client_session_bit();
        assert!(header.host_role_flag());

        header.set_originator_remote_session_id(0x0000_1234);

        assert_eq!(header.originator_local_session_id(), 7);
        assert_eq!(header.originator_remote_session_id(), 0x0000_1234);
        assert!(header.host_role_flag());
    }

    #[test]
    fn message_type_round_trips_unknown_values() {
        assert_eq!(MessageType::from_u8(9), MessageType::Unknown(9));
        assert_eq!(MessageType::Unknown(9).to_u8(), 9);
    }
}
