//! Complete wire frame: fixed header + additional-header TLVs + payload.
//!
//! Layout on the wire: `[CommonHeader: 46 bytes] + [additional headers:
//! additional_headers_size bytes] + [payload: payload_size bytes]`. When a
//! cryptor is active the payload is ciphertext and an HMAC trailer follows
//! immediately after it; this crate treats that trailer as opaque bytes
//! appended by the caller (see `cdp-crypto::Cryptor`), not part of the frame
//! proper.

use bytes::{BufMut, Bytes};

use crate::{
    AdditionalHeader, CommonHeader,
    additional_header::{decode_additional_headers, encode_additional_headers},
    errors::{ProtocolError, Result},
};

/// A parsed frame: header, additional headers, and raw payload bytes.
///
/// Holds raw payload bytes, not a decoded [`crate::payloads`] value, so the
/// state machine can inspect routing fields before deciding whether (or how)
/// to decrypt and decode the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed header.
    pub header: CommonHeader,
    /// Ordered additional-header TLVs.
    pub additional_headers: Vec<AdditionalHeader>,
    /// Raw payload bytes (ciphertext if a cryptor is active for this session).
    pub payload: Bytes,
}

impl Frame {
    /// Build a new frame, filling in `payload_size` and
    /// `additional_headers_size` on the header automatically.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::AdditionalHeaderTooLarge`] if the additional-header
    /// section doesn't fit in a `u16`.
    pub fn new(
        mut header: CommonHeader,
        additional_headers: Vec<AdditionalHeader>,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let encoded_headers = encode_additional_headers(&additional_headers)?;

        #[allow(clippy::expect_used)]
        let payload_len = u32::try_from(payload.len())
            .expect("invariant: payload length fits in u32 for any payload this crate accepts");
        header.set_payload_size(payload_len);
        #[allow(clippy::expect_used)]
        let headers_len = u16::try_from(encoded_headers.len())
            .expect("invariant: checked by encode_additional_headers above");
        header.set_additional_headers_size(headers_len);

        Ok(Self { header, additional_headers, payload })
    }

    /// Encode the frame to `dst`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`CommonHeader::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > CommonHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: CommonHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&encode_additional_headers(&self.additional_headers)?);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode a frame from the front of `bytes`. Trailing bytes beyond the
    /// declared payload (e.g. an HMAC trailer) are ignored and must be
    /// consumed separately by the caller.
    ///
    /// # Errors
    ///
    /// Propagates header-parsing errors, plus
    /// [`ProtocolError::FrameTruncated`] if the additional-headers section or
    /// payload runs past the end of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *CommonHeader::from_bytes(bytes)?;

        let headers_start = CommonHeader::SIZE;
        let headers_len = header.additional_headers_size() as usize;
        let headers_end = headers_start.checked_add(headers_len).ok_or(ProtocolError::FrameTruncated {
            expected: headers_len,
            actual: bytes.len().saturating_sub(headers_start),
        })?;
        if bytes.len() < headers_end {
            return Err(ProtocolError::FrameTruncated {
                expected: headers_len,
                actual: bytes.len().saturating_sub(headers_start),
            });
        }
        let additional_headers = decode_additional_headers(&bytes[headers_start..headers_end])?;

        let payload_len = header.payload_size() as usize;
        let payload_end = headers_end.checked_add(payload_len).ok_or(ProtocolError::PayloadTooLarge {
            size: payload_len,
            max: CommonHeader::MAX_PAYLOAD_SIZE as usize,
        })?;
        if bytes.len() < payload_end {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_len,
                actual: bytes.len().saturating_sub(headers_end),
            });
        }
        let payload = Bytes::copy_from_slice(&bytes[headers_end..payload_end]);

        Ok(Self { header, additional_headers, payload })
    }

    /// Total size of the encoded header + additional headers + payload,
    /// excluding any HMAC trailer.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        CommonHeader::SIZE + self.header.additional_headers_size() as usize + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::MessageType;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (any::<CommonHeader>(), prop::collection::vec(any::<u8>(), 0..256))
                .prop_map(|(header, payload)| {
                    #[allow(clippy::expect_used)]
                    Frame::new(header, vec![], payload).expect("small payload always fits")
                })
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let mut wire = Vec::new();
            frame.encode(&mut wire).expect("should encode");
            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(frame.payload, parsed.payload);
            prop_assert_eq!(frame.additional_headers, parsed.additional_headers);
        }
    }

    #[test]
    fn frame_with_additional_headers_round_trips() {
        let header = CommonHeader::new(MessageType::Control, 0x0000_0007_0000_0003, 0);
        let headers = vec![AdditionalHeader::channel_response_magic()];
        let frame = Frame::new(header, headers.clone(), vec![0u8, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap();

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed.additional_headers, headers);
        assert_eq!(&parsed.payload[..], &[0u8, 0, 0, 0, 0, 0, 0, 0, 1][..]);
    }

    #[test]
    fn rejects_truncated_payload() {
        let header = CommonHeader::new(MessageType::Session, 1, 1);
        let frame = Frame::new(header, vec![], vec![1, 2, 3, 4]).unwrap();
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        wire.truncate(wire.len() - 2);

        assert!(matches!(Frame::decode(&wire), Err(ProtocolError::FrameTruncated { .. })));
    }
}
