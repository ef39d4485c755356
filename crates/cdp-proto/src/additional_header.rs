//! Additional-header TLV list appended after the fixed [`CommonHeader`](crate::CommonHeader).
//!
//! Each entry is `type: u8, length: u16 (BE), value: [u8; length]`. The list
//! has no entry count prefix; callers consume entries until they've read
//! `CommonHeader::additional_headers_size` bytes.

use bytes::{Buf, BufMut};

use crate::errors::{ProtocolError, Result};

/// A single additional-header TLV entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalHeader {
    /// Entry type tag.
    pub header_type: u8,
    /// Entry payload.
    pub value: Vec<u8>,
}

impl AdditionalHeader {
    /// The fixed, undocumented additional header attached to every
    /// `StartChannelResponse`. Its meaning is unknown; preserved verbatim.
    pub const CHANNEL_RESPONSE_MAGIC: (u8, [u8; 4]) = (129, [0x30, 0x00, 0x00, 0x01]);

    /// Build the fixed channel-response additional header.
    #[must_use]
    pub fn channel_response_magic() -> Self {
        let (header_type, value) = Self::CHANNEL_RESPONSE_MAGIC;
        Self { header_type, value: value.to_vec() }
    }

    fn encoded_len(&self) -> usize {
        1 + 2 + self.value.len()
    }

    fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let len = u16::try_from(self.value.len())
            .map_err(|_| ProtocolError::AdditionalHeaderTooLarge { size: self.value.len() })?;
        dst.put_u8(self.header_type);
        dst.put_u16(len);
        dst.put_slice(&self.value);
        Ok(())
    }
}

/// Encode a list of additional headers, returning the encoded bytes.
///
/// # Errors
///
/// [`ProtocolError::AdditionalHeaderTooLarge`] if any single entry's value
/// exceeds `u16::MAX` bytes, or the total exceeds `u16::MAX` bytes.
pub fn encode_additional_headers(headers: &[AdditionalHeader]) -> Result<Vec<u8>> {
    let total: usize = headers.iter().map(AdditionalHeader::encoded_len).sum();
    if total > u16::MAX as usize {
        return Err(ProtocolError::AdditionalHeaderTooLarge { size: total });
    }
    let mut buf = Vec::with_capacity(total);
    for header in headers {
        header.encode(&mut buf)?;
    }
    Ok(buf)
}

/// Decode a list of additional headers from exactly `bytes`.
///
/// # Errors
///
/// [`ProtocolError::AdditionalHeaderTruncated`] if an entry's declared
/// length runs past the end of `bytes`.
pub fn decode_additional_headers(mut bytes: &[u8]) -> Result<Vec<AdditionalHeader>> {
    let mut headers = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 3 {
            return Err(ProtocolError::AdditionalHeaderTruncated);
        }
        let header_type = bytes.get_u8();
        let len = bytes.get_u16() as usize;
        if bytes.len() < len {
            return Err(ProtocolError::AdditionalHeaderTruncated);
        }
        let value = bytes[..len].to_vec();
        bytes.advance(len);
        headers.push(AdditionalHeader { header_type, value });
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_list() {
        let encoded = encode_additional_headers(&[]).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(decode_additional_headers(&encoded).unwrap(), vec![]);
    }

    #[test]
    fn round_trips_channel_response_magic() {
        let headers = vec![AdditionalHeader::channel_response_magic()];
        let encoded = encode_additional_headers(&headers).unwrap();
        assert_eq!(encoded, vec![129, 0x00, 0x04, 0x30, 0x00, 0x00, 0x01]);
        assert_eq!(decode_additional_headers(&encoded).unwrap(), headers);
    }

    #[test]
    fn round_trips_multiple_entries() {
        let headers = vec![
            AdditionalHeader { header_type: 1, value: vec![] },
            AdditionalHeader { header_type: 2, value: vec![9, 9, 9] },
        ];
        let encoded = encode_additional_headers(&headers).unwrap();
        assert_eq!(decode_additional_headers(&encoded).unwrap(), headers);
    }

    #[test]
    fn rejects_truncated_list() {
        let bytes = [1u8, 0x00, 0x05, 1, 2];
        assert_eq!(decode_additional_headers(&bytes), Err(ProtocolError::AdditionalHeaderTruncated));
    }
}
