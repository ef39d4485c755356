//! Fuzz target for frame header boundary conditions.
//!
//! Builds a [`CommonHeader`] byte-for-byte from structured arbitrary input,
//! tweaking each field to its own boundary values, and confirms `decode`
//! never panics and round-trips whatever it accepts.
//!
//! # Invariants
//!
//! - `payload_size > CommonHeader::MAX_PAYLOAD_SIZE` MUST return `ProtocolError::PayloadTooLarge`.
//! - A signature other than `CommonHeader::SIG` MUST return `ProtocolError::InvalidSignature`.
//! - A version other than `CommonHeader::VERSION` MUST return `ProtocolError::UnsupportedVersion`.
//! - A buffer shorter than `CommonHeader::SIZE` MUST return `ProtocolError::FrameTooShort`.
//! - All decode errors MUST be structured (never panic).

#![no_main]

use arbitrary::Arbitrary;
use cdp_proto::{CommonHeader, Frame, ProtocolError};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum SigBytes {
    Valid,
    OffByOne(u8),
    AllZeros,
    AllOnes,
    Random([u8; 4]),
}

#[derive(Debug, Clone, Arbitrary)]
enum VersionByte {
    Valid,
    Zero,
    Max,
    Random(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMaxBoundary,
    JustOverMax,
    WayOverMax,
    MaxU32,
    Random(u32),
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    sig: SigBytes,
    version: VersionByte,
    msg_type: u8,
    payload_size: PayloadSize,
    additional_headers_size: u16,
    session_id: u64,
    sequence_number: u32,
    fragment_index: u16,
    fragment_count: u16,
    request_id: u64,
    channel_id: u64,
}

fuzz_target!(|boundary: BoundaryFrame| {
    let payload_size_value = match boundary.payload_size {
        PayloadSize::Zero => 0,
        PayloadSize::Small(s) => u32::from(s),
        PayloadSize::AtMaxBoundary => CommonHeader::MAX_PAYLOAD_SIZE,
        PayloadSize::JustOverMax => CommonHeader::MAX_PAYLOAD_SIZE.saturating_add(1),
        PayloadSize::WayOverMax => CommonHeader::MAX_PAYLOAD_SIZE.saturating_add(1_000_000),
        PayloadSize::MaxU32 => u32::MAX,
        PayloadSize::Random(r) => r,
    };

    let mut buffer = vec![0u8; CommonHeader::SIZE];

    match boundary.sig {
        SigBytes::Valid => buffer[0..4].copy_from_slice(&CommonHeader::SIG),
        SigBytes::OffByOne(offset) => {
            buffer[0..4].copy_from_slice(&CommonHeader::SIG);
            let idx = (offset % 4) as usize;
            buffer[idx] = buffer[idx].wrapping_add(1);
        },
        SigBytes::AllZeros => buffer[0..4].fill(0),
        SigBytes::AllOnes => buffer[0..4].fill(0xFF),
        SigBytes::Random(bytes) => buffer[0..4].copy_from_slice(&bytes),
    }

    buffer[4] = match boundary.version {
        VersionByte::Valid => CommonHeader::VERSION,
        VersionByte::Zero => 0,
        VersionByte::Max => u8::MAX,
        VersionByte::Random(v) => v,
    };
    buffer[5] = boundary.msg_type;
    buffer[8..12].copy_from_slice(&payload_size_value.to_be_bytes());
    buffer[12..20].copy_from_slice(&boundary.session_id.to_be_bytes());
    buffer[20..24].copy_from_slice(&boundary.sequence_number.to_be_bytes());
    buffer[24..26].copy_from_slice(&boundary.fragment_index.to_be_bytes());
    buffer[26..28].copy_from_slice(&boundary.fragment_count.to_be_bytes());
    buffer[28..36].copy_from_slice(&boundary.request_id.to_be_bytes());
    buffer[36..44].copy_from_slice(&boundary.channel_id.to_be_bytes());
    buffer[44..46].copy_from_slice(&boundary.additional_headers_size.to_be_bytes());

    match CommonHeader::from_bytes(&buffer) {
        Ok(header) => {
            assert!(header.payload_size() <= CommonHeader::MAX_PAYLOAD_SIZE);
            let _ = header.originator_local_session_id();
            let _ = header.originator_remote_session_id();
            let _ = header.host_role_flag();
        },
        Err(ProtocolError::PayloadTooLarge { size, max }) => {
            assert_eq!(max, CommonHeader::MAX_PAYLOAD_SIZE as usize);
            assert!(size > max);
        },
        Err(ProtocolError::InvalidSignature | ProtocolError::UnsupportedVersion(_) | ProtocolError::FrameTooShort { .. }) => {},
        Err(_) => unreachable!("CommonHeader::from_bytes only raises the variants matched above"),
    }

    // Full-frame round trip with a small payload, for headers that parse cleanly.
    let header = CommonHeader::new(cdp_proto::MessageType::from_u8(boundary.msg_type), boundary.session_id, boundary.channel_id);
    let small_payload = vec![0xAA; 16];
    if let Ok(frame) = Frame::new(header, vec![], small_payload) {
        let mut encoded = Vec::new();
        if frame.encode(&mut encoded).is_ok() {
            if let Ok(decoded) = Frame::decode(&encoded) {
                assert_eq!(decoded.payload, frame.payload);
                assert_eq!(decoded.header.session_id(), frame.header.session_id());
                assert_eq!(decoded.header.channel_id(), frame.header.channel_id());
            }
        }
    }
});
