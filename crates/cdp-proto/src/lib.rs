//! CDP wire format.
//!
//! Frame headers are raw, zero-copy, big-endian binary for cheap parsing on
//! the hot path; sub-protocol payloads use CBOR for type safety and forward
//! compatibility, with a leading one-byte tag distinguishing message kinds
//! that share a `CommonHeader::msg_type`.
//!
//! # Layout
//!
//! ```text
//! [CommonHeader: 46 bytes]
//! [additional headers: additional_headers_size bytes, TLV list]
//! [payload: payload_size bytes]
//! [HMAC trailer: present once a cryptor is live, length negotiated out of band]
//! ```
//!
//! This crate only knows about the first three sections; the HMAC trailer is
//! `cdp-crypto`'s concern.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod additional_header;
pub mod errors;
pub mod frame;
pub mod header;
pub mod payloads;

pub use additional_header::{AdditionalHeader, decode_additional_headers, encode_additional_headers};
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{CommonHeader, MessageType};
pub use payloads::{ConnectionMessage, ConnectionMessageKind, ControlMessage, ControlMessageKind};
