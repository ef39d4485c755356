//! Fuzz target for the `Connect`/`Control` sub-protocol payload decoders.
//!
//! `ConnectionMessage::decode` and `ControlMessage::decode` both read a
//! one-byte kind tag followed by a CBOR body (`StartChannelResponse` is the
//! one raw-bytes exception). Feeds the same arbitrary bytes at both decoders
//! to catch malformed tags, truncated CBOR, and type confusion between the
//! two sub-protocols. Must never panic.

#![no_main]

use cdp_proto::{ConnectionMessage, ControlMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = ConnectionMessage::decode(data);
    let _ = ControlMessage::decode(data);
});
