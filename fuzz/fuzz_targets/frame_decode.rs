//! Fuzz target for `Frame::decode`.
//!
//! Exercises header parsing, the additional-header TLV list, and payload
//! slicing against arbitrary bytes. Must never panic; any malformed input is
//! expected to return a `ProtocolError`.

#![no_main]

use cdp_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::decode(data);
});
