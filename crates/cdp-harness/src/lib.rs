//! Deterministic scripted-peer harness for driving [`cdp_core::Session`]
//! directly, without a real socket.
//!
//! Grounded on the reference codebase's own connection tests (hand-built
//! frames fed straight to the state machine) rather than its full
//! App/Bridge simulation driver, since the session core here has no UI
//! layer to simulate around: a [`ScriptedPeer`] plays the role the
//! reference's `SimDriver` plays for its App/Bridge stack, but one level
//! lower, directly against the handshake state machine.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use cdp_core::{AppRegistry, ChannelHandler, Environment};
use cdp_crypto::{Cryptor, EncryptionInfo, compute_thumbprint};
use cdp_proto::{
    AdditionalHeader, CommonHeader, ConnectionMessage, Frame, MessageType, payloads::connection::ConnectRequest,
    payloads::connection::ConnectResponse,
};

/// Seeded, byte-popping [`Environment`] for hermetic scenario tests: given
/// the same seed, every call to [`Environment::random_bytes`] returns the
/// same sequence.
#[derive(Clone)]
pub struct SimEnv {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SimEnv {
    /// Build an environment whose RNG output is entirely determined by `seed`.
    #[must_use]
    pub fn seeded(seed: u8) -> Self {
        Self { bytes: Arc::new(Mutex::new(vec![seed; 8192])) }
    }
}

impl Environment for SimEnv {
    type Instant = std::time::Duration;

    fn now(&self) -> Self::Instant {
        std::time::Duration::ZERO
    }

    async fn sleep(&self, _duration: std::time::Duration) {}

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut source = self.bytes.lock().expect("lock not poisoned");
        for byte in buffer.iter_mut() {
            *byte = source.pop().unwrap_or(0x42);
        }
    }

    fn local_ip(&self) -> String {
        "127.0.0.1".to_string()
    }
}

/// A hand-assembled peer that talks directly to a [`cdp_core::Session`]:
/// holds its own keypair and nonce, derives the same shared-secret cryptor
/// the session derives, and can seal or open frames on either side of the
/// handshake.
pub struct ScriptedPeer {
    key: EncryptionInfo,
    remote: Option<EncryptionInfo>,
    cryptor: Option<Cryptor>,
    sequence_number: u32,
}

impl ScriptedPeer {
    /// Build a peer with a fresh keypair and nonce drawn from `env`.
    #[must_use]
    pub fn new(env: &SimEnv) -> Self {
        let mut scalar = [0u8; 32];
        env.random_bytes(&mut scalar);
        let mut nonce = [0u8; 64];
        env.random_bytes(&mut nonce);
        #[allow(clippy::expect_used)]
        let key = EncryptionInfo::create(scalar, nonce).expect("seeded scalar is a valid P-256 key");
        Self { key, remote: None, cryptor: None, sequence_number: 0 }
    }

    /// This peer's 64-byte handshake nonce.
    #[must_use]
    pub fn nonce(&self) -> [u8; 64] {
        self.key.nonce()
    }

    /// This peer's P-256 public key as uncompressed affine coordinates.
    #[must_use]
    pub fn public_key_xy(&self) -> ([u8; 32], [u8; 32]) {
        self.key.public_key_xy()
    }

    /// Build the unencrypted `ConnectRequest` frame that opens a handshake,
    /// addressed to local/remote session id `0` (first contact).
    #[must_use]
    pub fn connect_request_frame(&self) -> Frame {
        let (public_key_x, public_key_y) = self.public_key_xy();
        let message = ConnectionMessage::ConnectRequest(ConnectRequest {
            public_key_x,
            public_key_y,
            nonce: self.nonce(),
        });
        let header = CommonHeader::new(MessageType::Connect, 0, 0);
        #[allow(clippy::expect_used)]
        Frame::new(header, vec![], message.encode().expect("encodes")).expect("small payload always fits")
    }

    /// Consume the session's `ConnectResponse`, deriving the same
    /// shared-secret cryptor the session holds.
    ///
    /// # Panics
    ///
    /// If `response`'s public key isn't a valid P-256 point (never true for
    /// a response actually produced by [`cdp_core::Session`]).
    pub fn complete_handshake(&mut self, response: &ConnectResponse) {
        #[allow(clippy::expect_used)]
        let remote = EncryptionInfo::from_remote(response.public_key_x, response.public_key_y, response.nonce)
            .expect("session always advertises a valid point");
        #[allow(clippy::expect_used)]
        let shared_secret = self.key.generate_shared_secret(&remote).expect("local key always holds a scalar");
        self.cryptor = Some(Cryptor::new(&shared_secret));
        self.remote = Some(remote);
    }

    /// The device-authentication thumbprint the session will accept:
    /// `SHA-256(session_nonce || this_peer's_nonce)`, matching what the
    /// session computes as `(local.nonce, remote.nonce)` from its side.
    ///
    /// # Panics
    ///
    /// If called before [`Self::complete_handshake`].
    #[must_use]
    pub fn device_auth_thumbprint(&self) -> [u8; 32] {
        #[allow(clippy::expect_used)]
        let remote = self.remote.as_ref().expect("handshake must complete before authenticating");
        compute_thumbprint(&remote.nonce(), &self.nonce())
    }

    fn next_sequence_number(&mut self) -> u32 {
        let sequence_number = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        sequence_number
    }

    /// Encrypt and seal `plaintext` into a single-fragment frame built from
    /// `header` (caller sets `msg_type`/`session_id`/`request_id`/
    /// `channel_id`; this fills in the sequence number and fragment
    /// fields), allocating the next sequence number from this peer's own
    /// counter. Returns the frame and its HMAC trailer.
    ///
    /// # Panics
    ///
    /// If called before [`Self::complete_handshake`].
    pub fn seal(
        &mut self,
        header: CommonHeader,
        additional_headers: Vec<AdditionalHeader>,
        plaintext: Vec<u8>,
    ) -> (Frame, Vec<u8>) {
        let sequence_number = self.next_sequence_number();
        self.seal_fragment(header, additional_headers, plaintext, sequence_number, 0, 1)
    }

    /// Encrypt and seal one fragment of a (possibly multi-fragment) message
    /// under an explicit `sequence_number` shared by every fragment of the
    /// same message, per spec.md 4.D - unlike [`Self::seal`], this doesn't
    /// touch this peer's own sequence counter, since the caller is choosing
    /// the sequence number itself.
    ///
    /// # Panics
    ///
    /// If called before [`Self::complete_handshake`].
    pub fn seal_fragment(
        &self,
        mut header: CommonHeader,
        additional_headers: Vec<AdditionalHeader>,
        plaintext: Vec<u8>,
        sequence_number: u32,
        fragment_index: u16,
        fragment_count: u16,
    ) -> (Frame, Vec<u8>) {
        #[allow(clippy::expect_used)]
        let cryptor = self.cryptor.as_ref().expect("handshake must complete before sealing a frame");
        header.set_sequence_number(sequence_number);
        header.set_fragment_index(fragment_index);
        header.set_fragment_count(fragment_count);

        let ciphertext = cryptor.encrypt(&plaintext, sequence_number);
        #[allow(clippy::expect_used)]
        let frame = Frame::new(header, additional_headers, ciphertext).expect("small payload always fits");

        let mut aad = frame.header.to_bytes().to_vec();
        #[allow(clippy::expect_used)]
        aad.extend_from_slice(&cdp_proto::encode_additional_headers(&frame.additional_headers).expect("encodes"));
        let hmac_trailer = cryptor.seal_hmac(&aad, &frame.payload, cdp_crypto::HMAC_SIZE);

        (frame, hmac_trailer)
    }

    /// Decrypt a frame (and its trailer) the session sent back.
    ///
    /// # Panics
    ///
    /// If called before [`Self::complete_handshake`], or if the frame
    /// doesn't authenticate.
    #[must_use]
    pub fn open(&self, frame: &Frame, hmac_trailer: &[u8]) -> Vec<u8> {
        #[allow(clippy::expect_used)]
        let cryptor = self.cryptor.as_ref().expect("handshake must complete before opening a frame");
        let mut aad = frame.header.to_bytes().to_vec();
        #[allow(clippy::expect_used)]
        aad.extend_from_slice(&cdp_proto::encode_additional_headers(&frame.additional_headers).expect("encodes"));
        #[allow(clippy::expect_used)]
        cryptor.decrypt(&aad, &frame.payload, hmac_trailer, frame.header.sequence_number()).expect("authentic frame")
    }
}

/// A channel handler that records every payload it's handed, for scenario
/// assertions.
#[derive(Default)]
pub struct RecordingHandler {
    /// Payloads delivered to this handler, in delivery order.
    pub received: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl ChannelHandler for RecordingHandler {
    #[allow(clippy::expect_used)]
    async fn handle(&self, payload: Bytes) {
        self.received.lock().expect("lock not poisoned").push(payload);
    }
}

/// An [`AppRegistry`] backed by a plain map, for tests that need specific
/// `(app_id, app_name)` pairs to resolve to a handler.
#[derive(Default)]
pub struct MapRegistry {
    /// Registered applications, keyed by `(app_id, app_name)`.
    pub apps: HashMap<(String, String), Arc<dyn ChannelHandler>>,
}

impl MapRegistry {
    /// Register a handler under `(app_id, app_name)`.
    pub fn register(&mut self, app_id: impl Into<String>, app_name: impl Into<String>, handler: Arc<dyn ChannelHandler>) {
        self.apps.insert((app_id.into(), app_name.into()), handler);
    }
}

impl AppRegistry for MapRegistry {
    fn lookup(&self, app_id: &str, app_name: &str) -> Option<Arc<dyn ChannelHandler>> {
        self.apps.get(&(app_id.to_string(), app_name.to_string())).cloned()
    }
}
