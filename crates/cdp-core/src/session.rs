//! Component F: the session state machine.
//!
//! Grounded on the reference codebase's `Connection<I>`: `handle_frame`
//! advances the state machine purely, returning a list of [`SessionAction`]
//! values describing what the caller should do next (write a frame to the
//! socket, dispatch a reassembled message to a channel handler) rather than
//! performing any I/O itself. This keeps the handshake logic exhaustively
//! unit-testable without a real socket - `cdp-harness` drives it directly.

use std::sync::Arc;

use bytes::Bytes;
use cdp_crypto::{Cryptor, EncryptionInfo, compute_thumbprint};
use cdp_proto::{
    AdditionalHeader, CommonHeader, ConnectionMessage, ControlMessage, Frame, MessageType,
    payloads::connection::{
        AuthDoneResponse, ConnectResponse, ConnectResult, DeviceAuthResponse, DeviceInfoResponseMessage,
        TransportConfirmation, TransportEndpoint, TransportKind, UpgradeFinalizationResponse, UpgradeResponse,
        UserDeviceAuthResponse,
    },
    payloads::control::{StartChannelResponse, StartChannelResult},
};

use crate::{
    channel::{AppRegistry, ChannelHandler},
    channel_registry::ChannelRegistry,
    env::Environment,
    error::SessionError,
    reassembler::Reassembler,
};

/// Default outbound message fragment size advertised in `ConnectResponse`.
pub const DEFAULT_FRAGMENT_SIZE: usize = 16 * 1024;

/// The TCP port this implementation advertises in `UpgradeResponse`.
const UPGRADE_TCP_PORT: u16 = 5040;

/// Handshake phase of a session, per spec.md 4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Cryptor absent, remote key absent.
    AwaitingConnectRequest,
    /// Cryptor present, remote key present, peer not yet authenticated.
    AwaitingAuth,
    /// Device authenticated; transport-upgrade or auth-done flows may arrive.
    AwaitingUpgradeOrAuthDone,
    /// Session-plane and control-plane traffic flows freely.
    Established,
    /// Terminal. All operations fail with [`SessionError::SessionDisposed`].
    Disposed,
}

/// A frame this session wants sent, paired with its HMAC trailer (empty
/// before the cryptor is live, e.g. the initial `ConnectResponse`).
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// The frame to write to the wire.
    pub frame: Frame,
    /// HMAC-SHA256 trailer to append after the frame, if any.
    pub hmac_trailer: Vec<u8>,
}

/// A side effect the driver must carry out on this session's behalf.
pub enum SessionAction {
    /// Write `frame` (plus its trailer) to the peer.
    SendFrame(OutboundFrame),
    /// Hand a fully reassembled session-plane message to a channel handler.
    DispatchToChannel {
        /// The channel's resolved application handler.
        handler: Arc<dyn ChannelHandler>,
        /// The reassembled message.
        payload: Bytes,
    },
}

/// One endpoint's half of a connected-devices session.
pub struct Session<E: Environment> {
    local_session_id: u32,
    remote_session_id: u32,
    state: SessionState,
    local_key: EncryptionInfo,
    remote_key: Option<EncryptionInfo>,
    cryptor: Option<Cryptor>,
    hmac_size: usize,
    fragment_size: usize,
    reply_sequence_number: u32,
    reassembler: Reassembler,
    channels: ChannelRegistry,
    local_ip: String,
    local_auth_payload: Vec<u8>,
    #[allow(dead_code)]
    env: E,
}

impl<E: Environment> Session<E> {
    /// Build a new session in [`SessionState::AwaitingConnectRequest`],
    /// generating fresh local key material from `env`.
    ///
    /// # Errors
    ///
    /// Propagates a [`SessionError::Crypto`] in the practically-unreachable
    /// case that `env` produced an invalid P-256 scalar.
    pub fn new(
        env: E,
        local_session_id: u32,
        remote_session_id: u32,
        local_auth_payload: Vec<u8>,
    ) -> Result<Self, SessionError> {
        let mut scalar = [0u8; 32];
        env.random_bytes(&mut scalar);
        let mut nonce = [0u8; 64];
        env.random_bytes(&mut nonce);
        let local_key = EncryptionInfo::create(scalar, nonce)?;
        let local_ip = env.local_ip();

        Ok(Self {
            local_session_id,
            remote_session_id,
            state: SessionState::AwaitingConnectRequest,
            local_key,
            remote_key: None,
            cryptor: None,
            hmac_size: cdp_crypto::HMAC_SIZE,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            reply_sequence_number: 0,
            reassembler: Reassembler::new(),
            channels: ChannelRegistry::new(),
            local_ip,
            local_auth_payload,
            env,
        })
    }

    /// This session's own local id.
    #[must_use]
    pub fn local_session_id(&self) -> u32 {
        self.local_session_id
    }

    /// The peer's local id, as recorded when this session was created.
    #[must_use]
    pub fn remote_session_id(&self) -> u32 {
        self.remote_session_id
    }

    /// Whether this session has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state == SessionState::Disposed
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark the session disposed and release its channels, returning their
    /// handlers (in insertion order) so the caller can tear them down.
    pub fn dispose(&mut self) -> Vec<Arc<dyn ChannelHandler>> {
        self.state = SessionState::Disposed;
        self.channels.dispose_all()
    }

    /// Advance the state machine by one inbound frame.
    ///
    /// `hmac_trailer` is the trailer bytes that followed `frame` on the
    /// wire; ignored while no cryptor is active. `apps` resolves
    /// `StartChannelRequest` application ids.
    ///
    /// # Errors
    ///
    /// See spec.md §7. A terminal error (per
    /// [`SessionError::is_terminal`]) disposes the session as a side effect
    /// before returning.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        hmac_trailer: &[u8],
        apps: &dyn AppRegistry,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::SessionDisposed { local_session_id: self.local_session_id });
        }

        let plaintext = match &self.cryptor {
            Some(cryptor) => {
                let aad = Self::associated_data(frame)?;
                match cryptor.decrypt(&aad, &frame.payload, hmac_trailer, frame.header.sequence_number()) {
                    Ok(plaintext) => plaintext,
                    Err(_) => {
                        self.dispose();
                        return Err(SessionError::CryptoIntegrity { local_session_id: self.local_session_id });
                    },
                }
            },
            None => frame.payload.to_vec(),
        };

        let result = match frame.header.msg_type() {
            MessageType::Connect => self.handle_connect(&frame.header, &plaintext),
            MessageType::Control => self.handle_control(&frame.header, &plaintext, apps),
            MessageType::Session => self.handle_session(&frame.header, &plaintext),
            MessageType::ReliabilityResponse => {
                tracing::debug!(local_session_id = self.local_session_id, "dropping reliability-response frame");
                Ok(Vec::new())
            },
            MessageType::Unknown(code) => {
                tracing::debug!(
                    local_session_id = self.local_session_id,
                    msg_type = code,
                    "dropping frame of unrecognized message type"
                );
                Ok(Vec::new())
            },
        };

        if let Err(err) = &result {
            if err.is_terminal() {
                tracing::warn!(
                    local_session_id = self.local_session_id,
                    error = %err,
                    "disposing session after terminal error"
                );
                self.dispose();
            }
        }

        result
    }

    fn associated_data(frame: &Frame) -> Result<Vec<u8>, SessionError> {
        let mut aad = frame.header.to_bytes().to_vec();
        aad.extend_from_slice(&cdp_proto::encode_additional_headers(&frame.additional_headers)?);
        Ok(aad)
    }

    fn next_sequence_number(&mut self) -> u32 {
        let sequence_number = self.reply_sequence_number;
        self.reply_sequence_number = self.reply_sequence_number.wrapping_add(1);
        sequence_number
    }

    fn verify_thumbprint_and_advance(&mut self, thumbprint: &[u8]) -> Result<(), SessionError> {
        let remote = self
            .remote_key
            .as_ref()
            .ok_or(SessionError::InvalidThumbprint { local_session_id: self.local_session_id })?;
        let expected = compute_thumbprint(&self.local_key.nonce(), &remote.nonce());
        if thumbprint != expected.as_slice() {
            return Err(SessionError::InvalidThumbprint { local_session_id: self.local_session_id });
        }
        if self.state == SessionState::AwaitingAuth {
            self.state = SessionState::AwaitingUpgradeOrAuthDone;
        }
        Ok(())
    }

    /// Build an encrypted reply frame for the current cryptor.
    fn seal_reply(
        &mut self,
        incoming_header: &CommonHeader,
        msg_type: MessageType,
        additional_headers: Vec<AdditionalHeader>,
        request_id_override: Option<u64>,
        plaintext: Vec<u8>,
    ) -> Result<SessionAction, SessionError> {
        let local_session_id = self.local_session_id;
        let cryptor = self.cryptor.as_ref().ok_or(SessionError::UnexpectedMessage {
            local_session_id,
            msg_type: incoming_header.msg_type().to_u8(),
        })?;

        let mut header = *incoming_header;
        header.correct_client_session_bit();
        header.set_msg_type(msg_type);
        header.set_fragment_index(0);
        header.set_fragment_count(1);
        if let Some(request_id) = request_id_override {
            header.set_request_id(request_id);
        }

        let sequence_number = self.next_sequence_number();
        header.set_sequence_number(sequence_number);

        let ciphertext = cryptor.encrypt(&plaintext, sequence_number);
        let frame = Frame::new(header, additional_headers, ciphertext)?;

        let mut aad = frame.header.to_bytes().to_vec();
        aad.extend_from_slice(&cdp_proto::encode_additional_headers(&frame.additional_headers)?);
        let hmac_trailer = cryptor.seal_hmac(&aad, &frame.payload, self.hmac_size);

        Ok(SessionAction::SendFrame(OutboundFrame { frame, hmac_trailer }))
    }

    fn handle_connect(
        &mut self,
        header: &CommonHeader,
        plaintext: &[u8],
    ) -> Result<Vec<SessionAction>, SessionError> {
        let message = ConnectionMessage::decode(plaintext)?;
        let unexpected = |local_session_id: u32| SessionError::UnexpectedMessage {
            local_session_id,
            msg_type: header.msg_type().to_u8(),
        };

        match (self.state, message) {
            (SessionState::AwaitingConnectRequest, ConnectionMessage::ConnectRequest(request)) => {
                let remote =
                    EncryptionInfo::from_remote(request.public_key_x, request.public_key_y, request.nonce)?;
                let shared_secret = self.local_key.generate_shared_secret(&remote)?;
                self.cryptor = Some(Cryptor::new(&shared_secret));
                self.remote_key = Some(remote);

                let (public_key_x, public_key_y) = self.local_key.public_key_xy();
                #[allow(clippy::cast_possible_truncation)]
                let body = ConnectionMessage::ConnectResponse(ConnectResponse {
                    result: ConnectResult::Pending,
                    nonce: self.local_key.nonce(),
                    public_key_x,
                    public_key_y,
                    hmac_size: self.hmac_size as u32,
                    message_fragment_size: self.fragment_size as u32,
                });

                let mut reply_header = *header;
                reply_header.correct_client_session_bit();
                reply_header.set_originator_remote_session_id(self.local_session_id);
                reply_header.set_msg_type(MessageType::Connect);
                reply_header.set_fragment_index(0);
                reply_header.set_fragment_count(1);
                reply_header.set_sequence_number(self.next_sequence_number());

                let frame = Frame::new(reply_header, vec![], body.encode()?)?;
                self.state = SessionState::AwaitingAuth;
                tracing::info!(local_session_id = self.local_session_id, "connect request accepted, cryptor live");
                Ok(vec![SessionAction::SendFrame(OutboundFrame { frame, hmac_trailer: Vec::new() })])
            },

            (SessionState::AwaitingConnectRequest, _) => Err(unexpected(self.local_session_id)),
            (_, ConnectionMessage::ConnectRequest(_)) => Err(unexpected(self.local_session_id)),

            (
                SessionState::AwaitingAuth | SessionState::AwaitingUpgradeOrAuthDone | SessionState::Established,
                ConnectionMessage::DeviceAuthRequest(request),
            ) => {
                self.verify_thumbprint_and_advance(&request.thumbprint)?;
                let body = ConnectionMessage::DeviceAuthResponse(DeviceAuthResponse {
                    auth_payload: self.local_auth_payload.clone(),
                });
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },
            (
                SessionState::AwaitingAuth | SessionState::AwaitingUpgradeOrAuthDone | SessionState::Established,
                ConnectionMessage::UserDeviceAuthRequest(request),
            ) => {
                self.verify_thumbprint_and_advance(&request.thumbprint)?;
                let body = ConnectionMessage::UserDeviceAuthResponse(UserDeviceAuthResponse {
                    auth_payload: self.local_auth_payload.clone(),
                });
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },

            (
                SessionState::AwaitingUpgradeOrAuthDone | SessionState::Established,
                ConnectionMessage::UpgradeRequest(_),
            ) => {
                let body = ConnectionMessage::UpgradeResponse(UpgradeResponse {
                    endpoints: vec![TransportEndpoint {
                        transport: TransportKind::Tcp,
                        host: self.local_ip.clone(),
                        port: UPGRADE_TCP_PORT,
                    }],
                });
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },
            (
                SessionState::AwaitingUpgradeOrAuthDone | SessionState::Established,
                ConnectionMessage::UpgradeFinalization(_),
            ) => {
                let body = ConnectionMessage::UpgradeFinalizationResponse(UpgradeFinalizationResponse);
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },
            (_, ConnectionMessage::UpgradeFailure(failure)) => {
                tracing::warn!(
                    local_session_id = self.local_session_id,
                    hresult = failure.hresult,
                    "peer reported transport upgrade failure"
                );
                Ok(Vec::new())
            },

            (SessionState::Established, ConnectionMessage::TransportRequest(request)) => {
                let body = ConnectionMessage::TransportConfirmation(TransportConfirmation { body: request.body });
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },

            (
                SessionState::AwaitingAuth | SessionState::AwaitingUpgradeOrAuthDone,
                ConnectionMessage::AuthDoneRequest(_),
            ) => {
                self.state = SessionState::Established;
                tracing::info!(local_session_id = self.local_session_id, "authentication complete, session established");
                let body = ConnectionMessage::AuthDoneResponse(AuthDoneResponse { hresult: 0 });
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },

            (SessionState::Established, ConnectionMessage::DeviceInfoMessage(_)) => {
                let body = ConnectionMessage::DeviceInfoResponseMessage(DeviceInfoResponseMessage);
                self.seal_reply(header, MessageType::Connect, vec![], None, body.encode()?).map(|action| vec![action])
            },

            _ => Err(unexpected(self.local_session_id)),
        }
    }

    fn handle_control(
        &mut self,
        header: &CommonHeader,
        plaintext: &[u8],
        apps: &dyn AppRegistry,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Established {
            return Err(SessionError::UnexpectedMessage {
                local_session_id: self.local_session_id,
                msg_type: header.msg_type().to_u8(),
            });
        }

        match ControlMessage::decode(plaintext)? {
            ControlMessage::StartChannelRequest(request) => {
                let (result, channel_id) =
                    match self.channels.start_channel(&request.app_id, &request.app_name, apps) {
                        Some(channel_id) => (StartChannelResult::Success, channel_id),
                        None => (StartChannelResult::Failure, 0),
                    };
                let body = ControlMessage::StartChannelResponse(StartChannelResponse { result, channel_id });
                let additional_headers = vec![AdditionalHeader::channel_response_magic()];
                let action = self.seal_reply(
                    header,
                    MessageType::Control,
                    additional_headers,
                    Some(header.request_id()),
                    body.encode()?,
                )?;
                Ok(vec![action])
            },
            ControlMessage::StartChannelResponse(_) => Err(SessionError::UnexpectedMessage {
                local_session_id: self.local_session_id,
                msg_type: header.msg_type().to_u8(),
            }),
        }
    }

    fn handle_session(
        &mut self,
        header: &CommonHeader,
        plaintext: &[u8],
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Established {
            return Err(SessionError::UnexpectedMessage {
                local_session_id: self.local_session_id,
                msg_type: header.msg_type().to_u8(),
            });
        }

        let completed = self.reassembler.add_fragment(
            self.local_session_id,
            header.sequence_number(),
            header.fragment_index(),
            header.fragment_count(),
            Bytes::copy_from_slice(plaintext),
        )?;

        let Some(payload) = completed else {
            return Ok(Vec::new());
        };

        let channel = self.channels.get(header.channel_id()).ok_or(SessionError::ChannelNotFound {
            local_session_id: self.local_session_id,
            channel_id: header.channel_id(),
        })?;

        Ok(vec![SessionAction::DispatchToChannel { handler: channel.handler.clone(), payload }])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cdp_proto::{ConnectionMessage, ControlMessage, payloads::connection::ConnectRequest};

    use super::*;
    use crate::channel::test_support::{MapRegistry, RecordingHandler};

    #[derive(Clone)]
    struct FakeEnv {
        bytes: Arc<std::sync::Mutex<Vec<u8>>>,
    }

    impl FakeEnv {
        fn seeded(seed: u8) -> Self {
            Self { bytes: Arc::new(std::sync::Mutex::new(vec![seed; 4096])) }
        }
    }

    impl Environment for FakeEnv {
        type Instant = std::time::Duration;

        fn now(&self) -> Self::Instant {
            std::time::Duration::ZERO
        }

        async fn sleep(&self, _duration: std::time::Duration) {}

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

    fn keypair(seed: u8) -> (EncryptionInfo, FakeEnv) {
        let env = FakeEnv::seeded(seed);
        let mut scalar = [0u8; 32];
        env.random_bytes(&mut scalar);
        let mut nonce = [0u8; 64];
        env.random_bytes(&mut nonce);
        (EncryptionInfo::create(scalar, nonce).unwrap(), env)
    }

    fn connect_request_frame(peer: &EncryptionInfo) -> Frame {
        let (x, y) = peer.public_key_xy();
        let message =
            ConnectionMessage::ConnectRequest(ConnectRequest { public_key_x: x, public_key_y: y, nonce: peer.nonce() });
        let header = CommonHeader::new(MessageType::Connect, 0, 0);
        Frame::new(header, vec![], message.encode().unwrap()).unwrap()
    }

    fn fresh_session() -> Session<FakeEnv> {
        let env = FakeEnv::seeded(0x11);
        Session::new(env, 0xE, 0, Vec::new()).unwrap()
    }

    #[test]
    fn connect_request_yields_unencrypted_connect_response() {
        let mut session = fresh_session();
        let (peer, _peer_env) = keypair(0x22);
        let frame = connect_request_frame(&peer);
        let apps = MapRegistry::default();

        let actions = session.handle_frame(&frame, &[], &apps).unwrap();
        assert_eq!(actions.len(), 1);
        let SessionAction::SendFrame(outbound) = &actions[0] else { panic!("expected SendFrame") };
        assert!(outbound.hmac_trailer.is_empty());

        let body = ConnectionMessage::decode(&outbound.frame.payload).unwrap();
        let ConnectionMessage::ConnectResponse(response) = body else { panic!("expected ConnectResponse") };
        assert_eq!(response.result, ConnectResult::Pending);
        assert_eq!(session.state(), SessionState::AwaitingAuth);
    }

    #[test]
    fn duplicate_connect_request_after_cryptor_live_is_unexpected() {
        let mut session = fresh_session();
        let (peer, _peer_env) = keypair(0x22);
        let apps = MapRegistry::default();
        session.handle_frame(&connect_request_frame(&peer), &[], &apps).unwrap();

        let err = session.handle_frame(&connect_request_frame(&peer), &[], &apps).unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedMessage { .. }));
        assert!(session.is_disposed());
    }

    #[test]
    fn invalid_thumbprint_disposes_the_session() {
        let mut session = fresh_session();
        let (peer, _peer_env) = keypair(0x22);
        let apps = MapRegistry::default();
        session.handle_frame(&connect_request_frame(&peer), &[], &apps).unwrap();

        let bad_request = ConnectionMessage::DeviceAuthRequest(
            cdp_proto::payloads::connection::DeviceAuthRequest { thumbprint: vec![0u8; 32], auth_payload: vec![] },
        );
        let cryptor_secret_header = CommonHeader::new(MessageType::Connect, 0xE << 32, 0);
        let frame = Frame::new(cryptor_secret_header, vec![], bad_request.encode().unwrap()).unwrap();

        let err = session.handle_frame(&frame, &[], &apps).unwrap_err();
        assert!(matches!(err, SessionError::CryptoIntegrity { .. } | SessionError::InvalidThumbprint { .. }));
        assert!(session.is_disposed());
    }

    #[test]
    fn unknown_channel_is_dropped_not_terminal() {
        let mut session = fresh_session();
        session.state = SessionState::Established;
        let mut header = CommonHeader::new(MessageType::Session, 0, 77);
        header.set_fragment_count(1);
        let frame = Frame::new(header, vec![], vec![1, 2, 3]).unwrap();
        let apps = MapRegistry::default();

        let err = session.handle_frame(&frame, &[], &apps).unwrap_err();
        assert_eq!(err, SessionError::ChannelNotFound { local_session_id: 0xE, channel_id: 77 });
        assert!(!session.is_disposed());
    }

    #[test]
    fn start_channel_request_allocates_and_replies_with_magic_header() {
        let mut session = fresh_session();
        session.state = SessionState::Established;
        session.cryptor = Some(Cryptor::new(&[0x55; 32]));

        let mut apps = MapRegistry::default();
        apps.apps.insert(
            ("app.foo".to_string(), "Foo".to_string()),
            Arc::new(RecordingHandler::default()) as Arc<dyn ChannelHandler>,
        );

        let request = ControlMessage::start_channel_request("app.foo", "Foo");
        let mut header = CommonHeader::new(MessageType::Control, 0, 0);
        header.set_request_id(0xAA);
        let frame = Frame::new(header, vec![], request.encode().unwrap()).unwrap();

        let actions = session.handle_frame(&frame, &[0u8; 32], &apps).unwrap();
        assert_eq!(actions.len(), 1);
        let SessionAction::SendFrame(outbound) = &actions[0] else { panic!("expected SendFrame") };
        assert_eq!(outbound.frame.additional_headers, vec![AdditionalHeader::channel_response_magic()]);
        assert_eq!(outbound.frame.header.request_id(), 0xAA);
    }
}
