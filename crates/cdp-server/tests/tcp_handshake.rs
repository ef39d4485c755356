//! End-to-end handshake over a real TCP socket.
//!
//! Reuses [`cdp_harness::ScriptedPeer`] to build and seal wire bytes (so this
//! test isn't duplicating the crypto harness), but sends and receives them
//! over an actual `tokio::net::TcpStream` talking to [`cdp_server::handle_connection`],
//! exercising the framing/trailer-sizing logic the harness's direct
//! `Session::handle_frame` calls never touch.

use std::sync::Arc;

use bytes::BytesMut;
use cdp_core::SessionRegistry;
use cdp_harness::{MapRegistry, RecordingHandler, ScriptedPeer, SimEnv};
use cdp_proto::{
    AdditionalHeader, CommonHeader, ConnectionMessage, ControlMessage, Frame, MessageType,
    payloads::connection::AuthDoneRequest,
};
use cdp_server::{SystemEnv, handle_connection};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

async fn write_frame(stream: &mut TcpStream, frame: &Frame, trailer: &[u8]) {
    let mut buf = BytesMut::new();
    frame.encode(&mut buf).unwrap();
    buf.extend_from_slice(trailer);
    stream.write_all(&buf).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream, trailer_len: usize) -> (Frame, Vec<u8>) {
    let mut header_buf = [0u8; CommonHeader::SIZE];
    stream.read_exact(&mut header_buf).await.unwrap();
    let header = *CommonHeader::from_bytes(&header_buf).unwrap();
    let addl_len = header.additional_headers_size() as usize;
    let payload_len = header.payload_size() as usize;
    let mut rest = vec![0u8; addl_len + payload_len + trailer_len];
    stream.read_exact(&mut rest).await.unwrap();
    let mut full = header_buf.to_vec();
    full.extend_from_slice(&rest[..addl_len + payload_len]);
    let frame = Frame::decode(&full).unwrap();
    let trailer = rest[addl_len + payload_len..].to_vec();
    (frame, trailer)
}

#[tokio::test]
async fn handshake_and_channel_open_round_trip_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Arc::new(SessionRegistry::new(SystemEnv::new(), Vec::new()));
    let mut apps = MapRegistry::default();
    apps.register("app.foo", "Foo", Arc::new(RecordingHandler::default()));
    let apps: Arc<dyn cdp_core::AppRegistry> = Arc::new(apps);

    tokio::spawn({
        let registry = Arc::clone(&registry);
        async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, registry, apps).await;
        }
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut peer = ScriptedPeer::new(&SimEnv::seeded(0x42));

    // ConnectRequest -> unencrypted ConnectResponse.
    let request = peer.connect_request_frame();
    write_frame(&mut client, &request, &[]).await;
    let (response_frame, trailer) = read_frame(&mut client, 0).await;
    assert!(trailer.is_empty());
    let ConnectionMessage::ConnectResponse(response) = ConnectionMessage::decode(&response_frame.payload).unwrap()
    else {
        panic!("expected ConnectResponse");
    };
    peer.complete_handshake(&response);

    // AuthDoneRequest -> encrypted AuthDoneResponse, session established.
    let header = CommonHeader::new(MessageType::Connect, 0, 0);
    let body = ConnectionMessage::AuthDoneRequest(AuthDoneRequest).encode().unwrap();
    let (frame, trailer) = peer.seal(header, vec![], body);
    write_frame(&mut client, &frame, &trailer).await;
    let (auth_done_frame, auth_done_trailer) = read_frame(&mut client, cdp_crypto::HMAC_SIZE).await;
    let plaintext = peer.open(&auth_done_frame, &auth_done_trailer);
    assert!(matches!(ConnectionMessage::decode(&plaintext).unwrap(), ConnectionMessage::AuthDoneResponse(_)));

    // StartChannelRequest -> the literal wire test vector from spec.md §8.
    let mut header = CommonHeader::new(MessageType::Control, 0, 0);
    header.set_request_id(0xAA);
    let body = ControlMessage::start_channel_request("app.foo", "Foo").encode().unwrap();
    let (frame, trailer) = peer.seal(header, vec![], body);
    write_frame(&mut client, &frame, &trailer).await;

    let (channel_frame, channel_trailer) = read_frame(&mut client, cdp_crypto::HMAC_SIZE).await;
    assert_eq!(channel_frame.header.request_id(), 0xAA);
    assert_eq!(channel_frame.additional_headers, vec![AdditionalHeader::channel_response_magic()]);
    let plaintext = peer.open(&channel_frame, &channel_trailer);
    assert_eq!(plaintext, vec![0u8, 0, 0, 0, 0, 0, 0, 0, 1]);
}

#[tokio::test]
async fn unknown_session_id_is_rejected_and_connection_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(SessionRegistry::new(SystemEnv::new(), Vec::new()));
    let apps: Arc<dyn cdp_core::AppRegistry> = Arc::new(MapRegistry::default());

    tokio::spawn({
        let registry = Arc::clone(&registry);
        async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, registry, apps).await;
        }
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut header = CommonHeader::new(MessageType::Connect, 1u64 << 32, 0);
    header.set_originator_remote_session_id(0xDEAD);
    let frame = Frame::new(header, vec![], vec![]).unwrap();
    write_frame(&mut client, &frame, &[]).await;

    let mut byte = [0u8; 1];
    let read = client.read(&mut byte).await.unwrap();
    assert_eq!(read, 0, "server closes the connection without replying to an unresolvable session");
}
