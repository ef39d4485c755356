//! Reads and writes [`cdp_proto::Frame`]s over one accepted TCP socket,
//! driving them through a shared [`SessionRegistry`].
//!
//! Grounded on the reference codebase's `Server` executor loop (accept,
//! spawn a per-connection task, execute the pure driver's actions against
//! real I/O) - generalized from Quinn/QUIC streams to a plain
//! `tokio::net::TcpStream`, since spec.md names TCP, not QUIC, as the
//! transport this core advertises in `UpgradeResponse`.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use cdp_core::{AppRegistry, Session, SessionAction, SessionRegistry, SessionState};
use cdp_proto::{CommonHeader, Frame};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::system_env::SystemEnv;

/// Serve frames on `stream` until the peer disconnects or the session this
/// connection carries becomes disposed.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
    registry: Arc<SessionRegistry<SystemEnv>>,
    apps: Arc<dyn AppRegistry>,
) {
    let mut current_session_id: Option<u32> = None;

    loop {
        let (frame_read, session) = match read_frame(&mut stream, &registry).await {
            Ok(Some(read)) => read,
            Ok(None) => {
                tracing::debug!(%peer, "connection closed by peer");
                break;
            },
            Err(err) => {
                tracing::warn!(%peer, error = %err, "failed to read frame, closing connection");
                break;
            },
        };
        #[allow(clippy::expect_used)]
        {
            current_session_id = Some(session.lock().expect("session mutex not poisoned").local_session_id());
        }

        let actions = {
            #[allow(clippy::expect_used)]
            let mut session = session.lock().expect("session mutex not poisoned");
            session.handle_frame(&frame_read.frame, &frame_read.trailer, apps.as_ref())
        };

        let actions = match actions {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "session rejected frame");
                if err.is_terminal() {
                    break;
                }
                continue;
            },
        };

        if !dispatch_actions(&mut stream, actions).await {
            break;
        }
    }

    if let Some(local_session_id) = current_session_id {
        registry.dispose(local_session_id);
    }
}

struct FrameRead {
    frame: Frame,
    trailer: Vec<u8>,
}

/// Read one frame off the wire.
///
/// The HMAC trailer has no length field of its own (spec.md §4.B: its size
/// is "negotiated out of band" by the handshake), so this resolves the
/// session the header claims - creating it on first contact, exactly once,
/// via [`SessionRegistry::get_or_create`] - before deciding whether a
/// trailer follows, by checking whether that session's cryptor is live yet.
/// Returns `Ok(None)` on a clean EOF before any bytes of a new frame arrive.
async fn read_frame(
    stream: &mut TcpStream,
    registry: &Arc<SessionRegistry<SystemEnv>>,
) -> std::io::Result<Option<(FrameRead, Arc<Mutex<Session<SystemEnv>>>)>> {
    let mut header_buf = [0u8; CommonHeader::SIZE];
    if !read_exact_or_eof(stream, &mut header_buf).await? {
        return Ok(None);
    }

    let header = *CommonHeader::from_bytes(&header_buf)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    let session = registry
        .get_or_create(&header)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    #[allow(clippy::expect_used)]
    let crypto_active = session.lock().expect("session mutex not poisoned").state() != SessionState::AwaitingConnectRequest;

    let addl_len = header.additional_headers_size() as usize;
    let payload_len = header.payload_size() as usize;
    let trailer_len = if crypto_active { cdp_crypto::HMAC_SIZE } else { 0 };

    let mut rest = vec![0u8; addl_len + payload_len + trailer_len];
    stream.read_exact(&mut rest).await?;

    let mut frame_bytes = BytesMut::with_capacity(header_buf.len() + addl_len + payload_len);
    frame_bytes.extend_from_slice(&header_buf);
    frame_bytes.extend_from_slice(&rest[..addl_len + payload_len]);
    let trailer = rest[addl_len + payload_len..].to_vec();

    let frame =
        Frame::decode(&frame_bytes).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    Ok(Some((FrameRead { frame, trailer }, session)))
}

/// Like `read_exact`, but treats an immediate EOF (zero bytes read before
/// any data arrives) as `Ok(false)` instead of an error, since that's just
/// the peer closing the connection between frames.
async fn read_exact_or_eof(stream: &mut TcpStream, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = stream.read(&mut buf[filled..]).await?;
        if read == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
            };
        }
        filled += read;
    }
    Ok(true)
}

/// Execute this frame's side effects: write reply frames to the socket (in
/// order, per spec.md §5's single-reply-atomicity rule) and spawn reassembled
/// session-plane messages out to their channel handlers concurrently.
///
/// Returns `false` if writing a reply failed and the connection should close.
async fn dispatch_actions(stream: &mut TcpStream, actions: Vec<SessionAction>) -> bool {
    for action in actions {
        match action {
            SessionAction::SendFrame(outbound) => {
                let mut buf = BytesMut::with_capacity(outbound.frame.encoded_len() + outbound.hmac_trailer.len());
                if let Err(err) = outbound.frame.encode(&mut buf) {
                    tracing::error!(error = %err, "failed to encode reply frame");
                    return false;
                }
                buf.extend_from_slice(&outbound.hmac_trailer);
                if let Err(err) = stream.write_all(&buf).await {
                    tracing::warn!(error = %err, "failed to write reply frame");
                    return false;
                }
            },
            SessionAction::DispatchToChannel { handler, payload } => {
                tokio::spawn(async move {
                    handler.handle(payload).await;
                });
            },
        }
    }
    true
}
