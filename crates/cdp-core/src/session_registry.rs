//! Component G: the process-wide session registry.
//!
//! Grounded on the reference codebase's `ConnectionRegistry`: a single mutex
//! protects only the id-to-session map, never a session's own interior
//! state, so a caller holding a session's lock to run `handle_frame` never
//! also blocks someone else's unrelated lookup. Local session ids start at
//! `0xE` per spec.md 4.G and skip zero on wrap, since zero is the wire
//! sentinel meaning "no session yet".

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use cdp_proto::CommonHeader;

use crate::{env::Environment, error::SessionError, session::Session};

/// First local session id handed out by a fresh registry.
pub const FIRST_LOCAL_SESSION_ID: u32 = 0xE;

/// Process-wide map from local session id to the session it identifies.
///
/// One registry serves one endpoint; nothing here is actually global static
/// state (the reference codebase's own design note flags that as worth
/// fixing - see `SPEC_FULL.md` §9), so multiple endpoints can coexist in one
/// process and tests can build a fresh, hermetic registry per case.
pub struct SessionRegistry<E: Environment> {
    sessions: Mutex<HashMap<u32, Arc<Mutex<Session<E>>>>>,
    next_id: AtomicU32,
    env: E,
    local_auth_payload: Vec<u8>,
}

impl<E: Environment> SessionRegistry<E> {
    /// Build an empty registry. `local_auth_payload` is this endpoint's
    /// certificate-backed authentication payload, echoed back in
    /// `DeviceAuthResponse`/`UserDeviceAuthResponse` by every session this
    /// registry creates.
    #[must_use]
    pub fn new(env: E, local_auth_payload: Vec<u8>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(FIRST_LOCAL_SESSION_ID),
            env,
            local_auth_payload,
        }
    }

    fn allocate_local_session_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Resolve the session an inbound frame belongs to, creating one if the
    /// frame is a peer-originated first contact.
    ///
    /// Per spec.md 4.G: if the composite session id's low 31 bits (the
    /// originator's view of our local id) are `0`, this is a new session and
    /// one is allocated; otherwise the existing session is looked up and its
    /// recorded remote id and disposed state are checked.
    ///
    /// This registry only plays the responder role: it never originates a
    /// `ConnectRequest` itself, so the high half of every inbound header
    /// (the peer's self-assigned local id) is taken as this session's
    /// `remote_session_id` without further interpretation.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionNotFound`] if `header` names a local session
    ///   id this registry has never allocated.
    /// - [`SessionError::SessionMismatch`] if the session's recorded remote
    ///   id disagrees with the header's.
    /// - [`SessionError::SessionDisposed`] if the session has been torn down.
    #[allow(clippy::expect_used)]
    pub fn get_or_create(&self, header: &CommonHeader) -> Result<Arc<Mutex<Session<E>>>, SessionError> {
        let peer_local_id = header.originator_local_session_id();
        let claimed_local_id = header.originator_remote_session_id();

        if claimed_local_id == 0 {
            let local_session_id = self.allocate_local_session_id();
            let session =
                Session::new(self.env.clone(), local_session_id, peer_local_id, self.local_auth_payload.clone())?;
            let session = Arc::new(Mutex::new(session));
            self.sessions.lock().expect("lock not poisoned").insert(local_session_id, Arc::clone(&session));
            return Ok(session);
        }

        let session_arc = {
            let sessions = self.sessions.lock().expect("lock not poisoned");
            sessions
                .get(&claimed_local_id)
                .cloned()
                .ok_or(SessionError::SessionNotFound { local_session_id: claimed_local_id })?
        };

        {
            let session = session_arc.lock().expect("lock not poisoned");
            if session.is_disposed() {
                return Err(SessionError::SessionDisposed { local_session_id: claimed_local_id });
            }
            if session.remote_session_id() != peer_local_id {
                return Err(SessionError::SessionMismatch {
                    local_session_id: claimed_local_id,
                    expected_remote_session_id: session.remote_session_id(),
                    actual_remote_session_id: peer_local_id,
                });
            }
        }

        Ok(session_arc)
    }

    /// Remove and dispose a session by local id. A no-op if no such session
    /// is registered.
    #[allow(clippy::expect_used)]
    pub fn dispose(&self, local_session_id: u32) {
        let removed = self.sessions.lock().expect("lock not poisoned").remove(&local_session_id);
        if let Some(session) = removed {
            session.lock().expect("lock not poisoned").dispose();
        }
    }

    /// Number of sessions currently registered.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("lock not poisoned").len()
    }

    /// Whether no sessions are currently registered.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().expect("lock not poisoned").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use cdp_proto::MessageType;

    use super::*;

    #[derive(Clone)]
    struct FakeEnv {
        bytes: StdArc<Mutex<Vec<u8>>>,
    }

    impl FakeEnv {
        fn seeded(seed: u8) -> Self {
            Self { bytes: StdArc::new(Mutex::new(vec![seed; 4096])) }
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

    fn registry() -> SessionRegistry<FakeEnv> {
        SessionRegistry::new(FakeEnv::seeded(0x11), Vec::new())
    }

    fn first_contact_header(peer_local_id: u32) -> CommonHeader {
        CommonHeader::new(MessageType::Connect, u64::from(peer_local_id) << 32, 0)
    }

    #[test]
    fn first_contact_allocates_ids_starting_at_0xe() {
        let registry = registry();
        let first = registry.get_or_create(&first_contact_header(1)).unwrap();
        let second = registry.get_or_create(&first_contact_header(2)).unwrap();

        assert_eq!(first.lock().unwrap().local_session_id(), FIRST_LOCAL_SESSION_ID);
        assert_eq!(second.lock().unwrap().local_session_id(), FIRST_LOCAL_SESSION_ID + 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn existing_session_resolves_by_claimed_local_id() {
        let registry = registry();
        let created = registry.get_or_create(&first_contact_header(7)).unwrap();
        let local_id = created.lock().unwrap().local_session_id();

        let mut header = CommonHeader::new(MessageType::Connect, u64::from(7) << 32, 0);
        header.set_originator_remote_session_id(local_id);

        let resolved = registry.get_or_create(&header).unwrap();
        assert!(Arc::ptr_eq(&created, &resolved));
    }

    #[test]
    fn unknown_claimed_id_is_session_not_found() {
        let registry = registry();
        let mut header = CommonHeader::new(MessageType::Connect, 1u64 << 32, 0);
        header.set_originator_remote_session_id(0xDEAD);

        assert_eq!(
            registry.get_or_create(&header).unwrap_err(),
            SessionError::SessionNotFound { local_session_id: 0xDEAD }
        );
    }

    #[test]
    fn mismatched_remote_id_is_session_mismatch() {
        let registry = registry();
        let created = registry.get_or_create(&first_contact_header(7)).unwrap();
        let local_id = created.lock().unwrap().local_session_id();

        let mut header = CommonHeader::new(MessageType::Connect, 999u64 << 32, 0);
        header.set_originator_remote_session_id(local_id);

        assert_eq!(
            registry.get_or_create(&header).unwrap_err(),
            SessionError::SessionMismatch {
                local_session_id: local_id,
                expected_remote_session_id: 7,
                actual_remote_session_id: 999,
            }
        );
    }

    #[test]
    fn disposed_session_is_rejected() {
        let registry = registry();
        let created = registry.get_or_create(&first_contact_header(7)).unwrap();
        let local_id = created.lock().unwrap().local_session_id();
        registry.dispose(local_id);

        let mut header = CommonHeader::new(MessageType::Connect, u64::from(7) << 32, 0);
        header.set_originator_remote_session_id(local_id);

        assert_eq!(
            registry.get_or_create(&header).unwrap_err(),
            SessionError::SessionDisposed { local_session_id: local_id }
        );
        assert_eq!(registry.len(), 0);
    }
}
