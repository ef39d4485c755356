//! Component D: session-plane fragment reassembly.
//!
//! Session frames carry opaque application bytes in pieces, keyed by
//! sequence number; a message is complete once every fragment index `0..
//! fragment_count` has arrived. Completed entries are removed from the
//! table at the moment they're handed off (see the dispatch-timing note in
//! `session.rs`), matching the "completed messages are removed from the
//! table before dispatch" rule in spec.md 4.D.

use bytes::{Bytes, BytesMut};

use crate::error::SessionError;

struct PartialMessage {
    fragment_count: u16,
    fragments: Vec<Option<Bytes>>,
    received: usize,
}

impl PartialMessage {
    fn new(fragment_count: u16) -> Self {
        Self { fragment_count, fragments: vec![None; fragment_count as usize], received: 0 }
    }

    fn is_complete(&self) -> bool {
        self.received == self.fragments.len()
    }

    fn concatenate(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for fragment in &self.fragments {
            #[allow(clippy::expect_used)]
            buf.extend_from_slice(fragment.as_ref().expect("is_complete() guarantees every slot is filled"));
        }
        buf.freeze()
    }
}

/// Per-session table of in-progress session-plane messages, keyed by the
/// sequence number shared across all of a message's fragments.
#[derive(Default)]
pub struct Reassembler {
    partials: std::collections::HashMap<u32, PartialMessage>,
}

impl Reassembler {
    /// Build an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self { partials: std::collections::HashMap::new() }
    }

    /// Append one fragment. Returns the concatenated message once every
    /// fragment of it has arrived, removing the entry from the table in the
    /// same step; returns `None` while the message is still incomplete.
    ///
    /// # Errors
    ///
    /// [`SessionError::ReassemblyOverflow`] if `fragment_index` is out of
    /// range for `fragment_count`, if `fragment_count` disagrees with an
    /// already-buffered entry for this sequence number, or if the same
    /// fragment index arrives twice.
    pub fn add_fragment(
        &mut self,
        local_session_id: u32,
        sequence_number: u32,
        fragment_index: u16,
        fragment_count: u16,
        bytes: Bytes,
    ) -> Result<Option<Bytes>, SessionError> {
        let overflow = || SessionError::ReassemblyOverflow { local_session_id, sequence_number };

        if fragment_count == 0 || fragment_index >= fragment_count {
            return Err(overflow());
        }

        let partial =
            self.partials.entry(sequence_number).or_insert_with(|| PartialMessage::new(fragment_count));
        if partial.fragment_count != fragment_count {
            return Err(overflow());
        }

        let slot = partial.fragments.get_mut(fragment_index as usize).ok_or_else(overflow)?;
        if slot.is_some() {
            return Err(overflow());
        }
        *slot = Some(bytes);
        partial.received += 1;

        if partial.is_complete() {
            #[allow(clippy::expect_used)]
            let partial = self.partials.remove(&sequence_number).expect("just inserted above");
            Ok(Some(partial.concatenate()))
        } else {
            Ok(None)
        }
    }

    /// Number of messages currently mid-assembly.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.partials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_completes_immediately() {
        let mut reassembler = Reassembler::new();
        let result = reassembler.add_fragment(1, 7, 0, 1, Bytes::from_static(b"hello"));
        assert_eq!(result.unwrap(), Some(Bytes::from_static(b"hello")));
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn two_fragments_concatenate_in_index_order() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.add_fragment(1, 7, 0, 2, Bytes::from_static(b"foo")).unwrap(), None);
        assert_eq!(reassembler.pending_count(), 1);

        let result = reassembler.add_fragment(1, 7, 1, 2, Bytes::from_static(b"bar")).unwrap();
        assert_eq!(result, Some(Bytes::from_static(b"foobar")));
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn out_of_order_fragments_still_concatenate_correctly() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.add_fragment(1, 9, 1, 2, Bytes::from_static(b"bar")).unwrap(), None);
        let result = reassembler.add_fragment(1, 9, 0, 2, Bytes::from_static(b"foo")).unwrap();
        assert_eq!(result, Some(Bytes::from_static(b"foobar")));
    }

    #[test]
    fn distinct_sequence_numbers_dont_interfere() {
        let mut reassembler = Reassembler::new();
        reassembler.add_fragment(1, 1, 0, 2, Bytes::from_static(b"a")).unwrap();
        reassembler.add_fragment(1, 2, 0, 2, Bytes::from_static(b"b")).unwrap();
        assert_eq!(reassembler.pending_count(), 2);
    }

    #[test]
    fn fragment_index_past_count_is_overflow() {
        let mut reassembler = Reassembler::new();
        assert_eq!(
            reassembler.add_fragment(1, 1, 2, 2, Bytes::from_static(b"x")),
            Err(SessionError::ReassemblyOverflow { local_session_id: 1, sequence_number: 1 })
        );
    }

    #[test]
    fn mismatched_fragment_count_is_overflow() {
        let mut reassembler = Reassembler::new();
        reassembler.add_fragment(1, 1, 0, 2, Bytes::from_static(b"a")).unwrap();
        assert_eq!(
            reassembler.add_fragment(1, 1, 1, 3, Bytes::from_static(b"b")),
            Err(SessionError::ReassemblyOverflow { local_session_id: 1, sequence_number: 1 })
        );
    }

    #[test]
    fn duplicate_fragment_index_is_overflow() {
        let mut reassembler = Reassembler::new();
        reassembler.add_fragment(1, 1, 0, 2, Bytes::from_static(b"a")).unwrap();
        assert_eq!(
            reassembler.add_fragment(1, 1, 0, 2, Bytes::from_static(b"a-again")),
            Err(SessionError::ReassemblyOverflow { local_session_id: 1, sequence_number: 1 })
        );
    }

    #[test]
    fn zero_fragment_count_is_overflow() {
        let mut reassembler = Reassembler::new();
        assert_eq!(
            reassembler.add_fragment(1, 1, 0, 0, Bytes::new()),
            Err(SessionError::ReassemblyOverflow { local_session_id: 1, sequence_number: 1 })
        );
    }
}
