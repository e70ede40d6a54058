// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Reassembly of fragmented RSI messages.
//!
//! Fragments are appended in arrival order per (conversation, direction). The last fragment
//! (MoreFrag clear) completes the message; every fragment that contributed to it can then be
//! asked which frame carries the reassembled payload. A second decoding pass over the same
//! frames (`visited`) only queries, it never appends again.
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::metrics::{FRAGMENTS_ADDED, REASSEMBLIES_COMPLETED};
use crate::rsi::conversation::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReassemblyKey {
    pub conversation: u32,
    pub direction: Direction,
}

/// A PDU's place in the capture. One frame may carry several PDUs of the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FragmentId {
    pub frame: u32,
    pub pdu: u32,
}

impl FragmentId {
    pub fn new(frame: u32, pdu: u32) -> Self {
        Self { frame, pdu }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReassemblyState {
    NoState,
    Accumulating,
    Complete,
}

/// Where one fragment landed in the reassembled payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentRecord {
    pub frame: u32,
    pub pdu: u32,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Default)]
struct PendingReassembly {
    fragments: Vec<FragmentRecord>,
    data: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct ReassembledMessage {
    pub key: ReassemblyKey,
    /// The last fragment, whose decoding shows the reassembled payload.
    pub completed_by: FragmentId,
    pub fragments: Vec<FragmentRecord>,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
}

impl ReassembledMessage {
    /// Frame carrying the last fragment.
    pub fn reassembled_in(&self) -> u32 {
        self.completed_by.frame
    }
}

#[derive(Debug, Clone)]
pub enum FragmentOutcome {
    /// Not part of a multi-fragment message.
    Standalone,
    /// Accumulated, or revisited before the message completed.
    Pending,
    /// This PDU completes the message and carries the reassembled payload.
    Reassembled(Arc<ReassembledMessage>),
    /// Part of a message whose payload is shown with another PDU, possibly in the same frame.
    ReassembledIn { frame: u32, length: usize },
}

#[derive(Default, Debug, Clone, Serialize)]
pub struct ReassemblyStats {
    pub standalone_pdus: u64,
    pub fragments_added: u64,
    pub fragment_bytes: u64,
    pub reassemblies_completed: u64,
    pub revisits: u64,
}

#[derive(Debug, Default)]
pub struct ReassemblyTable {
    pending: HashMap<ReassemblyKey, PendingReassembly>,
    messages: Vec<Arc<ReassembledMessage>>,
    by_fragment: HashMap<(FragmentId, ReassemblyKey), usize>,
    last_completed: HashMap<ReassemblyKey, usize>,
    stats: ReassemblyStats,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one fragment's payload.
    ///
    /// On the first pass (`visited == false`) the payload is appended; on later passes the
    /// recorded outcome for the fragment at `at` is returned unchanged.
    pub fn process(
        &mut self,
        key: ReassemblyKey,
        at: FragmentId,
        visited: bool,
        more_fragments: bool,
        payload: &[u8],
    ) -> FragmentOutcome {
        let in_progress = self.pending.contains_key(&key);
        let mut reassembled = self.by_fragment.get(&(at, key)).copied();

        // A last fragment always completes a message on the first pass, so a revisited PDU
        // without MoreFrag and without a message was standalone.
        if !more_fragments && reassembled.is_none() && (visited || !in_progress) {
            if !visited {
                self.stats.standalone_pdus += 1;
            }
            return FragmentOutcome::Standalone;
        }

        if visited {
            self.stats.revisits += 1;
        } else {
            self.add_fragment(key, at, more_fragments, payload);
            reassembled = self.by_fragment.get(&(at, key)).copied();
        }

        match reassembled {
            Some(index) => {
                let message = Arc::clone(&self.messages[index]);
                if message.completed_by == at {
                    FragmentOutcome::Reassembled(message)
                } else {
                    FragmentOutcome::ReassembledIn {
                        frame: message.reassembled_in(),
                        length: message.data.len(),
                    }
                }
            }
            None => FragmentOutcome::Pending,
        }
    }

    fn add_fragment(
        &mut self,
        key: ReassemblyKey,
        at: FragmentId,
        more_fragments: bool,
        payload: &[u8],
    ) {
        let pending = self.pending.entry(key).or_default();
        let offset = pending.data.len();
        pending.fragments.push(FragmentRecord {
            frame: at.frame,
            pdu: at.pdu,
            offset,
            length: payload.len(),
        });
        pending.data.extend_from_slice(payload);
        trace!(
            "frame {}: fragment {} of {key:?}, {} bytes at offset {offset}",
            at.frame,
            pending.fragments.len(),
            payload.len()
        );

        self.stats.fragments_added += 1;
        self.stats.fragment_bytes += payload.len() as u64;
        FRAGMENTS_ADDED.inc();

        if more_fragments {
            return;
        }
        let Some(pending) = self.pending.remove(&key) else {
            return;
        };

        let index = self.messages.len();
        for fragment in &pending.fragments {
            self.by_fragment
                .insert((FragmentId::new(fragment.frame, fragment.pdu), key), index);
        }
        debug!(
            "frame {}: reassembled {} bytes from {} fragments of {key:?}",
            at.frame,
            pending.data.len(),
            pending.fragments.len()
        );
        self.messages.push(Arc::new(ReassembledMessage {
            key,
            completed_by: at,
            fragments: pending.fragments,
            data: pending.data,
        }));
        self.last_completed.insert(key, index);
        self.stats.reassemblies_completed += 1;
        REASSEMBLIES_COMPLETED.inc();
    }

    pub fn state(&self, key: &ReassemblyKey) -> ReassemblyState {
        if self.pending.contains_key(key) {
            ReassemblyState::Accumulating
        } else if self.last_completed.contains_key(key) {
            ReassemblyState::Complete
        } else {
            ReassemblyState::NoState
        }
    }

    pub fn message_for(&self, at: FragmentId, key: &ReassemblyKey) -> Option<&ReassembledMessage> {
        self.by_fragment
            .get(&(at, *key))
            .map(|&index| self.messages[index].as_ref())
    }

    pub fn reassembled_in(&self, at: FragmentId, key: &ReassemblyKey) -> Option<u32> {
        self.message_for(at, key).map(|m| m.reassembled_in())
    }

    pub fn reassembled_length(&self, at: FragmentId, key: &ReassemblyKey) -> Option<usize> {
        self.message_for(at, key).map(|m| m.data.len())
    }

    /// Bytes accumulated so far for an in-progress message.
    pub fn pending_length(&self, key: &ReassemblyKey) -> Option<usize> {
        self.pending.get(key).map(|p| p.data.len())
    }

    pub fn messages(&self) -> &[Arc<ReassembledMessage>] {
        &self.messages
    }

    /// Keys with fragments that never saw a last fragment.
    pub fn incomplete(&self) -> Vec<(ReassemblyKey, Vec<u32>)> {
        self.pending
            .iter()
            .map(|(key, p)| (*key, p.fragments.iter().map(|f| f.frame).collect()))
            .collect()
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: ReassemblyKey = ReassemblyKey {
        conversation: 0,
        direction: Direction::Forward,
    };

    fn at(frame: u32) -> FragmentId {
        FragmentId::new(frame, 0)
    }

    #[test]
    fn test_standalone_fast_path() {
        let mut table = ReassemblyTable::new();
        assert!(matches!(
            table.process(KEY, at(1), false, false, b"abc"),
            FragmentOutcome::Standalone
        ));
        assert_eq!(table.state(&KEY), ReassemblyState::NoState);
        assert_eq!(table.stats().standalone_pdus, 1);
        assert_eq!(table.stats().fragments_added, 0);
    }

    #[test]
    fn test_three_fragments() {
        let mut table = ReassemblyTable::new();
        assert!(matches!(
            table.process(KEY, at(1), false, true, b"AAAA"),
            FragmentOutcome::Pending
        ));
        assert_eq!(table.state(&KEY), ReassemblyState::Accumulating);
        assert!(matches!(
            table.process(KEY, at(2), false, true, b"BB"),
            FragmentOutcome::Pending
        ));
        assert_eq!(table.pending_length(&KEY), Some(6));
        let FragmentOutcome::Reassembled(message) = table.process(KEY, at(3), false, false, b"C")
        else {
            panic!("expected reassembled payload");
        };
        assert_eq!(message.data, b"AAAABBC");
        assert_eq!(message.fragments.len(), 3);
        assert_eq!(message.fragments[1].offset, 4);
        assert_eq!(table.state(&KEY), ReassemblyState::Complete);

        for frame in 1..=3 {
            assert_eq!(table.reassembled_in(at(frame), &KEY), Some(3));
            assert_eq!(table.reassembled_length(at(frame), &KEY), Some(7));
        }
    }

    #[test]
    fn test_revisit_is_idempotent() {
        let mut table = ReassemblyTable::new();
        table.process(KEY, at(1), false, true, b"AAAA");
        table.process(KEY, at(2), false, true, b"BB");
        table.process(KEY, at(3), false, false, b"C");

        for _ in 0..2 {
            match table.process(KEY, at(2), true, true, b"BB") {
                FragmentOutcome::ReassembledIn { frame, length } => {
                    assert_eq!(frame, 3);
                    assert_eq!(length, 7);
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(matches!(
            table.process(KEY, at(3), true, false, b"C"),
            FragmentOutcome::Reassembled(_)
        ));
        assert_eq!(table.stats().fragments_added, 3);
        assert_eq!(table.messages().len(), 1);
        assert_eq!(table.messages()[0].data, b"AAAABBC");
    }

    #[test]
    fn test_zero_length_fragment() {
        let mut table = ReassemblyTable::new();
        table.process(KEY, at(1), false, true, b"");
        let FragmentOutcome::Reassembled(message) = table.process(KEY, at(2), false, false, b"xy")
        else {
            panic!("expected reassembled payload");
        };
        assert_eq!(message.fragments[0].length, 0);
        assert_eq!(message.data, b"xy");
    }

    #[test]
    fn test_directions_are_independent() {
        let reverse = ReassemblyKey {
            conversation: 0,
            direction: Direction::Reverse,
        };
        let mut table = ReassemblyTable::new();
        table.process(KEY, at(1), false, true, b"req");
        assert!(matches!(
            table.process(reverse, at(2), false, false, b"rsp"),
            FragmentOutcome::Standalone
        ));
        assert_eq!(table.state(&KEY), ReassemblyState::Accumulating);
        assert_eq!(table.incomplete(), vec![(KEY, vec![1])]);
    }

    #[test]
    fn test_revisited_standalone_stays_standalone() {
        let mut table = ReassemblyTable::new();
        table.process(KEY, at(1), false, false, b"solo");
        // an exchange left incomplete at the end of the capture
        table.process(KEY, at(2), false, true, b"part");
        assert!(matches!(
            table.process(KEY, at(1), true, false, b"solo"),
            FragmentOutcome::Standalone
        ));
        assert!(matches!(
            table.process(KEY, at(2), true, true, b"part"),
            FragmentOutcome::Pending
        ));
    }

    #[test]
    fn test_two_fragments_in_one_frame() {
        let mut table = ReassemblyTable::new();
        let first = FragmentId::new(7, 0);
        let last = FragmentId::new(7, 1);
        table.process(KEY, first, false, true, b"head");
        assert!(matches!(
            table.process(KEY, last, false, false, b"tail"),
            FragmentOutcome::Reassembled(_)
        ));

        for _ in 0..2 {
            assert!(matches!(
                table.process(KEY, first, true, true, b"head"),
                FragmentOutcome::ReassembledIn { frame: 7, length: 8 }
            ));
            let FragmentOutcome::Reassembled(message) =
                table.process(KEY, last, true, false, b"tail")
            else {
                panic!("expected reassembled payload");
            };
            assert_eq!(message.data, b"headtail");
            assert_eq!(message.completed_by, last);
        }
    }

    #[test]
    fn test_frame_ends_one_message_and_starts_the_next() {
        let mut table = ReassemblyTable::new();
        table.process(KEY, at(1), false, true, b"a1");
        table.process(KEY, FragmentId::new(2, 0), false, false, b"a2");
        table.process(KEY, FragmentId::new(2, 1), false, true, b"b1");
        table.process(KEY, at(3), false, false, b"b2");

        assert_eq!(table.reassembled_in(FragmentId::new(2, 0), &KEY), Some(2));
        assert_eq!(table.reassembled_in(FragmentId::new(2, 1), &KEY), Some(3));
        assert!(matches!(
            table.process(KEY, FragmentId::new(2, 0), true, false, b"a2"),
            FragmentOutcome::Reassembled(_)
        ));
        assert!(matches!(
            table.process(KEY, FragmentId::new(2, 1), true, true, b"b1"),
            FragmentOutcome::ReassembledIn { frame: 3, length: 4 }
        ));
    }
}
