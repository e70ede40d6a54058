// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Frame metadata supplied by the host and the conversation table that turns transport
//! addressing into a stable conversation index.
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Address {
    None,
    Ip(IpAddr),
    Ether([u8; 6]),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::None => write!(f, "-"),
            Address::Ip(ip) => write!(f, "{ip}"),
            Address::Ether(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
        }
    }
}

/// Per-frame metadata from the host: frame number, whether the frame has been decoded
/// before, and its transport addressing. Ports are zero when the PDU was not carried over
/// TCP; `src_ref`/`dst_ref` are the COTP references used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub number: u32,
    /// Position of the PDU within its frame, for frames carrying more than one.
    pub pdu: u32,
    pub visited: bool,
    pub src: Address,
    pub dst: Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub src_ref: u16,
    pub dst_ref: u16,
}

impl FrameInfo {
    /// A frame with no transport addressing. Such frames are always decoded standalone.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            pdu: 0,
            visited: false,
            src: Address::None,
            dst: Address::None,
            src_port: 0,
            dst_port: 0,
            src_ref: 0,
            dst_ref: 0,
        }
    }

    pub fn with_addresses(mut self, src: Address, dst: Address) -> Self {
        self.src = src;
        self.dst = dst;
        self
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn with_refs(mut self, src_ref: u16, dst_ref: u16) -> Self {
        self.src_ref = src_ref;
        self.dst_ref = dst_ref;
        self
    }

    pub fn with_pdu(mut self, pdu: u32) -> Self {
        self.pdu = pdu;
        self
    }

    pub fn visited(mut self, visited: bool) -> Self {
        self.visited = visited;
        self
    }

    /// Normalized conversation key plus the direction of this frame within it.
    ///
    /// Ports identify the conversation when both are set (COTP over RFC 1006/TCP), otherwise
    /// the COTP references do (plain COTP). `None` when the frame carries no addressing.
    pub fn conversation(&self) -> Option<(ConversationKey, Direction)> {
        let (transport, src_id, dst_id) = if self.src_port != 0 && self.dst_port != 0 {
            (Transport::Ported, self.src_port, self.dst_port)
        } else if self.src_ref != 0
            || self.dst_ref != 0
            || self.src != Address::None
            || self.dst != Address::None
        {
            (Transport::Referenced, self.src_ref, self.dst_ref)
        } else {
            return None;
        };

        let src = (self.src, src_id);
        let dst = (self.dst, dst_id);
        let (lo, hi, direction) = if src <= dst {
            (src, dst, Direction::Forward)
        } else {
            (dst, src, Direction::Reverse)
        };
        Some((ConversationKey { transport, lo, hi }, direction))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    Ported,
    Referenced,
}

/// Endpoint pair stored in canonical order so both directions map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConversationKey {
    pub transport: Transport,
    pub lo: (Address, u16),
    pub hi: (Address, u16),
}

/// Whether a frame travels from the lower to the higher endpoint of its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Default)]
pub struct ConversationTable {
    index: HashMap<ConversationKey, u32>,
}

impl ConversationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, key: &ConversationKey) -> Option<u32> {
        self.index.get(key).copied()
    }

    pub fn find_or_create(&mut self, key: ConversationKey) -> u32 {
        let next = self.index.len() as u32;
        *self.index.entry(key).or_insert_with(|| {
            debug!("new conversation {next}: {key:?}");
            next
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
