// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Decoder for PROFINET IO Remote Service Interface PDUs.
//!
//! [`dissector::RsiDissector`] is the entry point: it decodes one PDU per call into a field
//! tree, an info line and expert notes, and keeps the conversation and reassembly state that
//! fragmented requests and responses need across frames.

pub mod blocks;
pub mod codec;
pub mod conversation;
pub mod dispatch;
pub mod dissector;
pub mod fields;
pub mod header;
pub mod instances;
pub mod leaf;
pub mod reassembly;
pub mod security;
pub mod tree;

pub use conversation::{Address, FrameInfo};
pub use dissector::{Dissection, RsiDissector, SegmentStatus};
pub use instances::dissect_pd_rsi_instances;
