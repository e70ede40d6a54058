// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! The decoding session and its two entry points.
//!
//! A session owns the conversation and reassembly tables for one capture. Every frame is
//! decoded through `&mut self`, so a host that decodes from several threads has to put the
//! session behind a lock (`Arc<Mutex<RsiDissector>>`) and frames are processed one at a time.
use serde::Serialize;
use tracing::{trace, warn};

use crate::config::DecoderConfig;
use crate::constants::{PROTOCOL_RSI, PROTOCOL_RSI_SECURED, SECURITY_CHECKSUM_SIZE};
use crate::metrics::{PDUS_DECODED, TRUNCATED_PDUS};
use crate::rsi::blocks::RsiBlock;
use crate::rsi::codec::{DecodeError, DecodeResult};
use crate::rsi::conversation::{ConversationTable, FrameInfo};
use crate::rsi::dispatch::dissect_rta;
use crate::rsi::header::{dissect_access_points, dissect_header_after_saps, dissect_pdu_header, PduHeader};
use crate::rsi::leaf::dissect_undecoded;
use crate::rsi::reassembly::{ReassemblyKey, ReassemblyTable};
use crate::rsi::security::{
    dissect_security_checksum, dissect_security_data, dissect_security_meta_data, ProtectionMode,
    SecurityMetaData,
};
use crate::rsi::tree::{ExpertNote, FieldNode, PacketInfo, Severity};

/// How the frame's payload took part in reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Decoded on its own, no reassembly involved.
    Standalone,
    /// Stored as a fragment of a message that has not completed (yet).
    Accumulated { more_fragments: bool },
    /// Completed a message; the tree shows the reassembled payload.
    Reassembled { length: usize, segments: usize },
    /// Part of a message shown in another frame.
    ReassembledIn { frame: u32 },
}

/// Mutable state threaded through one frame's decode.
pub(crate) struct DissectContext<'a> {
    pub frame: &'a FrameInfo,
    pub conversations: &'a mut ConversationTable,
    pub reassembly: &'a mut ReassemblyTable,
    pub reassemble: bool,
    pub secured: bool,
    pub info: PacketInfo,
    pub header: Option<PduHeader>,
    pub security: Option<SecurityMetaData>,
    pub block: Option<RsiBlock>,
    pub segment: Option<SegmentStatus>,
}

/// Everything produced by decoding one PDU.
#[derive(Debug, Clone, Serialize)]
pub struct Dissection {
    /// Offset just past the last byte consumed.
    pub end_offset: usize,
    pub protocol: &'static str,
    pub info: String,
    pub tree: FieldNode,
    pub notes: Vec<ExpertNote>,
    pub header: Option<PduHeader>,
    pub security: Option<SecurityMetaData>,
    pub block: Option<RsiBlock>,
    pub segment: Option<SegmentStatus>,
}

impl Dissection {
    /// Whether the field tree shows any application payload, directly or reassembled.
    pub fn has_payload_tree(&self) -> bool {
        self.tree.contains("pn_io.block")
            || self.tree.contains("pn_io.data")
            || self.tree.contains("pn_rsi.data_payload")
    }
}

#[derive(Debug)]
pub struct RsiDissector {
    conversations: ConversationTable,
    reassembly: ReassemblyTable,
    reassemble: bool,
}

impl Default for RsiDissector {
    fn default() -> Self {
        Self::new()
    }
}

impl RsiDissector {
    pub fn new() -> Self {
        Self {
            conversations: ConversationTable::new(),
            reassembly: ReassemblyTable::new(),
            reassemble: true,
        }
    }

    pub fn with_config(config: &DecoderConfig) -> Self {
        Self {
            reassemble: config.reassemble,
            ..Self::new()
        }
    }

    pub fn reassembly(&self) -> &ReassemblyTable {
        &self.reassembly
    }

    pub fn conversations(&self) -> &ConversationTable {
        &self.conversations
    }

    /// Reassembly key of an already known conversation, for querying the reassembly table.
    pub fn reassembly_key(&self, frame: &FrameInfo) -> Option<ReassemblyKey> {
        let (conversation, direction) = frame.conversation()?;
        Some(ReassemblyKey {
            conversation: self.conversations.find(&conversation)?,
            direction,
        })
    }

    fn context<'a>(&'a mut self, frame: &'a FrameInfo, secured: bool) -> DissectContext<'a> {
        let mut info = PacketInfo::default();
        info.set_protocol(if secured {
            PROTOCOL_RSI_SECURED
        } else {
            PROTOCOL_RSI
        });
        DissectContext {
            frame,
            conversations: &mut self.conversations,
            reassembly: &mut self.reassembly,
            reassemble: self.reassemble,
            secured,
            info,
            header: None,
            security: None,
            block: None,
            segment: None,
        }
    }

    /// Decodes a plain RSI PDU starting at `offset`.
    pub fn dissect(&mut self, frame: &FrameInfo, buf: &[u8], offset: usize) -> Dissection {
        let mut root = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", offset, 0);
        let mut ctx = self.context(frame, false);
        let result = dissect_pdu(buf, offset, &mut root, &mut ctx);
        finish(buf, offset, root, ctx, result)
    }

    /// Decodes an RSI PDU wrapped in the security envelope starting at `offset`.
    pub fn dissect_with_security(
        &mut self,
        frame: &FrameInfo,
        buf: &[u8],
        offset: usize,
    ) -> Dissection {
        let mut root = FieldNode::subtree("pn_rsi", "PROFINET IO RSI with Security", offset, 0);
        let mut ctx = self.context(frame, true);
        let result = dissect_secured_pdu(buf, offset, &mut root, &mut ctx);
        finish(buf, offset, root, ctx, result)
    }
}

fn count_pdu(header: &PduHeader) {
    PDUS_DECODED
        .with_label_values(&[header.pdu_type.rta_type.kind()])
        .inc();
}

fn dissect_pdu(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
) -> DecodeResult<usize> {
    let (header, pos) = dissect_pdu_header(buf, offset, tree)?;
    ctx.header = Some(header);
    count_pdu(&header);
    dissect_rta(buf, pos, &header, tree, ctx)
}

fn dissect_secured_pdu(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
) -> DecodeResult<usize> {
    let (meta, pos) = dissect_security_meta_data(buf, offset, tree)?;
    ctx.security = Some(meta);
    let ((dst_sap, src_sap), pos) = dissect_access_points(buf, pos, tree)?;

    match meta.protection_mode {
        ProtectionMode::AuthenticationOnly => {
            // the inner PDU must not run into the checksum
            let clear_end = buf.len().saturating_sub(SECURITY_CHECKSUM_SIZE).max(pos);
            let clear = &buf[..clear_end];
            let (header, pos) = dissect_header_after_saps(clear, pos, tree, dst_sap, src_sap)?;
            ctx.header = Some(header);
            count_pdu(&header);
            let pos = dissect_rta(clear, pos, &header, tree, ctx)?;
            dissect_security_checksum(buf, pos, tree)
        }
        ProtectionMode::AuthenticatedEncryption => {
            let (end, len) = dissect_security_data(buf, pos, tree);
            ctx.info.append(&format!(
                "RSI encrypted, DestinationServiceAccessPoint: {dst_sap}, SourceServiceAccessPoint: {src_sap}, Len: {len:4}"
            ));
            PDUS_DECODED.with_label_values(&["encrypted"]).inc();
            Ok(end)
        }
    }
}

/// Turns the decode result into a `Dissection`. A field that ran past the captured bytes
/// ends structured decoding; the rest of the buffer is shown undecoded.
fn finish(
    buf: &[u8],
    start: usize,
    mut root: FieldNode,
    mut ctx: DissectContext<'_>,
    result: DecodeResult<usize>,
) -> Dissection {
    let end = match result {
        Ok(end) => end,
        Err(err) => {
            let at = match err {
                DecodeError::TruncatedField { offset, .. } => offset,
                DecodeError::UnsupportedVersion { .. } => start,
            };
            warn!("frame {}: {err}", ctx.frame.number);
            TRUNCATED_PDUS.inc();
            ctx.info.note(Severity::Warn, at, err.to_string());
            dissect_undecoded(buf, at, &mut root);
            buf.len().max(start)
        }
    };
    root.set_len(end - start);
    trace!(
        "frame {}: decoded {} bytes: {}",
        ctx.frame.number,
        end - start,
        ctx.info.info
    );

    Dissection {
        end_offset: end,
        protocol: ctx.info.protocol,
        info: ctx.info.info,
        tree: root,
        notes: ctx.info.notes,
        header: ctx.header,
        security: ctx.security,
        block: ctx.block,
        segment: ctx.segment,
    }
}
