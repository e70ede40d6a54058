// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Connection, Service, SecurityAssociationControl and Response block decoders.
//!
//! Each block carries its fixed fields only in the first fragment (FOpnumOffset.Offset 0);
//! the remaining bytes are application payload, handed to the reassembly engine when the
//! message is fragmented and walked as PNIO blocks otherwise.
use serde::Serialize;

use crate::constants::{CON_SAP, F_OPNUM_OFFSET_SIZE, RSI_BLOCK_HEADER_SIZE};
use crate::rsi::codec::{read_u16, read_u32, read_u8, remaining, DecodeResult};
use crate::rsi::dispatch::{FOpnumOffset, Opnum, PduDirection};
use crate::rsi::dissector::{DissectContext, SegmentStatus};
use crate::rsi::fields;
use crate::rsi::header::PduHeader;
use crate::rsi::leaf::{dissect_blocks, dissect_padding, dissect_pnio_status, PnioStatus};
use crate::rsi::reassembly::{FragmentId, FragmentOutcome, ReassemblyKey};
use crate::rsi::tree::{FieldNode, FieldValue};

/// Identity of an RSI instance as carried in Connect and SecurityAssociationControl requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RsiEndpoint {
    pub vendor_id: u16,
    pub device_id: u16,
    pub instance_id: u16,
    pub rsi_interface: u8,
}

/// Fixed fields of the decoded block. Fields are `None` in fragments other than the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RsiBlock {
    Connection {
        rsp_max_length: Option<u32>,
        endpoint: Option<RsiEndpoint>,
    },
    Service {
        rsp_max_length: Option<u32>,
    },
    SecurityAssociationControl {
        rsp_max_length: Option<u32>,
        endpoint: Option<RsiEndpoint>,
    },
    Response {
        status: Option<PnioStatus>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BlockArgs {
    pub var_part_len: u16,
    pub more_fragments: bool,
    pub f_opnum_offset: FOpnumOffset,
    pub direction: PduDirection,
}

impl BlockArgs {
    pub fn new(header: &PduHeader, f_opnum_offset: FOpnumOffset, direction: PduDirection) -> Self {
        Self {
            var_part_len: header.var_part_len,
            more_fragments: header.add_flags.more_fragments,
            f_opnum_offset,
            direction,
        }
    }

    /// FOpnumOffset.Offset + VarPartLen - FOpnumOffset size - RsiHeaderSize. Signed: short
    /// PDUs produce zero or negative values, which mean "no payload".
    pub fn payload_length(&self) -> i64 {
        self.f_opnum_offset.offset as i64 + self.var_part_len as i64
            - F_OPNUM_OFFSET_SIZE as i64
            - RSI_BLOCK_HEADER_SIZE as i64
    }

    pub fn is_first_fragment(&self) -> bool {
        self.f_opnum_offset.offset == 0
    }
}

fn dissect_endpoint(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(RsiEndpoint, usize)> {
    let (vendor_id, pos) = read_u16(buf, offset)?;
    tree.add_uint(&fields::VENDOR_ID, offset, vendor_id as u32);
    let (device_id, next) = read_u16(buf, pos)?;
    tree.add_uint(&fields::DEVICE_ID, pos, device_id as u32);
    let pos = next;
    let (instance_id, next) = read_u16(buf, pos)?;
    tree.add_uint(&fields::INSTANCE_ID, pos, instance_id as u32);
    let pos = next;
    let (rsi_interface, next) = read_u8(buf, pos)?;
    tree.add_uint(&fields::RSI_INTERFACE, pos, rsi_interface as u32);
    let end = dissect_padding(buf, next, tree, 1)?;
    let endpoint = RsiEndpoint {
        vendor_id,
        device_id,
        instance_id,
        rsi_interface,
    };
    Ok((endpoint, end))
}

fn dissect_rsp_max_length(buf: &[u8], offset: usize, tree: &mut FieldNode) -> DecodeResult<(u32, usize)> {
    let (rsp_max_length, end) = read_u32(buf, offset)?;
    tree.add_uint(&fields::RSP_MAX_LENGTH, offset, rsp_max_length);
    Ok((rsp_max_length, end))
}

pub(crate) fn dissect_svcs_block(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
    args: &BlockArgs,
) -> DecodeResult<usize> {
    let start = offset;
    let sub = tree.push(FieldNode::subtree("pn_rsi.svcs_block", "RSI SVCS Block", offset, 0));

    let mut offset = offset;
    let mut rsp_max_length = None;
    if args.is_first_fragment() {
        let (value, next) = dissect_rsp_max_length(buf, offset, sub)?;
        rsp_max_length = Some(value);
        offset = next;
    } else if !args.more_fragments {
        sub.append_text(", RSI Header of SVCS is at first segment");
    }
    ctx.block = Some(RsiBlock::Service { rsp_max_length });

    if args.payload_length() > 0 {
        offset = dissect_remaining_user_data(buf, offset, sub, ctx, args);
    }
    sub.set_len(offset - start);
    Ok(offset)
}

pub(crate) fn dissect_conn_block(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
    args: &BlockArgs,
) -> DecodeResult<usize> {
    let start = offset;
    let sub = tree.push(FieldNode::subtree("pn_rsi.conn_block", "RSI CONN Block", offset, 0));

    let mut offset = offset;
    let mut rsp_max_length = None;
    let mut endpoint = None;
    if args.is_first_fragment() {
        let (value, next) = dissect_rsp_max_length(buf, offset, sub)?;
        rsp_max_length = Some(value);
        let (decoded, next) = dissect_endpoint(buf, next, sub)?;
        endpoint = Some(decoded);
        offset = next;
    } else if !args.more_fragments {
        sub.append_text(", RSI Header of CONN is at first segment");
    }
    ctx.block = Some(RsiBlock::Connection {
        rsp_max_length,
        endpoint,
    });

    if args.payload_length() > 0 {
        offset = dissect_remaining_user_data(buf, offset, sub, ctx, args);
    }
    sub.set_len(offset - start);
    Ok(offset)
}

/// The endpoint identity is only present when the request is addressed to the CON-SAP.
pub(crate) fn dissect_sac_block(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
    args: &BlockArgs,
    dst_sap: u16,
) -> DecodeResult<usize> {
    let start = offset;
    let sub = tree.push(FieldNode::subtree(
        "pn_rsi.security_association_control",
        "RSI Security Association Control",
        offset,
        0,
    ));

    let mut offset = offset;
    let mut rsp_max_length = None;
    let mut endpoint = None;
    if args.is_first_fragment() {
        let (value, next) = dissect_rsp_max_length(buf, offset, sub)?;
        rsp_max_length = Some(value);
        offset = next;
        if dst_sap == CON_SAP {
            let (decoded, next) = dissect_endpoint(buf, offset, sub)?;
            endpoint = Some(decoded);
            offset = next;
        }
    } else if !args.more_fragments {
        sub.append_text(", RSI Header of SecurityAssociationControl is at first segment");
    }
    ctx.block = Some(RsiBlock::SecurityAssociationControl {
        rsp_max_length,
        endpoint,
    });

    if args.payload_length() > 0 {
        offset = dissect_remaining_user_data(buf, offset, sub, ctx, args);
    }
    sub.set_len(offset - start);
    Ok(offset)
}

/// Response blocks have no subtree of their own; status and payload go to `tree`.
pub(crate) fn dissect_rsp_block(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
    args: &BlockArgs,
) -> DecodeResult<usize> {
    let mut offset = offset;
    let mut status = None;
    if args.is_first_fragment() {
        let (decoded, next) = dissect_pnio_status(buf, offset, tree)?;
        status = Some(decoded);
        offset = next;
    } else if !args.more_fragments {
        tree.append_text(", RSI Header of RSP is at first fragmented frame");
    }
    ctx.block = Some(RsiBlock::Response { status });

    if args.payload_length() > 0 {
        offset = dissect_remaining_user_data(buf, offset, tree, ctx, args);
    }
    Ok(offset)
}

/// Walks an application payload, labelled with the service it belongs to.
pub fn dissect_rsi_blocks(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    opnum: Opnum,
    direction: PduDirection,
) -> usize {
    tree.append_text(format!(", {} {direction}", opnum.name()));
    dissect_blocks(buf, offset, tree)
}

fn reassembly_key(ctx: &mut DissectContext<'_>) -> Option<ReassemblyKey> {
    if !ctx.reassemble {
        return None;
    }
    let (conversation, direction) = ctx.frame.conversation()?;
    Some(ReassemblyKey {
        conversation: ctx.conversations.find_or_create(conversation),
        direction,
    })
}

/// Hands the bytes from `offset` to the end of the buffer to the reassembly engine and shows
/// the outcome. Returns the end of the buffer.
fn dissect_remaining_user_data(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
    args: &BlockArgs,
) -> usize {
    let payload = &buf[offset.min(buf.len())..];
    let Some(key) = reassembly_key(ctx) else {
        ctx.segment = Some(SegmentStatus::Standalone);
        return dissect_blocks(buf, offset, tree);
    };

    let outcome = ctx.reassembly.process(
        key,
        FragmentId::new(ctx.frame.number, ctx.frame.pdu),
        ctx.frame.visited,
        args.more_fragments,
        payload,
    );
    if let FragmentOutcome::Standalone = outcome {
        ctx.segment = Some(SegmentStatus::Standalone);
        return dissect_blocks(buf, offset, tree);
    }

    ctx.info.append(if args.more_fragments {
        " [PN IO RSI Segment]"
    } else {
        " [Last PN IO RSI Segment]"
    });

    match outcome {
        FragmentOutcome::Reassembled(message) => {
            let total = message.data.len();
            let segments = tree.push(FieldNode {
                generated: true,
                ..FieldNode::subtree(
                    "pn_rsi.segments",
                    format!(
                        "{} PN RSI Segments ({total} bytes)",
                        message.fragments.len()
                    ),
                    0,
                    total,
                )
            });
            for fragment in &message.fragments {
                let end = (fragment.offset + fragment.length).saturating_sub(1);
                segments
                    .add_frame_ref("pn_rsi.segment", "Frame", fragment.frame)
                    .append_text(format!(
                        ", payload: {}-{} ({} bytes)",
                        fragment.offset, end, fragment.length
                    ));
            }
            segments.push(generated_count(
                "pn_rsi.segment.count",
                "Segment count",
                message.fragments.len(),
            ));
            segments.push(generated_count(
                "pn_rsi.reassembled.length",
                "Reassembled pn_rsi length",
                total,
            ));

            let payload_tree = tree.push(FieldNode::subtree(
                "pn_rsi.data_payload",
                "PN IO RSI Data Payload",
                0,
                total,
            ));
            dissect_rsi_blocks(
                &message.data,
                0,
                payload_tree,
                args.f_opnum_offset.opnum,
                args.direction,
            );
            ctx.segment = Some(SegmentStatus::Reassembled {
                length: total,
                segments: message.fragments.len(),
            });
        }
        FragmentOutcome::ReassembledIn { frame, .. } => {
            tree.add_frame_ref("pn_rsi.reassembled_in", "Reassembled pn_rsi in frame", frame);
            ctx.segment = Some(SegmentStatus::ReassembledIn { frame });
        }
        FragmentOutcome::Pending | FragmentOutcome::Standalone => {
            ctx.segment = Some(SegmentStatus::Accumulated {
                more_fragments: args.more_fragments,
            });
        }
    }
    offset + remaining(buf, offset)
}

fn generated_count(key: &'static str, label: &str, value: usize) -> FieldNode {
    FieldNode {
        value: FieldValue::UInt(value as u64),
        generated: true,
        ..FieldNode::subtree(key, format!("{label}: {value}"), 0, 0)
    }
}
