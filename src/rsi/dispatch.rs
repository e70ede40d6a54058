// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Routing of a decoded header to the RTA-type specific body decoder, and of FREQ/FRSP
//! PDUs to the block decoder selected by their opnum.
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::constants::CON_SAP;
use crate::rsi::blocks::{
    dissect_conn_block, dissect_rsp_block, dissect_sac_block, dissect_svcs_block, BlockArgs,
};
use crate::rsi::codec::{read_u16, read_u32, remaining, DecodeResult};
use crate::rsi::dissector::DissectContext;
use crate::rsi::fields;
use crate::rsi::header::{PduHeader, RtaType};
use crate::rsi::leaf::{dissect_pnio_status, dissect_undecoded, dissect_user_data};
use crate::rsi::tree::{FieldNode, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Opnum {
    Connect,
    Read,
    Write,
    Control,
    ReadImplicit,
    ReadConnectionless,
    ReadNotification,
    PrmWriteMore,
    PrmWriteEnd,
    SecurityAssociationControl,
    Reserved(u8),
}

impl From<u8> for Opnum {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Opnum::Connect,
            0x2 => Opnum::Read,
            0x3 => Opnum::Write,
            0x4 => Opnum::Control,
            0x5 => Opnum::ReadImplicit,
            0x6 => Opnum::ReadConnectionless,
            0x7 => Opnum::ReadNotification,
            0x8 => Opnum::PrmWriteMore,
            0x9 => Opnum::PrmWriteEnd,
            0xA => Opnum::SecurityAssociationControl,
            other => Opnum::Reserved(other),
        }
    }
}

impl Opnum {
    pub fn value(&self) -> u8 {
        match self {
            Opnum::Connect => 0x0,
            Opnum::Read => 0x2,
            Opnum::Write => 0x3,
            Opnum::Control => 0x4,
            Opnum::ReadImplicit => 0x5,
            Opnum::ReadConnectionless => 0x6,
            Opnum::ReadNotification => 0x7,
            Opnum::PrmWriteMore => 0x8,
            Opnum::PrmWriteEnd => 0x9,
            Opnum::SecurityAssociationControl => 0xA,
            Opnum::Reserved(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opnum::Connect => "Connect",
            Opnum::Read => "Read",
            Opnum::Write => "Write",
            Opnum::Control => "Control",
            Opnum::ReadImplicit => "ReadImplicit",
            Opnum::ReadConnectionless => "ReadConnectionless",
            Opnum::ReadNotification => "ReadNotification",
            Opnum::PrmWriteMore => "PrmWriteMore",
            Opnum::PrmWriteEnd => "PrmWriteEnd",
            Opnum::SecurityAssociationControl => "SecurityAssociationControl",
            Opnum::Reserved(_) => "Reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PduDirection {
    Request,
    Response,
}

impl fmt::Display for PduDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduDirection::Request => write!(f, "request"),
            PduDirection::Response => write!(f, "response"),
        }
    }
}

/// The FOpnumOffset word: fragment offset, opnum and call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FOpnumOffset {
    pub raw: u32,
    pub offset: u32,
    pub opnum: Opnum,
    pub call_sequence: u8,
}

impl From<u32> for FOpnumOffset {
    fn from(raw: u32) -> Self {
        Self {
            raw,
            offset: fields::F_OPNUM_OFFSET_OFFSET.extract(raw),
            opnum: Opnum::from(fields::F_OPNUM_OFFSET_OPNUM.extract(raw) as u8),
            call_sequence: fields::F_OPNUM_OFFSET_CALL_SEQUENCE.extract(raw) as u8,
        }
    }
}

pub fn dissect_f_opnum_offset(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(FOpnumOffset, usize)> {
    let (raw, end) = read_u32(buf, offset)?;
    let node = tree.add_uint(&fields::F_OPNUM_OFFSET, offset, raw);
    node.add_uint(&fields::F_OPNUM_OFFSET_OFFSET, offset, raw);
    node.add_uint(&fields::F_OPNUM_OFFSET_OPNUM, offset, raw);
    node.add_uint(&fields::F_OPNUM_OFFSET_CALL_SEQUENCE, offset, raw);
    Ok((FOpnumOffset::from(raw), end))
}

/// Decodes the body that follows the RSI header according to its RTA type.
pub(crate) fn dissect_rta(
    buf: &[u8],
    offset: usize,
    header: &PduHeader,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
) -> DecodeResult<usize> {
    match header.pdu_type.rta_type {
        RtaType::Ack => {
            ctx.info.append("ACK-RTA");
            if header.add_flags.notification {
                ctx.info.append(", Application Ready Notification");
            }
            Ok(offset)
        }
        RtaType::Err => {
            ctx.info.append("ERR-RTA");
            let (_, mut offset) = dissect_pnio_status(buf, offset, tree)?;
            if ctx.secured && remaining(buf, offset) > 0 {
                // VendorDeviceErrorInfo
                let (vendor_id, next) = read_u16(buf, offset)?;
                tree.add_uint(&fields::VENDOR_ID, offset, vendor_id as u32);
                let (device_id, next2) = read_u16(buf, next)?;
                tree.add_uint(&fields::DEVICE_ID, next, device_id as u32);
                offset = dissect_user_data(buf, next2, tree, remaining(buf, next2), "Data")?;
            }
            Ok(offset)
        }
        RtaType::Freq => dissect_freq(buf, offset, header, tree, ctx),
        RtaType::Frsp => dissect_frsp(buf, offset, header, tree, ctx),
        RtaType::Reserved(value) => {
            debug!("frame {}: reserved PDU type {value}", ctx.frame.number);
            ctx.info
                .note(Severity::Note, offset, format!("Reserved PDU type {value}"));
            Ok(dissect_undecoded(buf, offset, tree))
        }
    }
}

fn dissect_freq(
    buf: &[u8],
    offset: usize,
    header: &PduHeader,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
) -> DecodeResult<usize> {
    let (f_opnum_offset, offset) = dissect_f_opnum_offset(buf, offset, tree)?;
    let args = BlockArgs::new(header, f_opnum_offset, PduDirection::Request);

    match f_opnum_offset.opnum {
        Opnum::Reserved(value) => {
            ctx.info.append("Reserved");
            ctx.info
                .note(Severity::Note, offset, format!("Reserved opnum {value}"));
            return Ok(dissect_undecoded(buf, offset, tree));
        }
        Opnum::SecurityAssociationControl => ctx.info.append("SecurityAssociationControl"),
        opnum => ctx.info.append(&format!("{} request", opnum.name())),
    }

    debug!(
        "frame {}: {:?} request to SAP {:#06x}",
        ctx.frame.number, f_opnum_offset.opnum, header.dst_sap
    );
    match f_opnum_offset.opnum {
        // the CON-SAP is the only thing telling the two Connect layouts apart
        Opnum::Connect if header.dst_sap == CON_SAP => {
            dissect_svcs_block(buf, offset, tree, ctx, &args)
        }
        Opnum::Connect => dissect_conn_block(buf, offset, tree, ctx, &args),
        Opnum::ReadImplicit | Opnum::ReadConnectionless => {
            dissect_conn_block(buf, offset, tree, ctx, &args)
        }
        Opnum::SecurityAssociationControl => {
            dissect_sac_block(buf, offset, tree, ctx, &args, header.dst_sap)
        }
        _ => dissect_svcs_block(buf, offset, tree, ctx, &args),
    }
}

fn dissect_frsp(
    buf: &[u8],
    offset: usize,
    header: &PduHeader,
    tree: &mut FieldNode,
    ctx: &mut DissectContext<'_>,
) -> DecodeResult<usize> {
    let (f_opnum_offset, offset) = dissect_f_opnum_offset(buf, offset, tree)?;
    match f_opnum_offset.opnum {
        Opnum::Reserved(_) => ctx.info.append("Reserved"),
        opnum => ctx.info.append(&format!("{} response", opnum.name())),
    }
    let args = BlockArgs::new(header, f_opnum_offset, PduDirection::Response);
    dissect_rsp_block(buf, offset, tree, ctx, &args)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_f_opnum_offset_parts() {
        let parts = FOpnumOffset::from(0x4200_0010u32);
        assert_eq!(parts.offset, 0x10);
        assert_eq!(parts.opnum, Opnum::Read);
        assert_eq!(parts.call_sequence, 2);

        let mut tree = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", 0, 4);
        let (decoded, end) = dissect_f_opnum_offset(&[0x0A, 0x00, 0x00, 0x00], 0, &mut tree).unwrap();
        assert_eq!(end, 4);
        assert_eq!(decoded.opnum, Opnum::SecurityAssociationControl);
        assert_eq!(tree.find("pn_rsi.f_opnum_offset").unwrap().children.len(), 3);
    }

    #[test]
    fn test_opnum_names() {
        assert_eq!(Opnum::from(1u8), Opnum::Reserved(1));
        assert_eq!(Opnum::from(11u8).name(), "Reserved");
        assert_eq!(Opnum::from(31u8), Opnum::Reserved(31));
        for value in 0u8..=0x1F {
            assert_eq!(Opnum::from(value).value(), value);
        }
        assert_eq!(PduDirection::Response.to_string(), "response");
    }
}
