// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! The fixed 12 byte RSI header: service access points, PDU type, additional flags,
//! sequence numbers and the variable part length.
use serde::Serialize;

use crate::rsi::codec::{read_u16, read_u8, DecodeResult};
use crate::rsi::fields;
use crate::rsi::tree::FieldNode;

/// RTA PDU type, the low nibble of the PDUType byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RtaType {
    Ack,
    Err,
    Freq,
    Frsp,
    Reserved(u8),
}

impl From<u8> for RtaType {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            3 => RtaType::Ack,
            4 => RtaType::Err,
            5 => RtaType::Freq,
            6 => RtaType::Frsp,
            other => RtaType::Reserved(other),
        }
    }
}

impl RtaType {
    pub fn value(&self) -> u8 {
        match self {
            RtaType::Ack => 3,
            RtaType::Err => 4,
            RtaType::Freq => 5,
            RtaType::Frsp => 6,
            RtaType::Reserved(v) => *v,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            RtaType::Ack => "ack",
            RtaType::Err => "err",
            RtaType::Freq => "freq",
            RtaType::Frsp => "frsp",
            RtaType::Reserved(_) => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PduType {
    pub rta_type: RtaType,
    pub version: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddFlags {
    pub raw: u8,
    pub window_size: u8,
    pub tack: bool,
    pub more_fragments: bool,
    pub notification: bool,
}

impl From<u8> for AddFlags {
    fn from(raw: u8) -> Self {
        let raw32 = raw as u32;
        Self {
            raw,
            window_size: fields::ADD_FLAGS_WINDOW_SIZE.extract(raw32) as u8,
            tack: fields::ADD_FLAGS_TACK.extract(raw32) != 0,
            more_fragments: fields::ADD_FLAGS_MORE_FRAG.extract(raw32) != 0,
            notification: fields::ADD_FLAGS_NOTIFICATION.extract(raw32) != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PduHeader {
    pub dst_sap: u16,
    pub src_sap: u16,
    pub pdu_type: PduType,
    pub add_flags: AddFlags,
    pub send_seq_num: u16,
    pub ack_seq_num: u16,
    pub var_part_len: u16,
}

pub fn dissect_access_points(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<((u16, u16), usize)> {
    let (dst_sap, pos) = read_u16(buf, offset)?;
    tree.add_uint(&fields::DST_SRV_ACCESS_POINT, offset, dst_sap as u32);
    let (src_sap, end) = read_u16(buf, pos)?;
    tree.add_uint(&fields::SRC_SRV_ACCESS_POINT, pos, src_sap as u32);
    Ok(((dst_sap, src_sap), end))
}

pub fn dissect_pdu_type(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(PduType, usize)> {
    let (raw, end) = read_u8(buf, offset)?;
    let node = tree.push(FieldNode::subtree("pn_rsi.pdu_type", "PDUType", offset, 1));
    node.add_uint(&fields::PDU_TYPE_TYPE_FIELD, offset, raw as u32);
    node.add_uint(&fields::PDU_TYPE_VERSION_FIELD, offset, raw as u32);
    let pdu_type = PduType {
        rta_type: RtaType::from(raw),
        version: fields::PDU_TYPE_VERSION_FIELD.extract(raw as u32) as u8,
    };
    Ok((pdu_type, end))
}

pub fn dissect_add_flags(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(AddFlags, usize)> {
    let (raw, end) = read_u8(buf, offset)?;
    let flags = AddFlags::from(raw);
    let node = tree.push(FieldNode::subtree("pn_rsi.add_flags", "AddFlags", offset, 1));
    for spec in [
        &fields::ADD_FLAGS_WINDOW_SIZE,
        &fields::ADD_FLAGS_RESERVED1,
        &fields::ADD_FLAGS_TACK,
        &fields::ADD_FLAGS_MORE_FRAG,
        &fields::ADD_FLAGS_NOTIFICATION,
        &fields::ADD_FLAGS_RESERVED2,
    ] {
        node.add_uint(spec, offset, raw as u32);
    }
    node.append_text(format!(
        ", Window Size: {}, Tack: {}  ",
        flags.window_size, flags.tack as u8
    ));
    Ok((flags, end))
}

/// Decodes the header fields that follow the two service access points.
pub fn dissect_header_after_saps(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    dst_sap: u16,
    src_sap: u16,
) -> DecodeResult<(PduHeader, usize)> {
    let (pdu_type, pos) = dissect_pdu_type(buf, offset, tree)?;
    let (add_flags, pos) = dissect_add_flags(buf, pos, tree)?;
    let (send_seq_num, next) = read_u16(buf, pos)?;
    tree.add_uint(&fields::SEND_SEQ_NUM, pos, send_seq_num as u32);
    let pos = next;
    let (ack_seq_num, next) = read_u16(buf, pos)?;
    tree.add_uint(&fields::ACK_SEQ_NUM, pos, ack_seq_num as u32);
    let pos = next;
    let (var_part_len, end) = read_u16(buf, pos)?;
    tree.add_uint(&fields::VAR_PART_LEN_FIELD, pos, var_part_len as u32);

    let header = PduHeader {
        dst_sap,
        src_sap,
        pdu_type,
        add_flags,
        send_seq_num,
        ack_seq_num,
        var_part_len,
    };
    Ok((header, end))
}

pub fn dissect_pdu_header(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(PduHeader, usize)> {
    let ((dst_sap, src_sap), pos) = dissect_access_points(buf, offset, tree)?;
    dissect_header_after_saps(buf, pos, tree, dst_sap, src_sap)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rsi::codec::DecodeError;

    const HEADER: [u8; 12] = [
        0xFF, 0xFF, // dst SAP
        0x00, 0x01, // src SAP
        0x15, // version 1, FREQ
        0x33, // window 3, TACK, MoreFrag
        0x00, 0x07, // SendSeqNum
        0x00, 0x06, // AckSeqNum
        0x00, 0x10, // VarPartLen
    ];

    #[test]
    fn test_header_fields() {
        let mut tree = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", 0, 12);
        let (header, end) = dissect_pdu_header(&HEADER, 0, &mut tree).unwrap();
        assert_eq!(end, 12);
        assert_eq!(header.dst_sap, 0xFFFF);
        assert_eq!(header.src_sap, 1);
        assert_eq!(header.pdu_type.rta_type, RtaType::Freq);
        assert_eq!(header.pdu_type.version, 1);
        assert_eq!(header.add_flags.window_size, 3);
        assert!(header.add_flags.tack);
        assert!(header.add_flags.more_fragments);
        assert!(!header.add_flags.notification);
        assert_eq!(header.send_seq_num, 7);
        assert_eq!(header.ack_seq_num, 6);
        assert_eq!(header.var_part_len, 0x10);

        // type and version both come from the same byte
        let pdu_type = tree.find("pn_rsi.pdu_type").unwrap();
        assert_eq!(pdu_type.children.len(), 2);
        assert!(pdu_type.children.iter().all(|c| c.offset == 4));
        assert_eq!(tree.find_all("pn_rsi.add_flags_reserved").len(), 2);
        assert_eq!(
            tree.find("pn_rsi.add_flags").unwrap().text,
            vec![", Window Size: 3, Tack: 1  ".to_string()]
        );
    }

    #[test]
    fn test_truncated_header_keeps_decoded_fields() {
        let mut tree = FieldNode::subtree("pn_rsi", "PROFINET IO RSI", 0, 12);
        let err = dissect_pdu_header(&HEADER[..7], 0, &mut tree).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedField {
                offset: 6,
                width: 2,
                available: 7
            }
        );
        assert!(tree.contains("pn_rsi.add_flags"));
        assert!(!tree.contains("pn_rsi.send_seq_num"));
    }

    #[test]
    fn test_reserved_rta_type() {
        assert_eq!(RtaType::from(0x17u8), RtaType::Reserved(7));
        assert_eq!(RtaType::from(0x10u8), RtaType::Reserved(0));
        assert_eq!(RtaType::Reserved(9).value(), 9);
    }
}
