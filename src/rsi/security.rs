// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Security envelope: the 8 byte metadata block in front of a secured RSI PDU, the trailing
//! checksum of authenticated PDUs and the opaque body of encrypted ones.
use serde::Serialize;

use crate::constants::{SECURITY_CHECKSUM_SIZE, SECURITY_META_DATA_SIZE};
use crate::rsi::codec::{read_bytes, read_u16, read_u32, read_u8, remaining, DecodeResult};
use crate::rsi::fields;
use crate::rsi::tree::FieldNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtectionMode {
    /// Clear text body followed by a checksum.
    AuthenticationOnly,
    /// Encrypted body, opaque without the key.
    AuthenticatedEncryption,
}

impl From<u8> for ProtectionMode {
    fn from(value: u8) -> Self {
        if value & 0x01 == 0 {
            ProtectionMode::AuthenticationOnly
        } else {
            ProtectionMode::AuthenticatedEncryption
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityMetaData {
    pub protection_mode: ProtectionMode,
    pub generation_number: u8,
    pub sequence_counter: u32,
    pub security_length: u16,
}

pub fn dissect_security_meta_data(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(SecurityMetaData, usize)> {
    let node = tree.push(FieldNode::subtree(
        "pn_rsi.security",
        "SecurityMetaData",
        offset,
        SECURITY_META_DATA_SIZE,
    ));

    let (information, pos) = read_u8(buf, offset)?;
    let sub = node.add_uint(&fields::SECURITY_INFORMATION, offset, information as u32);
    sub.add_uint(&fields::SECURITY_PROTECTION_MODE, offset, information as u32);
    sub.add_uint(&fields::SECURITY_INFORMATION_RESERVED, offset, information as u32);

    let (control, next) = read_u8(buf, pos)?;
    let sub = node.add_uint(&fields::SECURITY_CONTROL, pos, control as u32);
    sub.add_uint(&fields::SECURITY_GENERATION_NUMBER, pos, control as u32);
    sub.add_uint(&fields::SECURITY_CONTROL_RESERVED, pos, control as u32);
    let pos = next;

    let (sequence_counter, next) = read_u32(buf, pos)?;
    node.add_uint(&fields::SECURITY_SEQUENCE_COUNTER, pos, sequence_counter);
    let pos = next;

    let (length, end) = read_u16(buf, pos)?;
    let sub = node.add_uint(&fields::SECURITY_LENGTH, pos, length as u32);
    sub.add_uint(&fields::SECURITY_LENGTH_LENGTH, pos, length as u32);
    sub.add_uint(&fields::SECURITY_LENGTH_RESERVED, pos, length as u32);

    let meta = SecurityMetaData {
        protection_mode: ProtectionMode::from(information),
        generation_number: fields::SECURITY_GENERATION_NUMBER.extract(control as u32) as u8,
        sequence_counter,
        security_length: fields::SECURITY_LENGTH_LENGTH.extract(length as u32) as u16,
    };
    Ok((meta, end))
}

pub fn dissect_security_checksum(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<usize> {
    let (bytes, end) = read_bytes(buf, offset, SECURITY_CHECKSUM_SIZE)?;
    tree.add_bytes("pn_rsi.security_checksum", "SecurityChecksum", offset, bytes);
    Ok(end)
}

/// Everything from `offset` on is ciphertext. Returns the end offset and the byte count.
pub fn dissect_security_data(buf: &[u8], offset: usize, tree: &mut FieldNode) -> (usize, usize) {
    let len = remaining(buf, offset);
    if len > 0 {
        tree.add_bytes("pn_rsi.security_data", "SecurityData", offset, &buf[offset..]);
    }
    (offset + len, len)
}

#[cfg(test)]
mod test {
    use super::*;

    const META: [u8; 8] = [
        0x01, // authenticated encryption
        0x23, // generation 3
        0x00, 0x00, 0x00, 0x2a, // sequence counter
        0xF8, 0x10, // reserved bits set, length 16
    ];

    #[test]
    fn test_meta_data() {
        let mut tree = FieldNode::subtree("pn_rsi", "PROFINET IO RSI with Security", 0, 0);
        let (meta, end) = dissect_security_meta_data(&META, 0, &mut tree).unwrap();
        assert_eq!(end, 8);
        assert_eq!(meta.protection_mode, ProtectionMode::AuthenticatedEncryption);
        assert_eq!(meta.generation_number, 3);
        assert_eq!(meta.sequence_counter, 42);
        assert_eq!(meta.security_length, 16);
        let node = tree.find("pn_rsi.security").unwrap();
        assert_eq!(node.label, "SecurityMetaData");
        assert_eq!(
            node.find("pn_rsi.security_length.reserved").and_then(|n| n.uint()),
            Some(0x1F)
        );
    }

    #[test]
    fn test_checksum_must_fit() {
        let mut tree = FieldNode::subtree("pn_rsi", "", 0, 0);
        assert!(dissect_security_checksum(&[0; 15], 0, &mut tree).is_err());
        assert_eq!(dissect_security_checksum(&[0; 20], 4, &mut tree), Ok(20));
        assert_eq!(tree.find("pn_rsi.security_checksum").unwrap().offset, 4);
    }

    #[test]
    fn test_security_data() {
        let mut tree = FieldNode::subtree("pn_rsi", "", 0, 0);
        assert_eq!(dissect_security_data(&[1, 2, 3, 4], 1, &mut tree), (4, 3));
        assert_eq!(dissect_security_data(&[1, 2], 2, &mut tree), (2, 0));
        assert_eq!(tree.find_all("pn_rsi.security_data").len(), 1);
    }
}
