// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Leaf decoders shared by the RSI block decoders: PNIO status, padding, undecoded remainder,
//! opaque user data and the generic PNIO block walker used for application payload.
use serde::Serialize;
use tracing::debug;

use crate::constants::{BLOCK_HEADER_SIZE, PNIO_STATUS_SIZE};
use crate::rsi::codec::{read_bytes, read_u16, read_u8, remaining, DecodeError, DecodeResult};
use crate::rsi::fields;
use crate::rsi::tree::FieldNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PnioStatus {
    pub error_code: u8,
    pub error_decode: u8,
    pub error_code1: u8,
    pub error_code2: u8,
}

impl PnioStatus {
    pub fn is_ok(&self) -> bool {
        self.error_code == 0 && self.error_decode == 0 && self.error_code1 == 0 && self.error_code2 == 0
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes([
            self.error_code,
            self.error_decode,
            self.error_code1,
            self.error_code2,
        ])
    }
}

pub fn dissect_pnio_status(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
) -> DecodeResult<(PnioStatus, usize)> {
    let (bytes, end) = read_bytes(buf, offset, PNIO_STATUS_SIZE)?;
    let status = PnioStatus {
        error_code: bytes[0],
        error_decode: bytes[1],
        error_code1: bytes[2],
        error_code2: bytes[3],
    };
    let label = if status.is_ok() {
        "PNIOStatus: OK".to_string()
    } else {
        format!("PNIOStatus: Error: {:#010x}", status.as_u32())
    };
    let node = tree.push(FieldNode::subtree(
        "pn_io.pnio_status",
        label,
        offset,
        PNIO_STATUS_SIZE,
    ));
    node.add_uint(&fields::ERROR_CODE, offset, status.error_code as u32);
    node.add_uint(&fields::ERROR_DECODE, offset + 1, status.error_decode as u32);
    node.add_uint(&fields::ERROR_CODE1, offset + 2, status.error_code1 as u32);
    node.add_uint(&fields::ERROR_CODE2, offset + 3, status.error_code2 as u32);
    Ok((status, end))
}

pub fn dissect_padding(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    count: usize,
) -> DecodeResult<usize> {
    let (bytes, end) = read_bytes(buf, offset, count)?;
    tree.add_bytes("pn_io.padding", "Padding", offset, bytes);
    Ok(end)
}

/// Shows everything from `offset` to the end of the buffer as undecoded. Never fails.
pub fn dissect_undecoded(buf: &[u8], offset: usize, tree: &mut FieldNode) -> usize {
    let len = remaining(buf, offset);
    if len > 0 {
        tree.add_bytes("pn_io.data", "Undecoded Data", offset, &buf[offset..]);
    }
    offset.max(buf.len())
}

pub fn dissect_user_data(
    buf: &[u8],
    offset: usize,
    tree: &mut FieldNode,
    length: usize,
    label: &str,
) -> DecodeResult<usize> {
    let (bytes, end) = read_bytes(buf, offset, length)?;
    tree.add_bytes("pn_io.user_data", label, offset, bytes);
    Ok(end)
}

/// Walks consecutive PNIO blocks until the buffer is exhausted. A header or body that does not
/// fit ends the walk and the rest is shown as undecoded.
pub fn dissect_blocks(buf: &[u8], mut offset: usize, tree: &mut FieldNode) -> usize {
    while offset < buf.len() {
        match dissect_block(buf, offset) {
            Ok((node, next)) => {
                tree.push(node);
                offset = next;
            }
            Err(e) => {
                debug!("stopping block walk at offset {offset}: {e}");
                return dissect_undecoded(buf, offset, tree);
            }
        }
    }
    offset
}

fn dissect_block(buf: &[u8], offset: usize) -> DecodeResult<(FieldNode, usize)> {
    let (block_type, pos) = read_u16(buf, offset)?;
    let (block_length, pos) = read_u16(buf, pos)?;
    let (version_high, pos) = read_u8(buf, pos)?;
    let (version_low, pos) = read_u8(buf, pos)?;

    // BlockLength counts the version bytes but not type and length.
    let body_len = (block_length as usize)
        .checked_sub(2)
        .ok_or(DecodeError::TruncatedField {
            offset: offset + 2,
            width: 2,
            available: buf.len(),
        })?;
    let (body, end) = read_bytes(buf, pos, body_len)?;

    let mut block = FieldNode::subtree(
        "pn_io.block",
        format!("Block: {block_type:#06x}, Version: {version_high}.{version_low}"),
        offset,
        end - offset,
    );
    let header = block.push(FieldNode::subtree(
        "pn_io.block_header",
        "BlockHeader",
        offset,
        BLOCK_HEADER_SIZE,
    ));
    header.add_uint(&fields::BLOCK_TYPE, offset, block_type as u32);
    header.add_uint(&fields::BLOCK_LENGTH, offset + 2, block_length as u32);
    header.add_uint(&fields::BLOCK_VERSION_HIGH, offset + 4, version_high as u32);
    header.add_uint(&fields::BLOCK_VERSION_LOW, offset + 5, version_low as u32);
    if !body.is_empty() {
        block.add_bytes("pn_io.block_data", "BlockData", pos, body);
    }
    Ok((block, end))
}

#[cfg(test)]
mod test {
    use super::*;

    fn root() -> FieldNode {
        FieldNode::subtree("test", "test", 0, 0)
    }

    #[test]
    fn test_pnio_status() {
        let mut tree = root();
        let (status, end) = dissect_pnio_status(&[0, 0, 0, 0], 0, &mut tree).unwrap();
        assert!(status.is_ok());
        assert_eq!(end, 4);
        assert_eq!(tree.children[0].label, "PNIOStatus: OK");

        let mut tree = root();
        let (status, _) = dissect_pnio_status(&[0xde, 0x81, 0x3c, 0x01], 0, &mut tree).unwrap();
        assert!(!status.is_ok());
        assert_eq!(tree.children[0].label, "PNIOStatus: Error: 0xde813c01");
        assert_eq!(tree.find_all("pn_io.error_code1").len(), 1);
    }

    #[test]
    fn test_undecoded_never_fails() {
        let mut tree = root();
        assert_eq!(dissect_undecoded(&[1, 2, 3], 1, &mut tree), 3);
        assert_eq!(tree.children[0].length, 2);
        let mut tree = root();
        assert_eq!(dissect_undecoded(&[1, 2, 3], 3, &mut tree), 3);
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_block_walk() {
        // two blocks: type 0x0001 with 2 body bytes, type 0x8001 with no body
        let buf = [
            0x00, 0x01, 0x00, 0x04, 0x01, 0x00, 0xaa, 0xbb, 0x80, 0x01, 0x00, 0x02, 0x01, 0x00,
        ];
        let mut tree = root();
        assert_eq!(dissect_blocks(&buf, 0, &mut tree), buf.len());
        let blocks = tree.find_all("pn_io.block");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].length, 8);
        assert_eq!(
            blocks[1].find("pn_io.block_type").and_then(|n| n.uint()),
            Some(0x8001)
        );
        assert!(!tree.contains("pn_io.data"));
    }

    #[test]
    fn test_block_walk_falls_back_to_undecoded() {
        // block length claims 16 body bytes but only 2 follow
        let buf = [0x00, 0x01, 0x00, 0x12, 0x01, 0x00, 0xaa, 0xbb];
        let mut tree = root();
        assert_eq!(dissect_blocks(&buf, 0, &mut tree), buf.len());
        assert!(!tree.contains("pn_io.block"));
        assert_eq!(tree.find("pn_io.data").unwrap().length, buf.len());
    }
}
