// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Bounded big-endian field reads and bit-field extraction.
//!
//! Every read returns the decoded value together with the offset just past it, so decoders
//! thread a cursor through a PDU the same way regardless of field width. A read that would run
//! past the captured length fails with [`DecodeError::TruncatedField`] instead of panicking.
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("field of {width} bytes at offset {offset} exceeds captured length {available}")]
    TruncatedField {
        offset: usize,
        width: usize,
        available: usize,
    },

    #[error("Block version {high}.{low} not implemented yet!")]
    UnsupportedVersion { high: u8, low: u8 },
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

fn check_bounds(buf: &[u8], offset: usize, width: usize) -> DecodeResult<()> {
    match offset.checked_add(width) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(DecodeError::TruncatedField {
            offset,
            width,
            available: buf.len(),
        }),
    }
}

pub fn read_u8(buf: &[u8], offset: usize) -> DecodeResult<(u8, usize)> {
    check_bounds(buf, offset, 1)?;
    Ok((buf[offset], offset + 1))
}

pub fn read_u16(buf: &[u8], offset: usize) -> DecodeResult<(u16, usize)> {
    check_bounds(buf, offset, 2)?;
    Ok((BigEndian::read_u16(&buf[offset..offset + 2]), offset + 2))
}

pub fn read_u32(buf: &[u8], offset: usize) -> DecodeResult<(u32, usize)> {
    check_bounds(buf, offset, 4)?;
    Ok((BigEndian::read_u32(&buf[offset..offset + 4]), offset + 4))
}

pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> DecodeResult<(&[u8], usize)> {
    check_bounds(buf, offset, len)?;
    Ok((&buf[offset..offset + len], offset + len))
}

/// Captured bytes left after `offset`; zero when the cursor is at or past the end.
pub fn remaining(buf: &[u8], offset: usize) -> usize {
    buf.len().saturating_sub(offset)
}

/// A named sub-field of a raw word, located by its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub mask: u32,
}

impl BitField {
    pub const fn new(mask: u32) -> Self {
        Self { mask }
    }

    /// Right shift that aligns the lowest mask bit with bit 0. A zero mask selects the whole word.
    pub const fn shift(&self) -> u32 {
        if self.mask == 0 {
            0
        } else {
            self.mask.trailing_zeros()
        }
    }

    pub const fn extract(&self, raw: u32) -> u32 {
        if self.mask == 0 {
            raw
        } else {
            (raw & self.mask) >> self.shift()
        }
    }
}
