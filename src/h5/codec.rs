//! Field codec: little-endian fixed-width integer reads against a
//! [`Context`]. Every structural read in the parser goes through here so
//! offset bookkeeping lives in one place.

use crate::h5::context::Context;
use crate::error::Result;

/// A cursor over one open resource. Advances its own position as fields are
/// read, so callers don't thread a position parameter through every call.
pub struct Cursor<'a> {
    ctx: &'a Context,
    pos: u64,
}

impl<'a> Cursor<'a> {
    pub fn new(ctx: &'a Context, pos: u64) -> Self {
        Self { ctx, pos }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn advance(&mut self, n: u64) {
        self.pos += n;
    }

    /// Read a 1/2/4/8-byte little-endian unsigned field and advance past it.
    pub fn field(&mut self, size: usize) -> Result<u64> {
        debug_assert!(size == 1 || size == 2 || size == 4 || size == 8);
        let mut raw = [0u8; 8];
        self.ctx.read_bytes(self.pos, &mut raw[..size])?;
        self.pos += size as u64;
        Ok(match size {
            1 => raw[0] as u64,
            2 => u16::from_le_bytes([raw[0], raw[1]]) as u64,
            4 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64,
            8 => u64::from_le_bytes(raw),
            _ => unreachable!(),
        })
    }

    /// Variable-width little-endian field of `l` bytes (l ∈ [1, 8]),
    /// used for v2 b-tree record-count/offset/length fields whose width is
    /// derived rather than fixed.
    pub fn varfield(&mut self, l: usize) -> Result<u64> {
        assert!(l >= 1 && l <= 8);
        let mut raw = [0u8; 8];
        self.ctx.read_bytes(self.pos, &mut raw[..l])?;
        self.pos += l as u64;
        let mut value: u64 = 0;
        for (i, b) in raw[..l].iter().enumerate() {
            value |= (*b as u64) << (8 * i);
        }
        Ok(value)
    }

    /// Raw byte array read, advancing past it.
    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.ctx.read_bytes(self.pos, &mut buf)?;
        self.pos += n as u64;
        Ok(buf)
    }

    /// Peek `n` bytes without advancing the cursor.
    pub fn peek(&self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.ctx.read_bytes(self.pos, &mut buf)?;
        Ok(buf)
    }

    /// NUL-terminated string starting at the current position, advancing
    /// past the string and its terminator, padded to the given alignment
    /// (used for local-heap and symbol-table names).
    pub fn cstring_padded(&mut self, align: u64) -> Result<String> {
        let start = self.pos;
        let mut out = Vec::new();
        loop {
            let b = self.field(1)? as u8;
            if b == 0 {
                break;
            }
            out.push(b);
        }
        let consumed = self.pos - start;
        let padded = consumed.div_ceil(align) * align;
        self.pos = start + padded;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
