//! Wire buffers and bounds-checked cursors
//!
//! Every message is laid out in a [`MessageBuffer`] and walked with a
//! [`ReadCursor`] or [`WriteCursor`]. Each step checks the remaining length
//! before touching the bytes, so a malformed count or size field turns into
//! [`IpcError::BufferOverflow`] instead of an out-of-bounds access.

use alloc::vec;
use alloc::vec::Vec;

use super::{IpcError, Result};

/// Round `value` up to the next multiple of `align` (a power of two)
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// ============================================================================
// Message Buffer
// ============================================================================

/// Owned, zero-initialized, 8-byte aligned message storage
///
/// The primitive writes headers and descriptors through this memory, so the
/// storage is kept in `u64` words and viewed as bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageBuffer {
    words: Vec<u64>,
    len: usize,
}

impl MessageBuffer {
    /// Allocate a zeroed buffer of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; align_up(len, 8) / 8],
            len,
        }
    }

    /// Copy `bytes` into a fresh buffer of at least `len` bytes
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut buffer = Self::zeroed(len.max(bytes.len()));
        buffer.as_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        buffer
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte view
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    /// Mutable byte view
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }

    /// Raw pointer for the primitive
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }
}

impl core::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("len", &self.len)
            .finish()
    }
}

// ============================================================================
// Read Cursor
// ============================================================================

/// Forward-only reader over a byte slice
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    /// Start reading at the beginning of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless `needed` more bytes are available
    pub fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(IpcError::BufferOverflow {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Borrow `n` bytes starting `offset` bytes ahead without advancing
    pub fn peek_at(&self, offset: usize, n: usize) -> Result<&'a [u8]> {
        self.ensure(offset + n)?;
        let start = self.pos + offset;
        Ok(&self.buf[start..start + n])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_ne_bytes(word))
    }

    /// Advance by `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Advance to the next multiple of `align`, clamped to the buffer end
    pub fn align_to(&mut self, align: usize) {
        self.pos = align_up(self.pos, align).min(self.buf.len());
    }

    /// Everything not yet read
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

// ============================================================================
// Write Cursor
// ============================================================================

/// Forward-only writer over a mutable byte slice
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    /// Start writing at the beginning of `buf`
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Space left to write
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Copy `bytes` and advance past them
    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(IpcError::BufferOverflow {
                offset: self.pos,
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_ne_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_ne_bytes())
    }

    /// Advance by `n` bytes, leaving them as-is
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(IpcError::BufferOverflow {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        self.pos += n;
        Ok(())
    }

    /// Move to the next multiple of `align`, leaving the skipped bytes as-is
    pub fn align_to(&mut self, align: usize) -> Result<()> {
        let target = align_up(self.pos, align);
        self.skip(target - self.pos)
    }
}
