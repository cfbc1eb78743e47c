//! Receive trailers
//!
//! The kernel appends a trailer after every received message, aligned to the
//! header's natural boundary. Its layout grows with the elements requested
//! in the receive options; this module only relies on the leading
//! `{type, size}` pair and offers typed views of the well-known elements.

use heapless::Vec;

use super::cursor::ReadCursor;
use super::{IpcError, Result};

// ============================================================================
// Trailer Constants
// ============================================================================

/// The only trailer format the kernel produces
pub const MACH_MSG_TRAILER_FORMAT_0: u32 = 0;

/// `{type, size}` only
pub const MACH_MSG_TRAILER_MINIMUM_SIZE: usize = 8;

/// Largest trailer the kernel can append
pub const MAX_TRAILER_SIZE: usize = 68;

pub const MACH_RCV_TRAILER_NULL: u32 = 0;
pub const MACH_RCV_TRAILER_SEQNO: u32 = 1;
pub const MACH_RCV_TRAILER_SENDER: u32 = 2;
pub const MACH_RCV_TRAILER_AUDIT: u32 = 3;
pub const MACH_RCV_TRAILER_CTX: u32 = 4;

const SEQNO_TRAILER_SIZE: usize = 12;
const SECURITY_TRAILER_SIZE: usize = 20;
const AUDIT_TRAILER_SIZE: usize = 52;

/// Receive option bits selecting the trailer format
#[allow(non_snake_case)]
pub const fn MACH_RCV_TRAILER_TYPE(format: u32) -> u32 {
    (format & 0xf) << 28
}

/// Receive option bits selecting how many trailer elements to append
#[allow(non_snake_case)]
pub const fn MACH_RCV_TRAILER_ELEMENTS(elements: u32) -> u32 {
    (elements & 0xf) << 24
}

/// Trailer detail requested from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailerRequest {
    /// Minimum trailer, no elements
    #[default]
    Null,
    Seqno,
    Sender,
    /// Sequence number, sender token and audit token
    Audit,
}

impl TrailerRequest {
    /// Element count as encoded in the receive options
    pub fn elements(self) -> u32 {
        match self {
            Self::Null => MACH_RCV_TRAILER_NULL,
            Self::Seqno => MACH_RCV_TRAILER_SEQNO,
            Self::Sender => MACH_RCV_TRAILER_SENDER,
            Self::Audit => MACH_RCV_TRAILER_AUDIT,
        }
    }

    /// Receive option bits for this request
    pub fn option_bits(self) -> u32 {
        MACH_RCV_TRAILER_TYPE(MACH_MSG_TRAILER_FORMAT_0) | MACH_RCV_TRAILER_ELEMENTS(self.elements())
    }

    /// Size of the trailer the kernel will append
    pub fn trailer_size(self) -> usize {
        match self {
            Self::Null => MACH_MSG_TRAILER_MINIMUM_SIZE,
            Self::Seqno => SEQNO_TRAILER_SIZE,
            Self::Sender => SECURITY_TRAILER_SIZE,
            Self::Audit => AUDIT_TRAILER_SIZE,
        }
    }
}

// ============================================================================
// Trailer Elements
// ============================================================================

/// Sender security token (uid, gid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityToken {
    pub val: [u32; 2],
}

impl SecurityToken {
    pub fn uid(&self) -> u32 {
        self.val[0]
    }

    pub fn gid(&self) -> u32 {
        self.val[1]
    }
}

/// Sender audit token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditToken {
    pub val: [u32; 8],
}

impl AuditToken {
    pub fn auid(&self) -> u32 {
        self.val[0]
    }

    pub fn euid(&self) -> u32 {
        self.val[1]
    }

    pub fn egid(&self) -> u32 {
        self.val[2]
    }

    pub fn pid(&self) -> i32 {
        self.val[5] as i32
    }

    pub fn pid_version(&self) -> u32 {
        self.val[7]
    }
}

// ============================================================================
// Trailer
// ============================================================================

/// Raw trailer bytes, including the leading `{type, size}` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    bytes: Vec<u8, MAX_TRAILER_SIZE>,
}

impl Trailer {
    /// Parse a trailer whose size field covers exactly `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MACH_MSG_TRAILER_MINIMUM_SIZE {
            return Err(IpcError::BufferOverflow {
                offset: 0,
                needed: MACH_MSG_TRAILER_MINIMUM_SIZE,
                available: bytes.len(),
            });
        }
        let size = u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if !Self::valid_size(size) || size as usize != bytes.len() {
            return Err(IpcError::InvalidTrailer { size });
        }
        let bytes = Vec::from_slice(bytes).map_err(|_| IpcError::InvalidTrailer { size })?;
        Ok(Self { bytes })
    }

    /// Build a format-0 trailer carrying the given elements
    pub fn new(
        seqno: Option<u32>,
        sender: Option<SecurityToken>,
        audit: Option<AuditToken>,
    ) -> Self {
        let mut words: Vec<u32, { MAX_TRAILER_SIZE / 4 }> = Vec::new();
        let _ = words.push(MACH_MSG_TRAILER_FORMAT_0);
        let _ = words.push(0);
        // Later elements imply the earlier ones, zero-filled if absent.
        if seqno.is_some() || sender.is_some() || audit.is_some() {
            let _ = words.push(seqno.unwrap_or(0));
        }
        if sender.is_some() || audit.is_some() {
            let _ = words.extend_from_slice(&sender.unwrap_or_default().val);
        }
        if let Some(audit) = audit {
            let _ = words.extend_from_slice(&audit.val);
        }
        words[1] = (words.len() * 4) as u32;

        let mut bytes = Vec::new();
        for word in &words {
            let _ = bytes.extend_from_slice(&word.to_ne_bytes());
        }
        Self { bytes }
    }

    /// Read a trailer at the cursor
    ///
    /// Returns `None` when fewer than the minimum trailer bytes remain or the
    /// size field is zero.
    pub fn read(r: &mut ReadCursor<'_>) -> Result<Option<Self>> {
        if r.remaining() < MACH_MSG_TRAILER_MINIMUM_SIZE {
            return Ok(None);
        }
        let size_field = r.peek_at(4, 4)?;
        let size = u32::from_ne_bytes([size_field[0], size_field[1], size_field[2], size_field[3]]);
        if size == 0 {
            return Ok(None);
        }
        if !Self::valid_size(size) {
            return Err(IpcError::InvalidTrailer { size });
        }
        let bytes = r.take(size as usize)?;
        Self::from_bytes(bytes).map(Some)
    }

    fn valid_size(size: u32) -> bool {
        (MACH_MSG_TRAILER_MINIMUM_SIZE..=MAX_TRAILER_SIZE).contains(&(size as usize))
    }

    fn word(&self, index: usize) -> Option<u32> {
        let bytes = self.bytes.get(index * 4..index * 4 + 4)?;
        Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn trailer_type(&self) -> u32 {
        self.word(0).unwrap_or(0)
    }

    /// Self-reported size in bytes
    pub fn size(&self) -> u32 {
        self.word(1).unwrap_or(0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Message sequence number
    pub fn seqno(&self) -> Option<u32> {
        self.word(2)
    }

    pub fn sender(&self) -> Option<SecurityToken> {
        if self.bytes.len() < SECURITY_TRAILER_SIZE {
            return None;
        }
        Some(SecurityToken {
            val: [self.word(3)?, self.word(4)?],
        })
    }

    pub fn audit_token(&self) -> Option<AuditToken> {
        if self.bytes.len() < AUDIT_TRAILER_SIZE {
            return None;
        }
        let mut val = [0u32; 8];
        for (i, slot) in val.iter_mut().enumerate() {
            *slot = self.word(5 + i)?;
        }
        Some(AuditToken { val })
    }
}
