//! Complex message descriptors
//!
//! A complex message body is a count followed by fixed-size descriptor
//! records. Every record variant shares a 32-bit "type word" at offset 8
//! whose top byte is the descriptor type, so a reader can classify a record
//! before knowing its size:
//!
//! ```text
//! Port (12 bytes)            name:32  pad:32  [pad:16 disp:8 type:8]
//! OOL / volatile (16 bytes)  address:64       [dealloc:8 copy:8 pad:8 type:8]  size:32
//! OOL ports (16 bytes)       address:64       [dealloc:8 copy:8 disp:8 type:8] count:32
//! Guarded port (16 bytes)    context:64       [flags:16 disp:8 type:8]         name:32
//! ```

use alloc::vec;
use alloc::vec::Vec;

use super::cursor::{ReadCursor, WriteCursor};
use super::{IpcError, PortName, Result};

/// Offset of the shared type word inside every record
const TYPE_WORD_OFFSET: usize = 8;

/// Smallest record; enough to read the type word of any variant
pub const MACH_MSG_DESCRIPTOR_MIN_SIZE: usize = 12;

// ============================================================================
// Port Dispositions
// ============================================================================

/// Port right transfer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgTypeName {
    /// Move receive right
    MoveReceive = 16,
    /// Move send right
    MoveSend = 17,
    /// Move send-once right
    MoveSendOnce = 18,
    /// Copy send right
    CopySend = 19,
    /// Make send right from receive right
    MakeSend = 20,
    /// Make send-once right from receive right
    MakeSendOnce = 21,
    /// Copy receive right
    CopyReceive = 22,
}

impl MsgTypeName {
    /// Convert from raw value
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            16 => Some(Self::MoveReceive),
            17 => Some(Self::MoveSend),
            18 => Some(Self::MoveSendOnce),
            19 => Some(Self::CopySend),
            20 => Some(Self::MakeSend),
            21 => Some(Self::MakeSendOnce),
            22 => Some(Self::CopyReceive),
            _ => None,
        }
    }

    /// Raw wire value
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Check if this transfers a right
    pub fn is_move(self) -> bool {
        matches!(
            self,
            Self::MoveReceive | Self::MoveSend | Self::MoveSendOnce
        )
    }

    /// Check if this copies a right
    pub fn is_copy(self) -> bool {
        matches!(self, Self::CopySend | Self::CopyReceive)
    }

    /// Check if this creates a right
    pub fn is_make(self) -> bool {
        matches!(self, Self::MakeSend | Self::MakeSendOnce)
    }
}

// ============================================================================
// Out-of-line options
// ============================================================================

/// OOL copy options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OolCopyOption {
    /// Physical copy
    Physical = 0,
    /// Virtual copy (COW)
    #[default]
    Virtual = 1,
    /// Kernel allocates the destination
    Allocate = 2,
    /// Overwrite destination
    Overwrite = 3,
}

impl OolCopyOption {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Physical),
            1 => Some(Self::Virtual),
            2 => Some(Self::Allocate),
            3 => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// Guard flags on a guarded port descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct GuardFlags(pub u16);

impl GuardFlags {
    pub const NONE: Self = Self(0);
    /// The receive right cannot be moved once delivered
    pub const IMMOVABLE_RECEIVE: Self = Self(0x0001);
    /// Drop the guard when the right is sent
    pub const UNGUARDED_ON_SEND: Self = Self(0x0002);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for GuardFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// Descriptor Types
// ============================================================================

/// Descriptor type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DescriptorType {
    Port = 0,
    OutOfLine = 1,
    OutOfLinePorts = 2,
    OutOfLineVolatile = 3,
    GuardedPort = 4,
}

impl DescriptorType {
    /// Convert from the raw tag, `None` for anything unrecognized
    pub fn from_raw(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Port),
            1 => Some(Self::OutOfLine),
            2 => Some(Self::OutOfLinePorts),
            3 => Some(Self::OutOfLineVolatile),
            4 => Some(Self::GuardedPort),
            _ => None,
        }
    }

    /// Fixed record size for this type
    pub const fn size(self) -> usize {
        match self {
            Self::Port => 12,
            Self::OutOfLine | Self::OutOfLineVolatile => 16,
            Self::OutOfLinePorts => 16,
            Self::GuardedPort => 16,
        }
    }
}

/// Record size for a descriptor tag
pub fn size_of(tag: DescriptorType) -> usize {
    tag.size()
}

/// Port right descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: PortName,
    pub disposition: MsgTypeName,
}

/// Out-of-line memory descriptor
///
/// `address` is only carried through; the memory it names is never read,
/// written or freed here. `deallocate` asks the kernel to unmap it on send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OolDescriptor {
    pub address: u64,
    pub size: u32,
    pub copy: OolCopyOption,
    pub deallocate: bool,
    /// Encodes as the volatile descriptor type
    pub volatile: bool,
}

/// Out-of-line array of port names sharing one disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OolPortsDescriptor {
    pub address: u64,
    pub count: u32,
    pub disposition: MsgTypeName,
    pub copy: OolCopyOption,
    pub deallocate: bool,
}

/// Port right guarded by a context value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedPortDescriptor {
    pub name: PortName,
    pub disposition: MsgTypeName,
    pub context: u64,
    pub flags: GuardFlags,
}

/// One record of a complex message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Port(PortDescriptor),
    OutOfLine(OolDescriptor),
    OutOfLinePorts(OolPortsDescriptor),
    GuardedPort(GuardedPortDescriptor),
}

impl Descriptor {
    /// Port descriptor
    pub fn port(name: PortName, disposition: MsgTypeName) -> Self {
        Self::Port(PortDescriptor { name, disposition })
    }

    /// Non-volatile OOL descriptor that leaves the source mapped
    pub fn out_of_line(address: u64, size: u32, copy: OolCopyOption) -> Self {
        Self::OutOfLine(OolDescriptor {
            address,
            size,
            copy,
            deallocate: false,
            volatile: false,
        })
    }

    /// OOL port array descriptor
    pub fn out_of_line_ports(address: u64, count: u32, disposition: MsgTypeName) -> Self {
        Self::OutOfLinePorts(OolPortsDescriptor {
            address,
            count,
            disposition,
            copy: OolCopyOption::Physical,
            deallocate: false,
        })
    }

    /// Guarded port descriptor
    pub fn guarded_port(
        name: PortName,
        disposition: MsgTypeName,
        context: u64,
        flags: GuardFlags,
    ) -> Self {
        Self::GuardedPort(GuardedPortDescriptor {
            name,
            disposition,
            context,
            flags,
        })
    }

    /// Wire type tag
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::Port(_) => DescriptorType::Port,
            Self::OutOfLine(ool) if ool.volatile => DescriptorType::OutOfLineVolatile,
            Self::OutOfLine(_) => DescriptorType::OutOfLine,
            Self::OutOfLinePorts(_) => DescriptorType::OutOfLinePorts,
            Self::GuardedPort(_) => DescriptorType::GuardedPort,
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.descriptor_type().size()
    }

    /// Encode into a standalone record
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size()];
        let mut cursor = WriteCursor::new(&mut bytes);
        let written = self.encode(&mut cursor);
        debug_assert!(written.is_ok(), "record buffer sized by Descriptor::size");
        bytes
    }

    /// Write this record at the cursor
    pub fn encode(&self, w: &mut WriteCursor<'_>) -> Result<()> {
        let tag = self.descriptor_type() as u8;
        if w.remaining() < self.size() {
            return Err(IpcError::BufferOverflow {
                offset: w.position(),
                needed: self.size(),
                available: w.remaining(),
            });
        }
        match self {
            Self::Port(port) => {
                w.put_u32(port.name.as_raw())?;
                w.put_u32(0)?;
                w.put_u32(type_word(0, port.disposition.as_raw(), tag))?;
            }
            Self::OutOfLine(ool) => {
                w.put_u64(ool.address)?;
                let low = u16::from(ool.deallocate) | (u16::from(ool.copy as u8) << 8);
                w.put_u32(type_word(low, 0, tag))?;
                w.put_u32(ool.size)?;
            }
            Self::OutOfLinePorts(ports) => {
                w.put_u64(ports.address)?;
                let low = u16::from(ports.deallocate) | (u16::from(ports.copy as u8) << 8);
                w.put_u32(type_word(low, ports.disposition.as_raw(), tag))?;
                w.put_u32(ports.count)?;
            }
            Self::GuardedPort(guarded) => {
                w.put_u64(guarded.context)?;
                w.put_u32(type_word(guarded.flags.0, guarded.disposition.as_raw(), tag))?;
                w.put_u32(guarded.name.as_raw())?;
            }
        }
        Ok(())
    }

    /// Decode one record of type `tag` from the front of `bytes`
    ///
    /// The tag in the record's own type word must agree with `tag`.
    pub fn decode(tag: u8, bytes: &[u8]) -> Result<Self> {
        let dtype =
            DescriptorType::from_raw(tag).ok_or(IpcError::InvalidDescriptorTag { tag, offset: 0 })?;
        let mut r = ReadCursor::new(bytes);
        r.ensure(dtype.size())?;
        let embedded = tag_of(r.peek_at(TYPE_WORD_OFFSET, 4)?);
        if embedded != tag {
            return Err(IpcError::InvalidDescriptorTag {
                tag: embedded,
                offset: 0,
            });
        }

        let descriptor = match dtype {
            DescriptorType::Port => {
                let name = PortName(r.read_u32()?);
                r.skip(4)?;
                let (_, disposition, _) = split_type_word(r.read_u32()?);
                Self::Port(PortDescriptor {
                    name,
                    disposition: disposition_from_raw(disposition)?,
                })
            }
            DescriptorType::OutOfLine | DescriptorType::OutOfLineVolatile => {
                let address = r.read_u64()?;
                let (low, _, _) = split_type_word(r.read_u32()?);
                let size = r.read_u32()?;
                Self::OutOfLine(OolDescriptor {
                    address,
                    size,
                    copy: copy_from_raw((low >> 8) as u8)?,
                    deallocate: low & 0xff != 0,
                    volatile: dtype == DescriptorType::OutOfLineVolatile,
                })
            }
            DescriptorType::OutOfLinePorts => {
                let address = r.read_u64()?;
                let (low, disposition, _) = split_type_word(r.read_u32()?);
                let count = r.read_u32()?;
                Self::OutOfLinePorts(OolPortsDescriptor {
                    address,
                    count,
                    disposition: disposition_from_raw(disposition)?,
                    copy: copy_from_raw((low >> 8) as u8)?,
                    deallocate: low & 0xff != 0,
                })
            }
            DescriptorType::GuardedPort => {
                let context = r.read_u64()?;
                let (flags, disposition, _) = split_type_word(r.read_u32()?);
                let name = PortName(r.read_u32()?);
                Self::GuardedPort(GuardedPortDescriptor {
                    name,
                    disposition: disposition_from_raw(disposition)?,
                    context,
                    flags: GuardFlags(flags),
                })
            }
        };
        Ok(descriptor)
    }

    /// Read the record at the cursor, advancing only on success
    pub fn read(r: &mut ReadCursor<'_>) -> Result<Self> {
        let offset = r.position();
        let word = r.peek_at(TYPE_WORD_OFFSET, 4)?;
        let tag = tag_of(word);
        let dtype =
            DescriptorType::from_raw(tag).ok_or(IpcError::InvalidDescriptorTag { tag, offset })?;
        let record = r.peek_at(0, dtype.size())?;
        let descriptor = Self::decode(tag, record)?;
        r.skip(dtype.size())?;
        Ok(descriptor)
    }
}

/// Pack the shared type word
fn type_word(low: u16, middle: u8, tag: u8) -> u32 {
    u32::from(low) | (u32::from(middle) << 16) | (u32::from(tag) << 24)
}

/// Split the shared type word into (low 16 bits, middle byte, tag)
fn split_type_word(word: u32) -> (u16, u8, u8) {
    (word as u16, (word >> 16) as u8, (word >> 24) as u8)
}

fn tag_of(word: &[u8]) -> u8 {
    split_type_word(u32::from_ne_bytes([word[0], word[1], word[2], word[3]])).2
}

fn disposition_from_raw(value: u8) -> Result<MsgTypeName> {
    MsgTypeName::from_raw(value).ok_or(IpcError::InvalidDisposition(value))
}

fn copy_from_raw(value: u8) -> Result<OolCopyOption> {
    OolCopyOption::from_raw(value).ok_or(IpcError::InvalidCopyOption(value))
}
