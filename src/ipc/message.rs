//! Mach message envelope
//!
//! A message on the wire is
//!
//! ```text
//! header (24) | [count (4) | descriptors...] | payload | pad to 4 | [trailer]
//! ```
//!
//! The body is present exactly when the header's complex bit is set. The
//! payload is whatever the advertised size leaves after header and body.
//! The trailer is appended by the receiving kernel and is found by its own
//! size field.

use alloc::borrow::Cow;
use alloc::vec::Vec;
use bytemuck::{Pod, Zeroable};

use super::body::Body;
use super::cursor::{align_up, MessageBuffer, ReadCursor, WriteCursor};
use super::descriptor::MsgTypeName;
use super::trailer::Trailer;
use super::{IpcError, PortName, Result};

// ============================================================================
// Message Bits
// ============================================================================

/// Header bits: three port dispositions plus flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct MachMsgBits(pub u32);

impl MachMsgBits {
    /// Remote port type mask
    pub const REMOTE_MASK: u32 = 0x0000_001f;
    /// Local port type mask
    pub const LOCAL_MASK: u32 = 0x0000_1f00;
    /// Voucher port type mask
    pub const VOUCHER_MASK: u32 = 0x001f_0000;
    /// All three disposition fields
    pub const PORTS_MASK: u32 = Self::REMOTE_MASK | Self::LOCAL_MASK | Self::VOUCHER_MASK;

    /// Complex message (has descriptors)
    pub const COMPLEX: u32 = 0x8000_0000;

    /// Create new message bits
    pub fn new(remote: Option<MsgTypeName>, local: Option<MsgTypeName>) -> Self {
        let mut bits = Self(0);
        bits.set_remote(remote);
        bits.set_local(local);
        bits
    }

    fn field(self, mask: u32, shift: u32) -> Option<MsgTypeName> {
        MsgTypeName::from_raw(((self.0 & mask) >> shift) as u8)
    }

    fn set_field(&mut self, mask: u32, shift: u32, value: Option<MsgTypeName>) {
        let raw = value.map_or(0, |t| u32::from(t.as_raw()));
        self.0 = (self.0 & !mask) | ((raw << shift) & mask);
    }

    /// Get remote port type
    pub fn remote_type(self) -> Option<MsgTypeName> {
        self.field(Self::REMOTE_MASK, 0)
    }

    /// Get local port type
    pub fn local_type(self) -> Option<MsgTypeName> {
        self.field(Self::LOCAL_MASK, 8)
    }

    /// Get voucher port type
    pub fn voucher_type(self) -> Option<MsgTypeName> {
        self.field(Self::VOUCHER_MASK, 16)
    }

    pub fn set_remote(&mut self, disposition: Option<MsgTypeName>) {
        self.set_field(Self::REMOTE_MASK, 0, disposition);
    }

    pub fn set_local(&mut self, disposition: Option<MsgTypeName>) {
        self.set_field(Self::LOCAL_MASK, 8, disposition);
    }

    pub fn set_voucher(&mut self, disposition: Option<MsgTypeName>) {
        self.set_field(Self::VOUCHER_MASK, 16, disposition);
    }

    /// Check if message is complex
    pub fn is_complex(self) -> bool {
        (self.0 & Self::COMPLEX) != 0
    }

    pub fn set_complex(&mut self, complex: bool) {
        if complex {
            self.0 |= Self::COMPLEX;
        } else {
            self.0 &= !Self::COMPLEX;
        }
    }

    /// Bits outside the disposition fields and the complex flag
    pub fn other_bits(self) -> u32 {
        self.0 & !(Self::PORTS_MASK | Self::COMPLEX)
    }
}

// ============================================================================
// Message Header
// ============================================================================

/// Mach message header
///
/// This is the fixed header that begins every Mach message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct MachMsgHeader {
    /// Message bits (port types, complexity)
    pub msgh_bits: MachMsgBits,
    /// Total message size in bytes, excluding the trailer
    pub msgh_size: u32,
    /// Destination port name
    pub msgh_remote_port: PortName,
    /// Reply port name
    pub msgh_local_port: PortName,
    /// Voucher port name
    pub msgh_voucher_port: PortName,
    /// Message ID (application-defined)
    pub msgh_id: i32,
}

/// Size of [`MachMsgHeader`] on the wire
pub const MACH_MSG_HEADER_SIZE: usize = core::mem::size_of::<MachMsgHeader>();

/// Natural alignment of a message; trailers start on this boundary
pub const MACH_MSG_ALIGNMENT: usize = core::mem::align_of::<MachMsgHeader>();

const _: () = assert!(MACH_MSG_HEADER_SIZE == 24);

impl MachMsgHeader {
    /// Header with no ports and a size to be filled in at serialization
    pub fn new(id: i32) -> Self {
        Self {
            msgh_id: id,
            ..Self::zeroed()
        }
    }

    /// Set the remote (destination) port
    pub fn with_remote_port(mut self, port: PortName, disposition: MsgTypeName) -> Self {
        self.msgh_remote_port = port;
        self.msgh_bits.set_remote(Some(disposition));
        self
    }

    /// Set the local (reply) port
    pub fn with_local_port(mut self, port: PortName, disposition: MsgTypeName) -> Self {
        self.msgh_local_port = port;
        self.msgh_bits.set_local(Some(disposition));
        self
    }

    /// Set the voucher port
    pub fn with_voucher_port(mut self, port: PortName, disposition: MsgTypeName) -> Self {
        self.msgh_voucher_port = port;
        self.msgh_bits.set_voucher(Some(disposition));
        self
    }

    /// Read a header at the cursor
    pub fn read(r: &mut ReadCursor<'_>) -> Result<Self> {
        let bytes = r.take(MACH_MSG_HEADER_SIZE)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Write the header at the cursor
    pub fn write(&self, w: &mut WriteCursor<'_>) -> Result<()> {
        w.put(bytemuck::bytes_of(self))
    }
}

// ============================================================================
// Message
// ============================================================================

/// A Mach message: header, optional body, optional payload, optional trailer
///
/// Messages parsed with [`Message::deserialize`] borrow their payload from
/// the parsed buffer; [`Message::into_owned`] detaches them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message<'a> {
    header: MachMsgHeader,
    body: Option<Body>,
    payload: Option<Cow<'a, [u8]>>,
    trailer: Option<Trailer>,
}

impl<'a> Message<'a> {
    /// Simple message with the given header
    pub fn new(mut header: MachMsgHeader) -> Self {
        header.msgh_bits.set_complex(false);
        Self {
            header,
            ..Self::default()
        }
    }

    /// Attach a body, making the message complex
    pub fn with_body(mut self, body: Body) -> Self {
        self.set_body(Some(body));
        self
    }

    /// Attach an inline payload
    pub fn with_payload(mut self, payload: impl Into<Cow<'a, [u8]>>) -> Self {
        self.set_payload(Some(payload.into()));
        self
    }

    /// Attach a trailer
    pub fn with_trailer(mut self, trailer: Trailer) -> Self {
        self.trailer = Some(trailer);
        self
    }

    /// Replace the body and keep the complex bit in step
    pub fn set_body(&mut self, body: Option<Body>) {
        self.header.msgh_bits.set_complex(body.is_some());
        self.body = body;
    }

    /// Replace the payload; an empty payload is stored as none
    pub fn set_payload(&mut self, payload: Option<Cow<'a, [u8]>>) {
        self.payload = payload.filter(|p| !p.is_empty());
    }

    pub fn header(&self) -> &MachMsgHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut MachMsgHeader {
        &mut self.header
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn trailer(&self) -> Option<&Trailer> {
        self.trailer.as_ref()
    }

    pub fn id(&self) -> i32 {
        self.header.msgh_id
    }

    /// Body size in bytes, zero without a body
    pub fn body_size(&self) -> usize {
        self.body.as_ref().map_or(0, Body::encoded_len)
    }

    /// Payload size in bytes, zero without a payload
    pub fn payload_size(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    /// Header + body + payload
    pub fn total_size(&self) -> usize {
        MACH_MSG_HEADER_SIZE + self.body_size() + self.payload_size()
    }

    /// How far the advertised size falls short of header + body
    ///
    /// A parsed message whose advertised size could not even cover its
    /// header and body has no payload; this tells it apart from a message
    /// whose payload was genuinely empty.
    pub fn payload_shortfall(&self) -> Option<usize> {
        let advertised = self.header.msgh_size as usize;
        let required = MACH_MSG_HEADER_SIZE + self.body_size();
        (advertised != 0 && advertised < required).then(|| required - advertised)
    }

    /// The header as it goes on the wire
    ///
    /// The size is filled in when left at zero, otherwise the caller's size
    /// is kept as long as it covers the contents. The complex bit follows
    /// the presence of a body.
    pub fn wire_header(&self) -> Result<MachMsgHeader> {
        let mut header = self.header;
        let total = self.total_size();
        match header.msgh_size as usize {
            0 => header.msgh_size = wire_size(total)?,
            presized if presized < total => {
                return Err(IpcError::BufferOverflow {
                    offset: MACH_MSG_HEADER_SIZE,
                    needed: total,
                    available: presized,
                });
            }
            _ => {}
        }
        header.msgh_bits.set_complex(self.body.is_some());
        Ok(header)
    }

    /// Bytes needed by [`Message::serialize_into`]
    pub fn serialized_len(&self) -> Result<usize> {
        let size = self.wire_header()?.msgh_size as usize;
        let trailer = self.trailer.as_ref().map_or(0, |t| t.as_bytes().len());
        Ok(align_up(size, MACH_MSG_ALIGNMENT) + trailer)
    }

    /// Serialize into a newly allocated buffer
    pub fn serialize(&self) -> Result<MessageBuffer> {
        let mut buffer = MessageBuffer::zeroed(self.serialized_len()?);
        self.serialize_into(buffer.as_bytes_mut())?;
        Ok(buffer)
    }

    /// Serialize into `out`, returning the number of bytes written
    pub fn serialize_into(&self, out: &mut [u8]) -> Result<usize> {
        let header = self.wire_header()?;
        let needed = self.serialized_len()?;
        if out.len() < needed {
            return Err(IpcError::BufferOverflow {
                offset: 0,
                needed,
                available: out.len(),
            });
        }
        out[..needed].fill(0);

        let mut w = WriteCursor::new(out);
        header.write(&mut w)?;
        if let Some(body) = &self.body {
            body.encode_into(&mut w)?;
        }
        if let Some(payload) = &self.payload {
            w.put(payload)?;
        }
        // Pre-sized messages carry zero padding up to their advertised size.
        w.skip(header.msgh_size as usize - w.position())?;
        w.align_to(MACH_MSG_ALIGNMENT)?;
        if let Some(trailer) = &self.trailer {
            w.put(trailer.as_bytes())?;
        }
        Ok(w.position())
    }

    /// Parse a message, borrowing its payload from `bytes`
    pub fn deserialize(bytes: &'a [u8]) -> Result<Self> {
        let mut r = ReadCursor::new(bytes);
        let header = MachMsgHeader::read(&mut r)?;

        let body = if header.msgh_bits.is_complex() {
            let body = Body::decode(&mut r).map_err(|err| err.into_message_error(header))?;
            Some(body)
        } else {
            None
        };

        let consumed = r.position();
        let advertised = header.msgh_size as usize;
        let payload = if advertised > consumed {
            Some(Cow::Borrowed(r.take(advertised - consumed)?))
        } else {
            if advertised < consumed {
                log::debug!(
                    "message {} advertises {} bytes but header and body take {}",
                    header.msgh_id,
                    advertised,
                    consumed
                );
            }
            None
        };

        r.align_to(MACH_MSG_ALIGNMENT);
        let trailer = match Trailer::read(&mut r) {
            Err(IpcError::InvalidTrailer { size }) => {
                log::debug!(
                    "message {} dropped a trailer reporting {} bytes",
                    header.msgh_id,
                    size
                );
                None
            }
            other => other?,
        };

        Ok(Self {
            header,
            body,
            payload,
            trailer,
        })
    }

    /// Detach from the buffer the message was parsed from
    pub fn into_owned(self) -> Message<'static> {
        Message {
            header: self.header,
            body: self.body,
            payload: self.payload.map(|p| Cow::Owned(p.into_owned())),
            trailer: self.trailer,
        }
    }

    /// Read the front of the payload as a plain-old-data value
    pub fn payload_as<T: Pod>(&self) -> Result<T> {
        let bytes = self.payload().unwrap_or(&[]);
        let size = core::mem::size_of::<T>();
        if bytes.len() < size {
            return Err(IpcError::SizeMismatch {
                expected: size,
                actual: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }
}

/// Message size as carried in the header's 32-bit size field
fn wire_size(total: usize) -> Result<u32> {
    u32::try_from(total).map_err(|_| IpcError::BufferOverflow {
        offset: 0,
        needed: total,
        available: u32::MAX as usize,
    })
}

// ============================================================================
// Typed Messages
// ============================================================================

/// Conversion from a received message into a caller-chosen type
pub trait FromMessage: Sized {
    fn from_message(message: Message<'_>) -> Result<Self>;
}

impl FromMessage for Message<'static> {
    fn from_message(message: Message<'_>) -> Result<Self> {
        Ok(message.into_owned())
    }
}

/// Simple message whose payload is a single plain-old-data value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodMessage<T: Pod> {
    pub header: MachMsgHeader,
    pub value: T,
}

impl<T: Pod> PodMessage<T> {
    pub fn new(header: MachMsgHeader, value: T) -> Self {
        Self { header, value }
    }

    /// Untyped form, ready to serialize
    pub fn to_message(&self) -> Message<'static> {
        let payload: Vec<u8> = bytemuck::bytes_of(&self.value).to_vec();
        Message::new(self.header).with_payload(payload)
    }
}

impl<T: Pod> FromMessage for PodMessage<T> {
    fn from_message(message: Message<'_>) -> Result<Self> {
        Ok(Self {
            header: message.header,
            value: message.payload_as()?,
        })
    }
}
