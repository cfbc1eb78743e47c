//! Complex message body: descriptor count plus packed descriptor records
//!
//! Encoding is closed: the count and every record are written back to back
//! with no padding, so the encoded length is always
//! `MACH_MSG_BODY_SIZE + Σ record sizes`. Decoding walks the buffer one tag
//! at a time and stops at the first record it cannot classify, since the
//! size of an unknown record (and therefore the position of the next one)
//! cannot be known.

use alloc::boxed::Box;
use alloc::vec::Vec;
use thiserror::Error;

use super::cursor::{ReadCursor, WriteCursor};
use super::descriptor::{Descriptor, MACH_MSG_DESCRIPTOR_MIN_SIZE};
use super::message::MachMsgHeader;
use super::{IpcError, Result};

/// Size of the descriptor count that opens a complex body
pub const MACH_MSG_BODY_SIZE: usize = 4;

/// Ordered descriptors of a complex message
///
/// Position is the only addressing scheme: rights are retrieved by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    descriptors: Vec<Descriptor>,
}

/// Body decode that stopped early
///
/// `decoded` holds every record read before the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("body decode stopped after {} of {expected} descriptors: {source}", .decoded.len())]
pub struct BodyError {
    pub decoded: Body,
    pub expected: usize,
    pub source: IpcError,
}

impl BodyError {
    /// Attach the header of the message whose body this was
    pub fn into_message_error(self, header: MachMsgHeader) -> IpcError {
        IpcError::IncompleteBody {
            header,
            body: Box::new(self),
        }
    }
}

impl Body {
    /// Empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor
    pub fn push(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    /// Builder form of [`Body::push`]
    pub fn with(mut self, descriptor: Descriptor) -> Self {
        self.push(descriptor);
        self
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptor at `index`
    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Descriptor> {
        self.descriptors.iter()
    }

    pub fn into_descriptors(self) -> Vec<Descriptor> {
        self.descriptors
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        MACH_MSG_BODY_SIZE + self.descriptors.iter().map(Descriptor::size).sum::<usize>()
    }

    /// Encode into a freshly allocated buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = alloc::vec![0u8; self.encoded_len()];
        let mut cursor = WriteCursor::new(&mut bytes);
        let written = self.encode_into(&mut cursor);
        debug_assert!(written.is_ok(), "body buffer sized by encoded_len");
        bytes
    }

    /// Encode at the cursor
    ///
    /// Fails without writing anything if the whole body does not fit.
    pub fn encode_into(&self, w: &mut WriteCursor<'_>) -> Result<()> {
        let needed = self.encoded_len();
        if needed > w.remaining() {
            return Err(IpcError::BufferOverflow {
                offset: w.position(),
                needed,
                available: w.remaining(),
            });
        }
        w.put_u32(self.descriptors.len() as u32)?;
        for descriptor in &self.descriptors {
            descriptor.encode(w)?;
        }
        Ok(())
    }

    /// Read the count and then that many records
    pub fn decode(r: &mut ReadCursor<'_>) -> core::result::Result<Self, BodyError> {
        let count = r.read_u32().map_err(|source| BodyError {
            decoded: Body::new(),
            expected: 0,
            source,
        })?;
        Self::decode_records(r, count as usize)
    }

    /// Read `count` records, stopping at the first one that fails
    ///
    /// On failure the cursor is left at the start of the offending record.
    pub fn decode_records(
        r: &mut ReadCursor<'_>,
        count: usize,
    ) -> core::result::Result<Self, BodyError> {
        // The count comes off the wire; don't let it size the allocation.
        let capacity = count.min(r.remaining() / MACH_MSG_DESCRIPTOR_MIN_SIZE);
        let mut descriptors = Vec::with_capacity(capacity);

        for _ in 0..count {
            match Descriptor::read(r) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(source) => {
                    log::warn!(
                        "descriptor {} of {} unreadable at offset {}: {}",
                        descriptors.len(),
                        count,
                        r.position(),
                        source
                    );
                    return Err(BodyError {
                        decoded: Body { descriptors },
                        expected: count,
                        source,
                    });
                }
            }
        }
        Ok(Body { descriptors })
    }
}

impl From<Vec<Descriptor>> for Body {
    fn from(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }
}

impl FromIterator<Descriptor> for Body {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Body {
    type Item = &'a Descriptor;
    type IntoIter = core::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::descriptor::{MsgTypeName, OolCopyOption};
    use crate::ipc::PortName;
    use alloc::vec;

    fn port_then_ool() -> Body {
        Body::new()
            .with(Descriptor::port(PortName(0x103), MsgTypeName::MoveSend))
            .with(Descriptor::out_of_line(0x7000_0000, 16, OolCopyOption::Virtual))
    }

    #[test]
    fn test_empty_body() {
        let body = Body::new();
        assert_eq!(body.encoded_len(), 4);
        assert_eq!(body.encode(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_port_and_ool() {
        let body = port_then_ool();
        let bytes = body.encode();
        assert_eq!(bytes.len(), 4 + 12 + 16);
        assert_eq!(&bytes[0..4], &2u32.to_ne_bytes());

        let mut cursor = ReadCursor::new(&bytes);
        let decoded = Body::decode(&mut cursor).unwrap();
        assert_eq!(decoded, body);
        assert_eq!(cursor.position(), bytes.len());
        assert!(matches!(decoded.get(0), Some(Descriptor::Port(_))));
        assert!(matches!(decoded.get(1), Some(Descriptor::OutOfLine(_))));
    }

    #[test]
    fn test_unknown_tag_keeps_prefix() {
        let body = port_then_ool().with(Descriptor::port(PortName(9), MsgTypeName::CopySend));
        let mut bytes = body.encode();
        // Corrupt the tag of the second record (offset 4 + 12, type byte at +11).
        let tag_index = 4 + 12 + 8 + if cfg!(target_endian = "little") { 3 } else { 0 };
        bytes[tag_index] = 0x7f;

        let mut cursor = ReadCursor::new(&bytes);
        let err = Body::decode(&mut cursor).unwrap_err();
        assert_eq!(err.expected, 3);
        assert_eq!(err.decoded.len(), 1);
        assert_eq!(err.decoded.get(0), body.get(0));
        assert_eq!(
            err.source,
            IpcError::InvalidDescriptorTag {
                tag: 0x7f,
                offset: 16
            }
        );
        assert_eq!(cursor.position(), 16);
    }

    #[test]
    fn test_count_past_buffer() {
        let body = port_then_ool();
        let mut bytes = body.encode();
        bytes[0..4].copy_from_slice(&5u32.to_ne_bytes());

        let mut cursor = ReadCursor::new(&bytes);
        let err = Body::decode(&mut cursor).unwrap_err();
        assert_eq!(err.decoded, body);
        assert!(matches!(err.source, IpcError::BufferOverflow { .. }));
    }

    #[test]
    fn test_encode_into_truncated() {
        let body = port_then_ool();
        let mut out = [0u8; 20];
        let mut cursor = WriteCursor::new(&mut out);
        assert_eq!(
            body.encode_into(&mut cursor),
            Err(IpcError::BufferOverflow {
                offset: 0,
                needed: 32,
                available: 20
            })
        );
        assert_eq!(out, [0u8; 20]);
    }
}
