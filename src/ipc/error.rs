//! Error types for Mach IPC operations

use alloc::boxed::Box;
use thiserror::Error;

use super::body::{Body, BodyError};
use super::mach_msg::{KernReturn, MachMsgReturn};
use super::message::MachMsgHeader;

/// Result type for IPC operations
pub type Result<T> = core::result::Result<T, IpcError>;

/// Errors that can occur while encoding, decoding or transporting messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    /// A descriptor record carried a type tag outside the five known values
    #[error("invalid descriptor tag {tag} at offset {offset}")]
    InvalidDescriptorTag { tag: u8, offset: usize },

    /// A complex message whose body stopped decoding part way
    ///
    /// The header and every descriptor read before the failure are kept,
    /// so rights already moved in the prefix can still be claimed.
    #[error("message {} has an incomplete body: {body}", .header.msgh_id)]
    IncompleteBody {
        header: MachMsgHeader,
        body: Box<BodyError>,
    },

    /// A port descriptor carried a disposition that is not a port right
    #[error("invalid port disposition {0}")]
    InvalidDisposition(u8),

    /// An out-of-line descriptor carried an unknown copy option
    #[error("invalid copy option {0}")]
    InvalidCopyOption(u8),

    /// A read or write would run past the end of the buffer
    #[error("buffer overflow at offset {offset}: needed {needed} bytes, {available} available")]
    BufferOverflow {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The payload is shorter than the requested view
    #[error("payload size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A trailer reported a size the format does not allow
    #[error("invalid trailer size {size}")]
    InvalidTrailer { size: u32 },

    /// The primitive returned a timeout-class code
    #[error("transport timed out: {0}")]
    TransportTimeout(MachMsgReturn),

    /// The primitive returned any other failure code
    #[error("transport failure: {0}")]
    TransportFailure(MachMsgReturn),

    /// A kernel routine other than mach_msg failed
    #[error("kernel error: {0}")]
    Kernel(KernReturn),
}

impl IpcError {
    /// Whether the failure is a timeout a caller may retry
    pub fn is_timeout(&self) -> bool {
        matches!(self, IpcError::TransportTimeout(_))
    }

    /// Descriptors decoded before a body failure
    pub fn partial_body(&self) -> Option<&Body> {
        match self {
            IpcError::IncompleteBody { body, .. } => Some(&body.decoded),
            _ => None,
        }
    }

    /// The underlying failure, looking through an incomplete body
    pub fn root_cause(&self) -> &IpcError {
        match self {
            IpcError::IncompleteBody { body, .. } => body.source.root_cause(),
            other => other,
        }
    }

    /// Raw primitive code, when the error came from the transport
    pub fn code(&self) -> Option<i32> {
        match self {
            IpcError::TransportTimeout(ret) | IpcError::TransportFailure(ret) => Some(ret.0),
            IpcError::Kernel(kr) => Some(kr.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::descriptor::{Descriptor, MsgTypeName};
    use crate::ipc::PortName;

    #[test]
    fn test_incomplete_body_accessors() {
        let decoded = Body::new().with(Descriptor::port(PortName(5), MsgTypeName::MoveSend));
        let err = BodyError {
            decoded: decoded.clone(),
            expected: 2,
            source: IpcError::InvalidDescriptorTag { tag: 0x40, offset: 40 },
        }
        .into_message_error(MachMsgHeader::new(9));

        assert_eq!(err.partial_body(), Some(&decoded));
        assert_eq!(
            err.root_cause(),
            &IpcError::InvalidDescriptorTag { tag: 0x40, offset: 40 }
        );
        assert!(!err.is_timeout());
        assert_eq!(err.code(), None);

        let plain = IpcError::InvalidTrailer { size: 4 };
        assert_eq!(plain.partial_body(), None);
        assert_eq!(plain.root_cause(), &plain);
    }
}
