//! Mach Message Transport
//!
//! All message traffic funnels through the `mach_msg()` primitive, which can
//! send a message, receive one, or do both in a single call (RPC). This
//! module builds the three call shapes on top of a [`Transport`]:
//!
//! - [`send`]: serialize and hand the message to the kernel
//! - [`receive`]: wait for a message on a port and parse it
//! - [`send_receive`]: send a request, then receive the reply in the same
//!   call, reusing one buffer large enough for either
//!
//! ## Options
//!
//! - MACH_SEND_MSG / MACH_RCV_MSG select the phases; each call shape forces
//!   its own phases regardless of what the caller passes
//! - MACH_SEND_TIMEOUT / MACH_RCV_TIMEOUT are added whenever a non-zero
//!   timeout is supplied; no timeout (or a zero one) blocks indefinitely
//!
//! Every call blocks until the primitive returns. Nothing is retried here:
//! a timeout comes back as [`IpcError::TransportTimeout`] so callers can
//! decide for themselves.

use core::fmt;
use core::time::Duration;

use super::cursor::{align_up, MessageBuffer, ReadCursor, WriteCursor};
use super::descriptor::MsgTypeName;
use super::message::{FromMessage, MachMsgHeader, Message, MACH_MSG_ALIGNMENT};
use super::trailer::{TrailerRequest, MAX_TRAILER_SIZE};
use super::{IpcError, PortName, Result};

// ============================================================================
// Message Option Flags
// ============================================================================

/// Send a message
pub const MACH_SEND_MSG: u32 = 0x0000_0001;

/// Receive a message
pub const MACH_RCV_MSG: u32 = 0x0000_0002;

/// Report the size of a message too large for the receive buffer
pub const MACH_RCV_LARGE: u32 = 0x0000_0004;

/// Send/receive timeout is specified
pub const MACH_SEND_TIMEOUT: u32 = 0x0000_0010;
pub const MACH_RCV_TIMEOUT: u32 = 0x0000_0100;

/// Interruptible operation
pub const MACH_SEND_INTERRUPT: u32 = 0x0000_0040;
pub const MACH_RCV_INTERRUPT: u32 = 0x0000_0400;

/// Arm a send-possible notification on failure
pub const MACH_SEND_NOTIFY: u32 = 0x0000_0080;

/// Receive the voucher port
pub const MACH_RCV_VOUCHER: u32 = 0x0000_0800;

/// Block indefinitely
pub const MACH_MSG_TIMEOUT_NONE: u32 = 0;

// ============================================================================
// Message Return Codes
// ============================================================================

/// Operation successful
pub const MACH_MSG_SUCCESS: i32 = 0;

/// Thread is waiting to send
pub const MACH_SEND_IN_PROGRESS: i32 = 0x1000_0001;
/// Invalid data (message, buffer, etc.)
pub const MACH_SEND_INVALID_DATA: i32 = 0x1000_0002;
/// Invalid destination port
pub const MACH_SEND_INVALID_DEST: i32 = 0x1000_0003;
/// Operation timed out
pub const MACH_SEND_TIMED_OUT: i32 = 0x1000_0004;
/// Invalid voucher port
pub const MACH_SEND_INVALID_VOUCHER: i32 = 0x1000_0005;
/// Operation interrupted
pub const MACH_SEND_INTERRUPTED: i32 = 0x1000_0007;
/// Message buffer is not large enough for inline data
pub const MACH_SEND_MSG_TOO_SMALL: i32 = 0x1000_0008;
/// Invalid reply port
pub const MACH_SEND_INVALID_REPLY: i32 = 0x1000_0009;
/// Invalid port right
pub const MACH_SEND_INVALID_RIGHT: i32 = 0x1000_000a;
/// Invalid notification port
pub const MACH_SEND_INVALID_NOTIFY: i32 = 0x1000_000b;
/// Invalid out-of-line memory pointer
pub const MACH_SEND_INVALID_MEMORY: i32 = 0x1000_000c;
/// No message buffer is available
pub const MACH_SEND_NO_BUFFER: i32 = 0x1000_000d;
/// Send is too large for port
pub const MACH_SEND_TOO_LARGE: i32 = 0x1000_000e;
/// Invalid descriptor type
pub const MACH_SEND_INVALID_TYPE: i32 = 0x1000_000f;
/// Invalid header
pub const MACH_SEND_INVALID_HEADER: i32 = 0x1000_0010;
/// Invalid trailer request
pub const MACH_SEND_INVALID_TRAILER: i32 = 0x1000_0011;

/// Thread is waiting for receive
pub const MACH_RCV_IN_PROGRESS: i32 = 0x1000_4001;
/// Invalid receive name
pub const MACH_RCV_INVALID_NAME: i32 = 0x1000_4002;
/// Operation timed out
pub const MACH_RCV_TIMED_OUT: i32 = 0x1000_4003;
/// Message too large for buffer
pub const MACH_RCV_TOO_LARGE: i32 = 0x1000_4004;
/// Operation interrupted
pub const MACH_RCV_INTERRUPTED: i32 = 0x1000_4005;
/// Port moved into a set during the receive
pub const MACH_RCV_PORT_CHANGED: i32 = 0x1000_4006;
/// Invalid notification port
pub const MACH_RCV_INVALID_NOTIFY: i32 = 0x1000_4007;
/// Invalid receive buffer
pub const MACH_RCV_INVALID_DATA: i32 = 0x1000_4008;
/// Port died during receive
pub const MACH_RCV_PORT_DIED: i32 = 0x1000_4009;
/// Port is a member of a port set
pub const MACH_RCV_IN_SET: i32 = 0x1000_400a;
/// Error receiving the header
pub const MACH_RCV_HEADER_ERROR: i32 = 0x1000_400b;
/// Error receiving the body
pub const MACH_RCV_BODY_ERROR: i32 = 0x1000_400c;
/// Invalid descriptor type in the receive buffer
pub const MACH_RCV_INVALID_TYPE: i32 = 0x1000_400d;
/// Scatter list too small
pub const MACH_RCV_SCATTER_SMALL: i32 = 0x1000_400e;
/// Invalid trailer request
pub const MACH_RCV_INVALID_TRAILER: i32 = 0x1000_400f;

/// Kernel routine succeeded
pub const KERN_SUCCESS: i32 = 0;
pub const KERN_INVALID_ADDRESS: i32 = 1;
pub const KERN_PROTECTION_FAILURE: i32 = 2;
pub const KERN_NO_SPACE: i32 = 3;
pub const KERN_INVALID_ARGUMENT: i32 = 4;
pub const KERN_FAILURE: i32 = 5;
pub const KERN_RESOURCE_SHORTAGE: i32 = 6;
pub const KERN_INVALID_NAME: i32 = 15;
pub const KERN_INVALID_RIGHT: i32 = 17;
pub const KERN_INVALID_VALUE: i32 = 18;

/// Default maximum size of a received message, trailer excluded
pub const DEFAULT_RCV_SIZE: usize = 4096;

// ============================================================================
// Return Types
// ============================================================================

/// Return value from mach_msg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachMsgReturn(pub i32);

impl MachMsgReturn {
    /// Success
    pub const SUCCESS: Self = Self(MACH_MSG_SUCCESS);

    /// Check if successful
    pub fn is_success(self) -> bool {
        self.0 == MACH_MSG_SUCCESS
    }

    /// Check if send error
    pub fn is_send_error(self) -> bool {
        (self.0 as u32 & 0xffff_c000) == 0x1000_0000
    }

    /// Check if receive error
    pub fn is_rcv_error(self) -> bool {
        (self.0 as u32 & 0xffff_c000) == 0x1000_4000
    }

    /// Check if the operation ran out of time
    pub fn is_timeout(self) -> bool {
        matches!(self.0, MACH_SEND_TIMED_OUT | MACH_RCV_TIMED_OUT)
    }

    /// Get error name for debugging
    pub fn name(self) -> &'static str {
        match self.0 {
            MACH_MSG_SUCCESS => "SUCCESS",
            MACH_SEND_IN_PROGRESS => "SEND_IN_PROGRESS",
            MACH_SEND_INVALID_DATA => "SEND_INVALID_DATA",
            MACH_SEND_INVALID_DEST => "SEND_INVALID_DEST",
            MACH_SEND_TIMED_OUT => "SEND_TIMED_OUT",
            MACH_SEND_INVALID_VOUCHER => "SEND_INVALID_VOUCHER",
            MACH_SEND_INTERRUPTED => "SEND_INTERRUPTED",
            MACH_SEND_MSG_TOO_SMALL => "SEND_MSG_TOO_SMALL",
            MACH_SEND_INVALID_REPLY => "SEND_INVALID_REPLY",
            MACH_SEND_INVALID_RIGHT => "SEND_INVALID_RIGHT",
            MACH_SEND_INVALID_NOTIFY => "SEND_INVALID_NOTIFY",
            MACH_SEND_INVALID_MEMORY => "SEND_INVALID_MEMORY",
            MACH_SEND_NO_BUFFER => "SEND_NO_BUFFER",
            MACH_SEND_TOO_LARGE => "SEND_TOO_LARGE",
            MACH_SEND_INVALID_TYPE => "SEND_INVALID_TYPE",
            MACH_SEND_INVALID_HEADER => "SEND_INVALID_HEADER",
            MACH_SEND_INVALID_TRAILER => "SEND_INVALID_TRAILER",
            MACH_RCV_IN_PROGRESS => "RCV_IN_PROGRESS",
            MACH_RCV_INVALID_NAME => "RCV_INVALID_NAME",
            MACH_RCV_TIMED_OUT => "RCV_TIMED_OUT",
            MACH_RCV_TOO_LARGE => "RCV_TOO_LARGE",
            MACH_RCV_INTERRUPTED => "RCV_INTERRUPTED",
            MACH_RCV_PORT_CHANGED => "RCV_PORT_CHANGED",
            MACH_RCV_INVALID_NOTIFY => "RCV_INVALID_NOTIFY",
            MACH_RCV_INVALID_DATA => "RCV_INVALID_DATA",
            MACH_RCV_PORT_DIED => "RCV_PORT_DIED",
            MACH_RCV_IN_SET => "RCV_IN_SET",
            MACH_RCV_HEADER_ERROR => "RCV_HEADER_ERROR",
            MACH_RCV_BODY_ERROR => "RCV_BODY_ERROR",
            MACH_RCV_INVALID_TYPE => "RCV_INVALID_TYPE",
            MACH_RCV_SCATTER_SMALL => "RCV_SCATTER_SMALL",
            MACH_RCV_INVALID_TRAILER => "RCV_INVALID_TRAILER",
            _ => "UNKNOWN",
        }
    }

    /// Map the code onto the crate error taxonomy
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else if self.is_timeout() {
            Err(IpcError::TransportTimeout(self))
        } else {
            Err(IpcError::TransportFailure(self))
        }
    }
}

impl Default for MachMsgReturn {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl From<i32> for MachMsgReturn {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for MachMsgReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.name(), self.0)
    }
}

/// Return value from kernel routines other than mach_msg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernReturn(pub i32);

impl KernReturn {
    pub const SUCCESS: Self = Self(KERN_SUCCESS);

    pub fn is_success(self) -> bool {
        self.0 == KERN_SUCCESS
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            KERN_SUCCESS => "KERN_SUCCESS",
            KERN_INVALID_ADDRESS => "KERN_INVALID_ADDRESS",
            KERN_PROTECTION_FAILURE => "KERN_PROTECTION_FAILURE",
            KERN_NO_SPACE => "KERN_NO_SPACE",
            KERN_INVALID_ARGUMENT => "KERN_INVALID_ARGUMENT",
            KERN_FAILURE => "KERN_FAILURE",
            KERN_RESOURCE_SHORTAGE => "KERN_RESOURCE_SHORTAGE",
            KERN_INVALID_NAME => "KERN_INVALID_NAME",
            KERN_INVALID_RIGHT => "KERN_INVALID_RIGHT",
            KERN_INVALID_VALUE => "KERN_INVALID_VALUE",
            _ => "UNKNOWN",
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(IpcError::Kernel(self))
        }
    }
}

impl fmt::Display for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

// ============================================================================
// Transport Primitive
// ============================================================================

/// Queue head reported by a peek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeekHead {
    /// Sequence number of the head message
    pub seqno: u32,
    /// Advertised size of the head message
    pub size: u32,
    pub id: i32,
    /// Bytes of trailer written into the caller's trailer buffer
    pub trailer_len: u32,
}

/// The kernel message primitive
///
/// Implementations perform exactly one kernel call per method and report its
/// raw result. Whether concurrent callers may share a port is up to the
/// implementation (for the kernel primitive, it is).
pub trait Transport {
    /// `mach_msg()`: send `send_size` bytes from `msg` and/or receive up to
    /// `rcv_size` bytes into it from `rcv_name`
    #[allow(clippy::too_many_arguments)]
    fn mach_msg(
        &self,
        msg: &mut MessageBuffer,
        option: u32,
        send_size: u32,
        rcv_size: u32,
        rcv_name: PortName,
        timeout: u32,
        notify: PortName,
    ) -> MachMsgReturn;

    /// `mach_port_peek()`: describe the message at the head of `name`'s
    /// queue without dequeuing it, writing its trailer into `trailer`
    fn port_peek(
        &self,
        name: PortName,
        trailer_type: u32,
        seqno: u32,
        trailer: &mut [u8],
    ) -> core::result::Result<PeekHead, KernReturn>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn mach_msg(
        &self,
        msg: &mut MessageBuffer,
        option: u32,
        send_size: u32,
        rcv_size: u32,
        rcv_name: PortName,
        timeout: u32,
        notify: PortName,
    ) -> MachMsgReturn {
        (**self).mach_msg(msg, option, send_size, rcv_size, rcv_name, timeout, notify)
    }

    fn port_peek(
        &self,
        name: PortName,
        trailer_type: u32,
        seqno: u32,
        trailer: &mut [u8],
    ) -> core::result::Result<PeekHead, KernReturn> {
        (**self).port_peek(name, trailer_type, seqno, trailer)
    }
}

// ============================================================================
// mach_msg Options
// ============================================================================

/// Options for one mach_msg operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachMsgOptions {
    /// Extra option flags; the phase bits are set by each call shape
    pub flags: u32,
    /// Send timeout
    pub send_timeout: Option<Duration>,
    /// Receive timeout
    pub rcv_timeout: Option<Duration>,
    /// Notification port
    pub notify_port: PortName,
    /// Destination override for the serialized header
    pub remote_port: Option<PortName>,
    pub remote_disposition: Option<MsgTypeName>,
    /// Reply port override for the serialized header
    pub local_port: Option<PortName>,
    pub local_disposition: Option<MsgTypeName>,
    /// Largest message accepted on receive, trailer excluded
    pub rcv_size: Option<usize>,
    /// Trailer elements requested on receive
    pub trailer: TrailerRequest,
}

impl MachMsgOptions {
    /// Create options for send only
    pub fn send() -> Self {
        Self {
            flags: MACH_SEND_MSG,
            ..Default::default()
        }
    }

    /// Create options for receive only
    pub fn receive() -> Self {
        Self {
            flags: MACH_RCV_MSG,
            ..Default::default()
        }
    }

    /// Create options for send+receive (RPC)
    pub fn rpc() -> Self {
        Self {
            flags: MACH_SEND_MSG | MACH_RCV_MSG,
            ..Default::default()
        }
    }

    /// Add option flags
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Add send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Add receive timeout
    pub fn with_rcv_timeout(mut self, timeout: Duration) -> Self {
        self.rcv_timeout = Some(timeout);
        self
    }

    pub fn with_notify_port(mut self, port: PortName) -> Self {
        self.notify_port = port;
        self
    }

    /// Send to `port` whatever the message header says
    pub fn with_remote_port(mut self, port: PortName) -> Self {
        self.remote_port = Some(port);
        self
    }

    pub fn with_remote_disposition(mut self, disposition: MsgTypeName) -> Self {
        self.remote_disposition = Some(disposition);
        self
    }

    /// Use `port` as the reply port whatever the message header says
    pub fn with_local_port(mut self, port: PortName) -> Self {
        self.local_port = Some(port);
        self
    }

    pub fn with_local_disposition(mut self, disposition: MsgTypeName) -> Self {
        self.local_disposition = Some(disposition);
        self
    }

    pub fn with_rcv_size(mut self, size: usize) -> Self {
        self.rcv_size = Some(size);
        self
    }

    pub fn with_trailer(mut self, trailer: TrailerRequest) -> Self {
        self.trailer = trailer;
        self
    }

    /// Should send?
    pub fn should_send(&self) -> bool {
        (self.flags & MACH_SEND_MSG) != 0
    }

    /// Should receive?
    pub fn should_receive(&self) -> bool {
        (self.flags & MACH_RCV_MSG) != 0
    }

    /// Receive buffer length: the message limit plus room for any trailer
    fn rcv_buffer_len(&self) -> usize {
        align_up(self.rcv_size.unwrap_or(DEFAULT_RCV_SIZE), MACH_MSG_ALIGNMENT) + MAX_TRAILER_SIZE
    }
}

/// Timeout word for the primitive, `None` when the call should block
pub fn timeout_ms(timeout: Option<Duration>) -> Option<u32> {
    let timeout = timeout.filter(|t| !t.is_zero())?;
    let ms = timeout.as_millis().clamp(1, u128::from(u32::MAX));
    Some(ms as u32)
}

/// Apply the port overrides to the header at the front of `buffer`
///
/// An override without an explicit disposition keeps the header's
/// disposition, falling back to copy-send for the destination and
/// make-send-once for the reply port.
fn rewrite_header(buffer: &mut MessageBuffer, options: &MachMsgOptions) -> Result<MachMsgHeader> {
    let mut header = MachMsgHeader::read(&mut ReadCursor::new(buffer.as_bytes()))?;
    let bits = &mut header.msgh_bits;

    if let Some(port) = options.remote_port {
        header.msgh_remote_port = port;
        if bits.remote_type().is_none() {
            bits.set_remote(Some(MsgTypeName::CopySend));
        }
    }
    if options.remote_disposition.is_some() {
        bits.set_remote(options.remote_disposition);
    }

    if let Some(port) = options.local_port {
        header.msgh_local_port = port;
        if bits.local_type().is_none() {
            bits.set_local(Some(MsgTypeName::MakeSendOnce));
        }
    }
    if options.local_disposition.is_some() {
        bits.set_local(options.local_disposition);
    }

    header.write(&mut WriteCursor::new(buffer.as_bytes_mut()))?;
    Ok(header)
}

// ============================================================================
// Call Shapes
// ============================================================================

/// Send `message`
///
/// The message is serialized into a buffer owned by this call; the caller's
/// message is never modified, port overrides only affect the wire copy.
pub fn send<T: Transport + ?Sized>(
    transport: &T,
    message: &Message<'_>,
    options: MachMsgOptions,
) -> Result<()> {
    let mut buffer = message.serialize()?;
    let header = rewrite_header(&mut buffer, &options)?;
    let send_size = align_up(header.msgh_size as usize, MACH_MSG_ALIGNMENT) as u32;

    let mut option = (options.flags | MACH_SEND_MSG) & !MACH_RCV_MSG;
    let timeout = timeout_ms(options.send_timeout);
    if timeout.is_some() {
        option |= MACH_SEND_TIMEOUT;
    }

    log::trace!(
        "mach_msg send: id={} dest={:?} size={} option={:#x}",
        header.msgh_id,
        header.msgh_remote_port,
        send_size,
        option
    );

    let ret = transport.mach_msg(
        &mut buffer,
        option,
        send_size,
        0,
        PortName::NULL,
        timeout.unwrap_or(MACH_MSG_TIMEOUT_NONE),
        options.notify_port,
    );
    if !ret.is_success() {
        log::debug!("mach_msg send to {:?} failed: {}", header.msgh_remote_port, ret);
    }
    ret.into_result()
}

/// Receive one message from `port`
pub fn receive<M: FromMessage, T: Transport + ?Sized>(
    transport: &T,
    port: PortName,
    options: MachMsgOptions,
) -> Result<M> {
    let mut buffer = MessageBuffer::zeroed(options.rcv_buffer_len());
    let rcv_size = buffer.len() as u32;

    let mut header = MachMsgHeader::new(0);
    header.msgh_local_port = port;
    header.msgh_size = rcv_size;
    header.write(&mut WriteCursor::new(buffer.as_bytes_mut()))?;

    let mut option = (options.flags | MACH_RCV_MSG | options.trailer.option_bits()) & !MACH_SEND_MSG;
    let timeout = timeout_ms(options.rcv_timeout);
    if timeout.is_some() {
        option |= MACH_RCV_TIMEOUT;
    }

    log::trace!(
        "mach_msg receive: port={:?} rcv_size={} option={:#x}",
        port,
        rcv_size,
        option
    );

    let ret = transport.mach_msg(
        &mut buffer,
        option,
        0,
        rcv_size,
        port,
        timeout.unwrap_or(MACH_MSG_TIMEOUT_NONE),
        options.notify_port,
    );
    if !ret.is_success() {
        log::debug!("mach_msg receive on {:?} failed: {}", port, ret);
    }
    ret.into_result()?;

    M::from_message(Message::deserialize(buffer.as_bytes())?)
}

/// Send `message` and receive the reply on its reply port in one call
///
/// The request is copied into a buffer sized for the larger of the request
/// and the expected reply. The kernel takes a single timeout value: the
/// receive timeout when set, otherwise the send timeout.
pub fn send_receive<M: FromMessage, T: Transport + ?Sized>(
    transport: &T,
    message: &Message<'_>,
    options: MachMsgOptions,
) -> Result<M> {
    let mut buffer = {
        let request = message.serialize()?;
        let len = request.len().max(options.rcv_buffer_len());
        MessageBuffer::from_bytes(request.as_bytes(), len)
    };
    let header = rewrite_header(&mut buffer, &options)?;
    let send_size = align_up(header.msgh_size as usize, MACH_MSG_ALIGNMENT) as u32;
    let rcv_size = buffer.len() as u32;
    let rcv_name = header.msgh_local_port;

    let mut option = options.flags | MACH_SEND_MSG | MACH_RCV_MSG | options.trailer.option_bits();
    let send_timeout = timeout_ms(options.send_timeout);
    let rcv_timeout = timeout_ms(options.rcv_timeout);
    if send_timeout.is_some() {
        option |= MACH_SEND_TIMEOUT;
    }
    if rcv_timeout.is_some() {
        option |= MACH_RCV_TIMEOUT;
    }
    let timeout = rcv_timeout.or(send_timeout).unwrap_or(MACH_MSG_TIMEOUT_NONE);

    log::trace!(
        "mach_msg rpc: id={} dest={:?} reply={:?} send_size={} rcv_size={} option={:#x}",
        header.msgh_id,
        header.msgh_remote_port,
        rcv_name,
        send_size,
        rcv_size,
        option
    );

    let ret = transport.mach_msg(
        &mut buffer,
        option,
        send_size,
        rcv_size,
        rcv_name,
        timeout,
        options.notify_port,
    );
    if !ret.is_success() {
        log::debug!("mach_msg rpc to {:?} failed: {}", header.msgh_remote_port, ret);
    }
    ret.into_result()?;

    M::from_message(Message::deserialize(buffer.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options() {
        let send = MachMsgOptions::send();
        assert!(send.should_send());
        assert!(!send.should_receive());

        let rcv = MachMsgOptions::receive();
        assert!(!rcv.should_send());
        assert!(rcv.should_receive());

        let rpc = MachMsgOptions::rpc();
        assert!(rpc.should_send());
        assert!(rpc.should_receive());
    }

    #[test]
    fn test_return_codes() {
        assert!(MachMsgReturn::SUCCESS.is_success());
        assert!(!MachMsgReturn(MACH_SEND_TIMED_OUT).is_success());
        assert!(MachMsgReturn(MACH_SEND_TIMED_OUT).is_send_error());
        assert!(!MachMsgReturn(MACH_SEND_TIMED_OUT).is_rcv_error());
        assert!(MachMsgReturn(MACH_RCV_TIMED_OUT).is_rcv_error());
        assert!(!MachMsgReturn(MACH_RCV_TIMED_OUT).is_send_error());
        assert_eq!(MachMsgReturn(MACH_RCV_PORT_DIED).name(), "RCV_PORT_DIED");
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(MachMsgReturn::SUCCESS.into_result(), Ok(()));
        assert_eq!(
            MachMsgReturn(MACH_RCV_TIMED_OUT).into_result(),
            Err(IpcError::TransportTimeout(MachMsgReturn(MACH_RCV_TIMED_OUT)))
        );
        let err = MachMsgReturn(MACH_SEND_INVALID_DEST).into_result().unwrap_err();
        assert_eq!(err, IpcError::TransportFailure(MachMsgReturn(MACH_SEND_INVALID_DEST)));
        assert_eq!(err.code(), Some(MACH_SEND_INVALID_DEST));
        assert!(!err.is_timeout());
        assert_eq!(
            KernReturn(KERN_FAILURE).into_result(),
            Err(IpcError::Kernel(KernReturn(KERN_FAILURE)))
        );
    }

    #[test]
    fn test_timeout_ms() {
        assert_eq!(timeout_ms(None), None);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), None);
        assert_eq!(timeout_ms(Some(Duration::from_micros(10))), Some(1));
        assert_eq!(timeout_ms(Some(Duration::from_millis(250))), Some(250));
        assert_eq!(timeout_ms(Some(Duration::from_secs(u64::MAX))), Some(u32::MAX));
    }

    #[test]
    fn test_rewrite_header() {
        let message = Message::new(MachMsgHeader::new(9));
        let mut buffer = message.serialize().unwrap();
        let options = MachMsgOptions::send()
            .with_remote_port(PortName(0x50b))
            .with_local_port(PortName(0x60f));
        let header = rewrite_header(&mut buffer, &options).unwrap();
        assert_eq!(header.msgh_remote_port, PortName(0x50b));
        assert_eq!(header.msgh_bits.remote_type(), Some(MsgTypeName::CopySend));
        assert_eq!(header.msgh_local_port, PortName(0x60f));
        assert_eq!(header.msgh_bits.local_type(), Some(MsgTypeName::MakeSendOnce));

        let reparsed = Message::deserialize(buffer.as_bytes()).unwrap();
        assert_eq!(reparsed.header(), &header);
        // The caller's message is untouched
        assert!(message.header().msgh_remote_port.is_null());
    }

    #[test]
    fn test_display() {
        let ret = MachMsgReturn(MACH_SEND_INVALID_DEST);
        assert_eq!(alloc::format!("{}", ret), "SEND_INVALID_DEST (0x10000003)");
    }
}
