//! IPC Message Queue - endpoint wrappers over the transport
//!
//! A [`Queue`] owns the name of one receive-capable port and forwards
//! enqueue/dequeue to the send and receive call shapes. [`Client`] and
//! [`Server`] wrap a queue and expose only one direction: the kernel lets
//! anyone holding the right do both, so the restriction lives in the types.
//!
//! Ordering and concurrent access are whatever the port itself provides;
//! nothing here buffers messages or holds locks.

use core::time::Duration;

use super::config::IpcConfig;
use super::mach_msg::{self, Transport};
use super::message::{FromMessage, MachMsgHeader, Message};
use super::sys::SystemTransport;
use super::trailer::{Trailer, TrailerRequest, MAX_TRAILER_SIZE};
use super::{IpcError, PortName, Result};

// ============================================================================
// Peek
// ============================================================================

/// Head-of-queue description returned by a peek
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekedMessage {
    /// Sequence number of the message described
    pub seqno: u32,
    /// Advertised message size
    pub size: u32,
    pub id: i32,
    pub trailer: Option<Trailer>,
}

/// Describe the message at the head of `port`'s queue without removing it
///
/// `seqno` selects the message to inspect; the kernel reports the one it
/// actually found.
pub fn peek<T: Transport + ?Sized>(
    transport: &T,
    port: PortName,
    seqno: u32,
    request: TrailerRequest,
) -> Result<PeekedMessage> {
    let mut trailer = [0u8; MAX_TRAILER_SIZE];
    let head = transport
        .port_peek(port, request.option_bits(), seqno, &mut trailer)
        .map_err(IpcError::Kernel)?;

    let len = (head.trailer_len as usize).min(trailer.len());
    let trailer = match len {
        0 => None,
        _ => Some(Trailer::from_bytes(&trailer[..len])?),
    };

    log::trace!(
        "peek {:?}: seqno={} size={} id={}",
        port,
        head.seqno,
        head.size,
        head.id
    );

    Ok(PeekedMessage {
        seqno: head.seqno,
        size: head.size,
        id: head.id,
        trailer,
    })
}

// ============================================================================
// Capabilities
// ============================================================================

/// Anything bound to a port
pub trait Endpoint {
    fn port(&self) -> PortName;
}

/// Send side of a queue
pub trait Enqueue: Endpoint {
    /// Send `message` to this queue's port
    ///
    /// `options` adds option flags; `timeout` falls back to the queue's
    /// configured send timeout.
    fn enqueue(&self, message: &Message<'_>, options: u32, timeout: Option<Duration>) -> Result<()>;
}

/// Receive side of a queue
pub trait Dequeue: Endpoint {
    /// Block until a message arrives (or the timeout elapses) and parse it as `M`
    fn dequeue<M: FromMessage>(&self, options: u32, timeout: Option<Duration>) -> Result<M>;

    /// Describe the queued message `seqno` without removing it
    fn peek(&self, seqno: u32) -> Result<PeekedMessage>;
}

// ============================================================================
// Queue
// ============================================================================

/// A receive-capable port with both directions available
#[derive(Debug, Clone)]
pub struct Queue<T = SystemTransport> {
    port: PortName,
    transport: T,
    config: IpcConfig,
}

impl<T: Transport> Queue<T> {
    /// Wrap `port` with the default configuration
    pub fn new(port: PortName, transport: T) -> Self {
        Self {
            port,
            transport,
            config: IpcConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IpcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Keep only the send side
    pub fn into_client(self) -> Client<T> {
        Client { queue: self }
    }

    /// Keep only the receive side
    pub fn into_server(self) -> Server<T> {
        Server { queue: self }
    }
}

impl<T> Endpoint for Queue<T> {
    fn port(&self) -> PortName {
        self.port
    }
}

impl<T: Transport> Enqueue for Queue<T> {
    fn enqueue(&self, message: &Message<'_>, options: u32, timeout: Option<Duration>) -> Result<()> {
        let options = self
            .config
            .send_options(options, timeout)
            .with_remote_port(self.port);
        mach_msg::send(&self.transport, message, options)
    }
}

impl<T: Transport> Dequeue for Queue<T> {
    fn dequeue<M: FromMessage>(&self, options: u32, timeout: Option<Duration>) -> Result<M> {
        let options = self.config.receive_options(options, timeout);
        match mach_msg::receive(&self.transport, self.port, options) {
            Err(err) if err.is_timeout() => {
                log::debug!("dequeue on {:?} timed out", self.port);
                Err(err)
            }
            result => result,
        }
    }

    fn peek(&self, seqno: u32) -> Result<PeekedMessage> {
        peek(&self.transport, self.port, seqno, self.config.peek_trailer)
    }
}

// ============================================================================
// Client / Server
// ============================================================================

/// Send-only view of a queue
///
/// ```no_run
/// use mach_ipc::ipc::mqueue::{Enqueue, Queue};
/// use mach_ipc::ipc::{sys::SystemTransport, MachMsgHeader, Message, PortName};
///
/// let client = Queue::new(PortName(0x103), SystemTransport).into_client();
/// let _ = client.enqueue(&Message::new(MachMsgHeader::new(7)), 0, None);
/// ```
///
/// There is no receive side:
///
/// ```compile_fail
/// use mach_ipc::ipc::mqueue::{Dequeue, Queue};
/// use mach_ipc::ipc::{sys::SystemTransport, Message, PortName};
///
/// let client = Queue::new(PortName(0x103), SystemTransport).into_client();
/// let _: mach_ipc::ipc::Result<Message<'static>> = client.dequeue(0, None);
/// ```
#[derive(Debug, Clone)]
pub struct Client<T = SystemTransport> {
    queue: Queue<T>,
}

impl<T: Transport> Client<T> {
    pub fn new(port: PortName, transport: T) -> Self {
        Queue::new(port, transport).into_client()
    }

    pub fn config(&self) -> &IpcConfig {
        self.queue.config()
    }

    /// Send `message` and wait on `reply_port` for the answer, in one call
    pub fn request<M: FromMessage>(
        &self,
        message: &Message<'_>,
        reply_port: PortName,
        timeout: Option<Duration>,
    ) -> Result<M> {
        let options = self
            .queue
            .config
            .rpc_options(0, timeout)
            .with_remote_port(self.queue.port)
            .with_local_port(reply_port);
        mach_msg::send_receive(&self.queue.transport, message, options)
    }
}

impl<T> Endpoint for Client<T> {
    fn port(&self) -> PortName {
        self.queue.port
    }
}

impl<T: Transport> Enqueue for Client<T> {
    fn enqueue(&self, message: &Message<'_>, options: u32, timeout: Option<Duration>) -> Result<()> {
        self.queue.enqueue(message, options, timeout)
    }
}

/// Receive-only view of a queue
///
/// ```no_run
/// use mach_ipc::ipc::mqueue::{Dequeue, Queue};
/// use mach_ipc::ipc::{sys::SystemTransport, Message, PortName};
///
/// let server = Queue::new(PortName(0x207), SystemTransport).into_server();
/// let _: mach_ipc::ipc::Result<Message<'static>> = server.dequeue(0, None);
/// ```
///
/// There is no send side:
///
/// ```compile_fail
/// use mach_ipc::ipc::mqueue::{Enqueue, Queue};
/// use mach_ipc::ipc::{sys::SystemTransport, MachMsgHeader, Message, PortName};
///
/// let server = Queue::new(PortName(0x207), SystemTransport).into_server();
/// let _ = server.enqueue(&Message::new(MachMsgHeader::new(7)), 0, None);
/// ```
#[derive(Debug, Clone)]
pub struct Server<T = SystemTransport> {
    queue: Queue<T>,
}

impl<T: Transport> Server<T> {
    pub fn new(port: PortName, transport: T) -> Self {
        Queue::new(port, transport).into_server()
    }

    pub fn config(&self) -> &IpcConfig {
        self.queue.config()
    }

    /// Answer `request` on the reply port it carried
    ///
    /// On receive the kernel moves the sender's reply port into the remote
    /// field, so the response goes there with the disposition it arrived
    /// with unless `response` names its own.
    pub fn reply(
        &self,
        request: &MachMsgHeader,
        response: &Message<'_>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut options = self
            .queue
            .config
            .send_options(0, timeout)
            .with_remote_port(request.msgh_remote_port);
        if response.header().msgh_bits.remote_type().is_none() {
            options.remote_disposition = request.msgh_bits.remote_type();
        }
        mach_msg::send(&self.queue.transport, response, options)
    }
}

impl<T> Endpoint for Server<T> {
    fn port(&self) -> PortName {
        self.queue.port
    }
}

impl<T: Transport> Dequeue for Server<T> {
    fn dequeue<M: FromMessage>(&self, options: u32, timeout: Option<Duration>) -> Result<M> {
        self.queue.dequeue(options, timeout)
    }

    fn peek(&self, seqno: u32) -> Result<PeekedMessage> {
        self.queue.peek(seqno)
    }
}
