//! Default settings applied by queues
//!
//! A [`Queue`](super::mqueue::Queue) carries one `IpcConfig` and fills in
//! whatever a call leaves unspecified from it.

use core::time::Duration;

use super::mach_msg::{MachMsgOptions, DEFAULT_RCV_SIZE};
use super::trailer::TrailerRequest;

/// Queue defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcConfig {
    /// Largest message accepted on receive, trailer excluded
    pub rcv_size: usize,
    /// Trailer elements requested on receive
    pub rcv_trailer: TrailerRequest,
    /// Trailer elements requested on peek
    pub peek_trailer: TrailerRequest,
    /// Send timeout when the caller gives none
    pub send_timeout: Option<Duration>,
    /// Receive timeout when the caller gives none
    pub rcv_timeout: Option<Duration>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            rcv_size: DEFAULT_RCV_SIZE,
            rcv_trailer: TrailerRequest::Null,
            peek_trailer: TrailerRequest::Audit,
            send_timeout: None,
            rcv_timeout: None,
        }
    }
}

impl IpcConfig {
    pub fn with_rcv_size(mut self, size: usize) -> Self {
        self.rcv_size = size;
        self
    }

    pub fn with_rcv_trailer(mut self, trailer: TrailerRequest) -> Self {
        self.rcv_trailer = trailer;
        self
    }

    pub fn with_peek_trailer(mut self, trailer: TrailerRequest) -> Self {
        self.peek_trailer = trailer;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn with_rcv_timeout(mut self, timeout: Duration) -> Self {
        self.rcv_timeout = Some(timeout);
        self
    }

    /// Send options with `flags` added and `timeout` falling back to the default
    pub fn send_options(&self, flags: u32, timeout: Option<Duration>) -> MachMsgOptions {
        MachMsgOptions {
            send_timeout: timeout.or(self.send_timeout),
            ..MachMsgOptions::send().with_flags(flags)
        }
    }

    /// Receive options with `flags` added and `timeout` falling back to the default
    pub fn receive_options(&self, flags: u32, timeout: Option<Duration>) -> MachMsgOptions {
        MachMsgOptions {
            rcv_timeout: timeout.or(self.rcv_timeout),
            ..MachMsgOptions::receive()
                .with_flags(flags)
                .with_rcv_size(self.rcv_size)
                .with_trailer(self.rcv_trailer)
        }
    }

    /// Send-then-receive options; `timeout` bounds the receive phase
    pub fn rpc_options(&self, flags: u32, timeout: Option<Duration>) -> MachMsgOptions {
        MachMsgOptions {
            send_timeout: self.send_timeout,
            rcv_timeout: timeout.or(self.rcv_timeout),
            ..MachMsgOptions::rpc()
                .with_flags(flags)
                .with_rcv_size(self.rcv_size)
                .with_trailer(self.rcv_trailer)
        }
    }
}
