//! Mach-style Inter-Process Communication
//!
//! Messages are built in memory as a [`Message`], laid out on the wire by the
//! envelope codec and handed to the kernel through a [`Transport`]:
//!
//! - `descriptor` / `body`: port and out-of-line records of complex messages
//! - `message`: header, body, payload and trailer as one unit
//! - `mach_msg`: send, receive and send-receive over the primitive
//! - `mqueue`: queue, client and server endpoints

use bytemuck::{Pod, Zeroable};

pub mod body;
pub mod config;
pub mod cursor;
pub mod descriptor;
pub mod error;
pub mod mach_msg;
pub mod message;
pub mod mqueue;
pub mod sys;
pub mod trailer;

pub use body::{Body, BodyError};
pub use config::IpcConfig;
pub use cursor::MessageBuffer;
pub use descriptor::{
    Descriptor, DescriptorType, GuardFlags, GuardedPortDescriptor, MsgTypeName, OolCopyOption,
    OolDescriptor, OolPortsDescriptor, PortDescriptor,
};
pub use error::{IpcError, Result};
pub use mach_msg::{KernReturn, MachMsgOptions, MachMsgReturn, Transport};
pub use message::{FromMessage, MachMsgBits, MachMsgHeader, Message, PodMessage};
pub use mqueue::{Client, Dequeue, Enqueue, PeekedMessage, Queue, Server};
pub use trailer::{AuditToken, SecurityToken, Trailer, TrailerRequest};

/// Port name type (like Mach's mach_port_t)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct PortName(pub u32);

impl PortName {
    pub const NULL: Self = Self(0);

    /// The name the kernel uses for a dead right
    pub const DEAD: Self = Self(u32::MAX);

    pub const fn new(name: u32) -> Self {
        Self(name)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Neither null nor dead
    pub fn is_valid(&self) -> bool {
        !self.is_null() && *self != Self::DEAD
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PortName {
    fn from(name: u32) -> Self {
        Self(name)
    }
}

impl From<PortName> for u32 {
    fn from(name: PortName) -> Self {
        name.0
    }
}
