//! mach_ipc - Mach message codec and transport
//!
//! This crate lays out Mach IPC messages in the 64-bit user ABI (header,
//! descriptor body, inline payload and receive trailer) and moves them
//! through the `mach_msg()` primitive, with queue, client and server
//! endpoints layered on top.

#![no_std]
// Explicit casts mirror the C layout of the wire words
#![allow(clippy::unnecessary_cast)]

// Standard library replacement for no_std
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod ipc;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
