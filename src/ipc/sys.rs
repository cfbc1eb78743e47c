//! Binding to the kernel message primitive
//!
//! On macOS [`SystemTransport`] calls `mach_msg()` and `mach_port_peek()`
//! from libSystem. Elsewhere the same type exists but every call fails with
//! `KERN_FAILURE`, so code built on it still compiles and can be exercised
//! against a stub transport.

use super::cursor::MessageBuffer;
use super::mach_msg::{
    KernReturn, MachMsgReturn, PeekHead, Transport, KERN_INVALID_ARGUMENT, MACH_RCV_INVALID_DATA,
    MACH_SEND_MSG_TOO_SMALL,
};
use super::PortName;

#[cfg(target_os = "macos")]
use super::mach_msg::KERN_SUCCESS;
#[cfg(not(target_os = "macos"))]
use super::mach_msg::KERN_FAILURE;

#[cfg(target_os = "macos")]
mod ffi {
    extern "C" {
        /// # Safety
        ///
        /// `msg` must point to at least `max(send_size, rcv_size)` writable
        /// bytes, aligned for a message header.
        pub fn mach_msg(
            msg: *mut u8,
            option: i32,
            send_size: u32,
            rcv_size: u32,
            rcv_name: u32,
            timeout: u32,
            notify: u32,
        ) -> i32;

        /// # Safety
        ///
        /// `trailer_infop` must point to `*trailer_info_cnt` writable bytes.
        pub fn mach_port_peek(
            task: u32,
            name: u32,
            trailer_type: i32,
            request_seqnop: *mut u32,
            msg_sizep: *mut u32,
            msg_idp: *mut i32,
            trailer_infop: *mut u8,
            trailer_info_cnt: *mut u32,
        ) -> i32;

        pub static mach_task_self_: u32;
    }
}

/// The host kernel's message primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTransport;

impl SystemTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for SystemTransport {
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
        if send_size as usize > msg.len() {
            return MachMsgReturn(MACH_SEND_MSG_TOO_SMALL);
        }
        if rcv_size as usize > msg.len() {
            return MachMsgReturn(MACH_RCV_INVALID_DATA);
        }
        primitive_mach_msg(msg, option, send_size, rcv_size, rcv_name, timeout, notify)
    }

    fn port_peek(
        &self,
        name: PortName,
        trailer_type: u32,
        seqno: u32,
        trailer: &mut [u8],
    ) -> Result<PeekHead, KernReturn> {
        let Ok(capacity) = u32::try_from(trailer.len()) else {
            return Err(KernReturn(KERN_INVALID_ARGUMENT));
        };
        primitive_port_peek(name, trailer_type, seqno, trailer, capacity)
    }
}

#[cfg(target_os = "macos")]
fn primitive_mach_msg(
    msg: &mut MessageBuffer,
    option: u32,
    send_size: u32,
    rcv_size: u32,
    rcv_name: PortName,
    timeout: u32,
    notify: PortName,
) -> MachMsgReturn {
    // SAFETY: the buffer is 8-byte aligned and both sizes were checked
    // against its length.
    let ret = unsafe {
        ffi::mach_msg(
            msg.as_mut_ptr(),
            option as i32,
            send_size,
            rcv_size,
            rcv_name.as_raw(),
            timeout,
            notify.as_raw(),
        )
    };
    MachMsgReturn(ret)
}

#[cfg(target_os = "macos")]
fn primitive_port_peek(
    name: PortName,
    trailer_type: u32,
    seqno: u32,
    trailer: &mut [u8],
    capacity: u32,
) -> Result<PeekHead, KernReturn> {
    let mut seqno = seqno;
    let mut size = 0u32;
    let mut id = 0i32;
    let mut count = capacity;
    // SAFETY: every out-pointer refers to a live local, and `count` is the
    // length of `trailer`.
    let kr = unsafe {
        ffi::mach_port_peek(
            ffi::mach_task_self_,
            name.as_raw(),
            trailer_type as i32,
            &mut seqno,
            &mut size,
            &mut id,
            trailer.as_mut_ptr(),
            &mut count,
        )
    };
    if kr != KERN_SUCCESS {
        return Err(KernReturn(kr));
    }
    Ok(PeekHead {
        seqno,
        size,
        id,
        trailer_len: count.min(capacity),
    })
}

#[cfg(not(target_os = "macos"))]
fn primitive_mach_msg(
    _msg: &mut MessageBuffer,
    _option: u32,
    _send_size: u32,
    _rcv_size: u32,
    _rcv_name: PortName,
    _timeout: u32,
    _notify: PortName,
) -> MachMsgReturn {
    MachMsgReturn(KERN_FAILURE)
}

#[cfg(not(target_os = "macos"))]
fn primitive_port_peek(
    _name: PortName,
    _trailer_type: u32,
    _seqno: u32,
    _trailer: &mut [u8],
    _capacity: u32,
) -> Result<PeekHead, KernReturn> {
    Err(KernReturn(KERN_FAILURE))
}
