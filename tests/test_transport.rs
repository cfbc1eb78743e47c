//! Transport and queue scenarios against a scripted primitive


use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use mach_ipc::ipc::cursor::ReadCursor;
use mach_ipc::ipc::mach_msg::{
    self, PeekHead, MACH_MSG_SUCCESS, MACH_RCV_MSG, MACH_RCV_PORT_DIED, MACH_RCV_TIMED_OUT,
    MACH_RCV_TIMEOUT, MACH_SEND_INVALID_DEST, MACH_SEND_MSG, MACH_SEND_TIMED_OUT,
    MACH_SEND_TIMEOUT,
};
use mach_ipc::ipc::trailer::MAX_TRAILER_SIZE;
use mach_ipc::ipc::{
    AuditToken, Body, Client, Dequeue, Descriptor, Enqueue, IpcConfig, IpcError, MachMsgHeader,
    MachMsgOptions, MachMsgReturn, Message, MsgTypeName, OolCopyOption, PodMessage, PortName,
    Queue, Server, Trailer, TrailerRequest,
};
use stub_transport::{Reply, StubTransport};

const SERVICE_PORT: PortName = PortName::new(0x1503);
const REPLY_PORT: PortName = PortName::new(0x1607);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct Ping {
    seq: u32,
    flags: u32,
}

fn sample_message() -> Message<'static> {
    Message::new(MachMsgHeader::new(42)).with_payload(vec![0xAA, 0xBB, 0xCC, 0xCC])
}

// ════════════════════════════════════════════════════════════
// Send
// ════════════════════════════════════════════════════════════

#[test]
fn test_simple_send() {
    let transport = StubTransport::new();
    let queue = Queue::new(SERVICE_PORT, &transport);
    queue.enqueue(&sample_message(), 0, None).unwrap();

    let call = transport.last_call();
    assert_eq!(call.option, MACH_SEND_MSG);
    assert_eq!(call.send_size, 28);
    assert_eq!(call.rcv_size, 0);
    assert_eq!(call.timeout, 0);

    let sent = Message::deserialize(&call.sent).unwrap();
    assert_eq!(sent.id(), 42);
    assert_eq!(sent.payload(), Some(&[0xAA, 0xBB, 0xCC, 0xCC][..]));
    assert_eq!(sent.header().msgh_remote_port, SERVICE_PORT);
    assert_eq!(sent.header().msgh_bits.remote_type(), Some(MsgTypeName::CopySend));
}

#[test]
fn test_send_timeout() {
    let transport = StubTransport::new().reply(Reply::Code(MACH_SEND_TIMED_OUT));
    let queue = Queue::new(SERVICE_PORT, &transport);
    let err = queue
        .enqueue(&sample_message(), 0, Some(Duration::from_millis(100)))
        .unwrap_err();
    assert_eq!(err, IpcError::TransportTimeout(MachMsgReturn(MACH_SEND_TIMED_OUT)));
    assert!(err.is_timeout());

    let call = transport.last_call();
    assert_eq!(call.option, MACH_SEND_MSG | MACH_SEND_TIMEOUT);
    assert_eq!(call.timeout, 100);
}

#[test]
fn test_zero_timeout_blocks() {
    let transport = StubTransport::new();
    let queue = Queue::new(SERVICE_PORT, &transport);
    queue.enqueue(&sample_message(), 0, Some(Duration::ZERO)).unwrap();

    let call = transport.last_call();
    assert_eq!(call.option & MACH_SEND_TIMEOUT, 0);
    assert_eq!(call.timeout, 0);
}

#[test]
fn test_send_failure_keeps_code() {
    let transport = StubTransport::new().reply(Reply::Code(MACH_SEND_INVALID_DEST));
    let err = mach_msg::send(&transport, &sample_message(), MachMsgOptions::send()).unwrap_err();
    assert_eq!(err, IpcError::TransportFailure(MachMsgReturn(MACH_SEND_INVALID_DEST)));
    assert!(!err.is_timeout());
    assert_eq!(err.code(), Some(MACH_SEND_INVALID_DEST));
}

#[test]
fn test_send_strips_receive_phase() {
    let transport = StubTransport::new();
    mach_msg::send(&transport, &sample_message(), MachMsgOptions::rpc()).unwrap();
    let call = transport.last_call();
    assert_eq!(call.option, MACH_SEND_MSG);
    assert_eq!(call.rcv_size, 0);
}

#[test]
fn test_override_does_not_touch_message() {
    let transport = StubTransport::new();
    let message = Message::new(
        MachMsgHeader::new(5).with_remote_port(PortName(0x55), MsgTypeName::CopySend),
    );
    let options = MachMsgOptions::send()
        .with_remote_port(PortName(0x99))
        .with_remote_disposition(MsgTypeName::MoveSendOnce);
    mach_msg::send(&transport, &message, options).unwrap();

    let sent = Message::deserialize(&transport.last_call().sent)
        .unwrap()
        .into_owned();
    assert_eq!(sent.header().msgh_remote_port, PortName(0x99));
    assert_eq!(sent.header().msgh_bits.remote_type(), Some(MsgTypeName::MoveSendOnce));
    assert_eq!(message.header().msgh_remote_port, PortName(0x55));
    assert_eq!(message.header().msgh_bits.remote_type(), Some(MsgTypeName::CopySend));
}

#[test]
fn test_send_complex_message() {
    let transport = StubTransport::new();
    let queue = Queue::new(SERVICE_PORT, &transport);
    let body = Body::new()
        .with(Descriptor::port(PortName(0x703), MsgTypeName::MoveSend))
        .with(Descriptor::out_of_line(0x7000_0000, 16, OolCopyOption::Virtual));
    let message = Message::new(MachMsgHeader::new(9)).with_body(body.clone());
    queue.enqueue(&message, 0, None).unwrap();

    let call = transport.last_call();
    assert_eq!(call.send_size as usize, 24 + 4 + 12 + 16);
    let sent = Message::deserialize(&call.sent).unwrap();
    assert!(sent.header().msgh_bits.is_complex());
    assert_eq!(sent.body(), Some(&body));
}

#[test]
fn test_presize_too_small_never_reaches_transport() {
    let transport = StubTransport::new();
    let queue = Queue::new(SERVICE_PORT, &transport);
    let mut header = MachMsgHeader::new(1);
    header.msgh_size = 10;
    let message = Message::new(header).with_payload(vec![1, 2, 3]);
    assert!(matches!(
        queue.enqueue(&message, 0, None),
        Err(IpcError::BufferOverflow { .. })
    ));
    assert!(transport.calls().is_empty());
}

// ════════════════════════════════════════════════════════════
// Receive
// ════════════════════════════════════════════════════════════

#[test]
fn test_receive_timeout_is_distinct() {
    let transport = StubTransport::new()
        .reply(Reply::Code(MACH_RCV_TIMED_OUT))
        .reply(Reply::Code(MACH_RCV_PORT_DIED));
    let queue = Queue::new(SERVICE_PORT, &transport);

    let err = queue
        .dequeue::<Message<'static>>(0, Some(Duration::from_millis(10)))
        .unwrap_err();
    assert_eq!(err, IpcError::TransportTimeout(MachMsgReturn(MACH_RCV_TIMED_OUT)));

    let call = transport.last_call();
    assert_eq!(call.option, MACH_RCV_MSG | MACH_RCV_TIMEOUT);
    assert_eq!(call.send_size, 0);
    assert_eq!(call.rcv_name, SERVICE_PORT);
    assert_eq!(call.timeout, 10);

    let err = queue.dequeue::<Message<'static>>(0, None).unwrap_err();
    assert_eq!(err, IpcError::TransportFailure(MachMsgReturn(MACH_RCV_PORT_DIED)));
    assert!(!err.is_timeout());
}

#[test]
fn test_receive_message_with_trailer() {
    let delivered = sample_message().with_trailer(Trailer::new(Some(9), None, None));
    let transport = StubTransport::new().reply(Reply::message(&delivered));
    let queue = Queue::new(SERVICE_PORT, &transport);

    let received: Message<'static> = queue.dequeue(0, None).unwrap();
    assert_eq!(received.id(), 42);
    assert_eq!(received.payload(), Some(&[0xAA, 0xBB, 0xCC, 0xCC][..]));
    assert_eq!(received.trailer().and_then(Trailer::seqno), Some(9));

    let call = transport.last_call();
    assert_eq!(call.rcv_size as usize, 4096 + MAX_TRAILER_SIZE);
    assert_eq!(call.buffer_len, call.rcv_size as usize);
}

#[test]
fn test_receive_requests_trailer() {
    let transport = StubTransport::new().reply(Reply::message(&sample_message()));
    let config = IpcConfig::default()
        .with_rcv_trailer(TrailerRequest::Audit)
        .with_rcv_size(256);
    let queue = Queue::new(SERVICE_PORT, &transport).with_config(config);
    let _: Message<'static> = queue.dequeue(0, None).unwrap();

    let call = transport.last_call();
    assert_eq!(call.option, MACH_RCV_MSG | TrailerRequest::Audit.option_bits());
    assert_eq!(call.rcv_size as usize, 256 + MAX_TRAILER_SIZE);
}

#[test]
fn test_receive_pod_message() {
    let ping = Ping { seq: 17, flags: 3 };
    let delivered = PodMessage::new(MachMsgHeader::new(300), ping).to_message();
    let transport = StubTransport::new().reply(Reply::message(&delivered));
    let server = Server::new(SERVICE_PORT, &transport);

    let received: PodMessage<Ping> = server.dequeue(0, None).unwrap();
    assert_eq!(received.value, ping);
    assert_eq!(received.header.msgh_id, 300);
}

#[test]
fn test_receive_pod_message_too_short() {
    let delivered = Message::new(MachMsgHeader::new(300)).with_payload(vec![1, 2]);
    let transport = StubTransport::new().reply(Reply::message(&delivered));
    let server = Server::new(SERVICE_PORT, &transport);

    let err = server.dequeue::<PodMessage<Ping>>(0, None).unwrap_err();
    assert_eq!(err, IpcError::SizeMismatch { expected: 8, actual: 2 });
}

#[test]
fn test_receive_unknown_descriptor() {
    let body = Body::new().with(Descriptor::port(PortName(0x703), MsgTypeName::MoveSend));
    let delivered = Message::new(MachMsgHeader::new(8)).with_body(body);
    let mut bytes = delivered.serialize().unwrap().as_bytes().to_vec();
    let tag_byte = 24 + 4 + if cfg!(target_endian = "little") { 11 } else { 8 };
    bytes[tag_byte] = 0x40;

    let transport = StubTransport::new().reply(Reply::Bytes(bytes));
    let queue = Queue::new(SERVICE_PORT, &transport);
    let err = queue.dequeue::<Message<'static>>(0, None).unwrap_err();
    assert_eq!(err.root_cause(), &IpcError::InvalidDescriptorTag { tag: 0x40, offset: 28 });
    assert_eq!(err.partial_body(), Some(&Body::new()));
}

#[test]
fn test_receive_bad_tag_keeps_moved_rights() {
    let body = Body::new()
        .with(Descriptor::port(PortName(0x703), MsgTypeName::MoveSend))
        .with(Descriptor::port(PortName(0x704), MsgTypeName::MoveSend));
    let delivered = Message::new(MachMsgHeader::new(8)).with_body(body);
    let mut bytes = delivered.serialize().unwrap().as_bytes().to_vec();
    let tag_byte = 24 + 4 + 12 + if cfg!(target_endian = "little") { 11 } else { 8 };
    bytes[tag_byte] = 0x40;

    let transport = StubTransport::new().reply(Reply::Bytes(bytes));
    let server = Server::new(SERVICE_PORT, &transport);
    let err = server.dequeue::<Message<'static>>(0, None).unwrap_err();

    let IpcError::IncompleteBody { header, body } = &err else {
        panic!("expected an incomplete body, got {err:?}");
    };
    assert_eq!(header.msgh_id, 8);
    assert_eq!(body.expected, 2);
    assert_eq!(body.decoded.len(), 1);
    assert_eq!(
        body.decoded.get(0),
        Some(&Descriptor::port(PortName(0x703), MsgTypeName::MoveSend))
    );
    assert_eq!(err.root_cause(), &IpcError::InvalidDescriptorTag { tag: 0x40, offset: 40 });
}

// ════════════════════════════════════════════════════════════
// Send + Receive
// ════════════════════════════════════════════════════════════

#[test]
fn test_client_request() {
    let answer = Message::new(MachMsgHeader::new(143)).with_payload(&b"pong"[..]);
    let transport = StubTransport::new().reply(Reply::message(&answer));
    let client = Client::new(SERVICE_PORT, &transport);

    let request = Message::new(MachMsgHeader::new(43)).with_payload(&b"ping"[..]);
    let reply: Message<'static> = client
        .request(&request, REPLY_PORT, Some(Duration::from_millis(50)))
        .unwrap();
    assert_eq!(reply.id(), 143);
    assert_eq!(reply.payload(), Some(&b"pong"[..]));

    let call = transport.last_call();
    assert_eq!(call.option, MACH_SEND_MSG | MACH_RCV_MSG | MACH_RCV_TIMEOUT);
    assert_eq!(call.timeout, 50);
    assert_eq!(call.rcv_name, REPLY_PORT);
    assert_eq!(call.send_size, 28);
    assert_eq!(call.rcv_size as usize, 4096 + MAX_TRAILER_SIZE);

    let sent = Message::deserialize(&call.sent).unwrap();
    assert_eq!(sent.header().msgh_remote_port, SERVICE_PORT);
    assert_eq!(sent.header().msgh_bits.remote_type(), Some(MsgTypeName::CopySend));
    assert_eq!(sent.header().msgh_local_port, REPLY_PORT);
    assert_eq!(sent.header().msgh_bits.local_type(), Some(MsgTypeName::MakeSendOnce));
}

#[test]
fn test_rpc_buffer_fits_large_request() {
    let transport = StubTransport::new().reply(Reply::message(&sample_message()));
    let request = Message::new(MachMsgHeader::new(1)).with_payload(vec![7u8; 5000]);
    let options = MachMsgOptions::rpc()
        .with_remote_port(SERVICE_PORT)
        .with_local_port(REPLY_PORT);
    let _: Message<'static> = mach_msg::send_receive(&transport, &request, options).unwrap();

    let call = transport.last_call();
    assert_eq!(call.send_size, 5024);
    assert_eq!(call.rcv_size, 5024);
    assert_eq!(call.buffer_len, 5024);
}

#[test]
fn test_rpc_failure() {
    let transport = StubTransport::new().reply(Reply::Code(MACH_RCV_TIMED_OUT));
    let client = Client::new(SERVICE_PORT, &transport);
    let err = client
        .request::<Message<'static>>(&sample_message(), REPLY_PORT, Some(Duration::from_secs(1)))
        .unwrap_err();
    assert!(err.is_timeout());
}

// ════════════════════════════════════════════════════════════
// Server
// ════════════════════════════════════════════════════════════

#[test]
fn test_server_reply() {
    let transport = StubTransport::new();
    let server = Server::new(SERVICE_PORT, &transport);

    // As received: the sender's reply port arrives in the remote field
    let request = MachMsgHeader::new(100).with_remote_port(REPLY_PORT, MsgTypeName::MoveSendOnce);
    let response = Message::new(MachMsgHeader::new(200)).with_payload(&b"ok"[..]);
    server.reply(&request, &response, None).unwrap();

    let call = transport.last_call();
    assert_eq!(call.option, MACH_SEND_MSG);
    let sent = Message::deserialize(&call.sent).unwrap();
    assert_eq!(sent.id(), 200);
    assert_eq!(sent.header().msgh_remote_port, REPLY_PORT);
    assert_eq!(sent.header().msgh_bits.remote_type(), Some(MsgTypeName::MoveSendOnce));
}

#[test]
fn test_server_peek() {
    let mut audit = AuditToken::default();
    audit.val[1] = 501;
    audit.val[5] = 8080;
    let trailer = Trailer::new(Some(3), None, Some(audit));
    let head = PeekHead {
        seqno: 3,
        size: 40,
        id: 77,
        trailer_len: 0,
    };
    let transport = StubTransport::new().peek_reply(head, trailer.as_bytes().to_vec());
    let server = Server::new(SERVICE_PORT, &transport);

    let peeked = server.peek(3).unwrap();
    assert_eq!(peeked.seqno, 3);
    assert_eq!(peeked.size, 40);
    assert_eq!(peeked.id, 77);
    let token = peeked.trailer.unwrap().audit_token().unwrap();
    assert_eq!(token.pid(), 8080);
    assert_eq!(token.euid(), 501);

    assert_eq!(
        transport.peek_calls(),
        vec![(SERVICE_PORT, TrailerRequest::Audit.option_bits(), 3)]
    );
    // Nothing was dequeued
    assert!(transport.calls().is_empty());
}

#[test]
fn test_peek_bad_trailer() {
    let mut bytes = Trailer::new(Some(1), None, None).as_bytes().to_vec();
    bytes[4..8].copy_from_slice(&4u32.to_ne_bytes());
    let transport = StubTransport::new().peek_reply(PeekHead::default(), bytes);
    let queue = Queue::new(SERVICE_PORT, &transport);
    assert_eq!(queue.peek(0), Err(IpcError::InvalidTrailer { size: 4 }));
}

#[test]
fn test_queue_split() {
    let transport = StubTransport::new()
        .reply(Reply::Code(MACH_MSG_SUCCESS))
        .reply(Reply::message(&sample_message()));
    let client = Queue::new(SERVICE_PORT, &transport).into_client();
    let server = Queue::new(SERVICE_PORT, &transport).into_server();

    client.enqueue(&sample_message(), 0, None).unwrap();
    let received: Message<'static> = server.dequeue(0, None).unwrap();
    assert_eq!(received.id(), 42);
    assert_eq!(transport.calls().len(), 2);
}

#[test]
fn test_sent_bytes_parse_with_cursor() {
    let transport = StubTransport::new();
    mach_msg::send(
        &transport,
        &sample_message(),
        MachMsgOptions::send().with_remote_port(SERVICE_PORT),
    )
    .unwrap();
    let call = transport.last_call();
    let header = MachMsgHeader::read(&mut ReadCursor::new(&call.sent)).unwrap();
    assert_eq!(header.msgh_size, 28);
    assert_eq!(header.msgh_remote_port, SERVICE_PORT);
}
