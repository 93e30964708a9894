//! Inbound path: socket reads, frame assembly and routing.

use std::io;

use super::{Connection, ConnectionState};
use crate::{
    ClientError,
    address::ServerAddress,
    frame::{Frame, FrameReader, MessageKind},
    handshake,
    metrics::{self, Direction},
    panic::contain,
};

const READ_CHUNK: usize = 64 * 1024;

/// The in-flight receive frame and the scratch buffer reads land in.
pub(crate) struct ReceiveDispatcher {
    pub(crate) reader: FrameReader,
    buf: Vec<u8>,
}

impl ReceiveDispatcher {
    pub(crate) fn new(max_payload: usize) -> Self {
        Self {
            reader: FrameReader::new(max_payload),
            buf: vec![0; READ_CHUNK],
        }
    }
}

impl Connection {
    /// Read once from the socket and route every frame that completes.
    pub(super) fn read_socket(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        let mut buf = std::mem::take(&mut self.recv.buf);
        match stream.try_read(&mut buf) {
            Ok(0) => {
                let partial = self.recv.reader.bytes_received();
                self.on_transport_error(format!(
                    "server closed the connection ({partial} bytes of a frame pending)"
                ));
            }
            Ok(n) => self.process_inbound(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => self.on_transport_error(format!("read failed: {e}")),
        }
        self.recv.buf = buf;
    }

    pub(super) fn process_inbound(&mut self, mut chunk: &[u8]) {
        while !chunk.is_empty() && self.stream.is_some() {
            match self.recv.reader.next_frame(&mut chunk) {
                Ok(Some(frame)) => self.route(frame),
                Ok(None) => {}
                Err(err) => {
                    let err = ClientError::Framing(err);
                    if self.state() == ConnectionState::HandshakeSent {
                        self.connect_attempt_failed(ClientError::handshake(err.to_string()));
                    } else {
                        self.fail(err);
                    }
                }
            }
        }
    }

    fn route(&mut self, frame: Frame) {
        metrics::inc_frames(Direction::Inbound);
        match (frame.kind(), self.state()) {
            (MessageKind::Identification, ConnectionState::HandshakeSent) => self.on_ack(&frame),
            (MessageKind::Identification, _) => {
                self.fail(ClientError::communication("unexpected identification frame"));
            }
            (MessageKind::User, ConnectionState::Connected) => self.dispatch(&frame),
            (MessageKind::User, _) => {
                self.connect_attempt_failed(ClientError::handshake(
                    "user frame received before identification",
                ));
            }
        }
    }

    fn on_ack(&mut self, frame: &Frame) {
        let server = self.resolved.as_ref().and_then(ServerAddress::server);
        match handshake::check_ack(&self.identification, frame.sender(), server, frame.payload()) {
            Ok(peer) => {
                tracing::debug!(
                    server = %frame.sender(),
                    agent = %peer.agent,
                    "identification acknowledged"
                );
                self.server = Some(frame.sender());
                self.peer = Some(peer);
                self.maybe_established();
            }
            Err(err) => self.connect_attempt_failed(err),
        }
    }

    fn dispatch(&mut self, frame: &Frame) {
        let tag = frame.tag();
        let payload = frame.payload();
        tracing::debug!(tag = %tag, len = payload.len(), "frame received");
        if tag.expects_reply() && self.registry.complete(tag, payload) {
            return;
        }
        match &self.inbound_handler {
            Some(handler) => {
                contain("inbound handler", || handler(tag, payload));
            }
            None => tracing::debug!(tag = %tag, "dropping unsolicited frame"),
        }
    }
}
