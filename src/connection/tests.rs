//! Reactor tests driving `Connection` handlers directly over a socket pair.

use std::sync::{Arc, Mutex};

use rstest::rstest;
use tokio::net::UnixStream;
use tracing_test::traced_test;

use super::*;
use crate::{
    ClientBuilder,
    Request,
    frame::{HEADER_LEN, MessageKind},
};

type Seen = Arc<Mutex<Vec<String>>>;

struct Harness {
    client: crate::Client,
    connection: Connection,
    _peer: UnixStream,
    errors: Seen,
}

impl Harness {
    fn new(state: ConnectionState) -> Self {
        let errors = Seen::default();
        let sink = Arc::clone(&errors);
        let (client, mut connection) = ClientBuilder::new()
            .identity(ProcessId::new(2))
            .error_handler(move |err| sink.lock().expect("errors lock").push(err.to_string()))
            .build();
        let (local, peer) = UnixStream::pair().expect("socket pair");
        connection.stream = Some(local);
        connection.set_state(state);
        Self {
            client,
            connection,
            _peer: peer,
            errors,
        }
    }

    /// Move every queued handle operation into the reactor.
    fn pump(&mut self) {
        while let Ok(op) = self.connection.ops.try_recv() {
            let _ = self.connection.handle_op(op);
        }
    }

    fn errors(&self) -> Vec<String> { self.errors.lock().expect("errors lock").clone() }
}

fn record_reply(seen: &Seen, label: &'static str) -> Request {
    let seen = Arc::clone(seen);
    Request::new(label).on_reply(move |reply: Result<&[u8], ClientError>| {
        let entry = match reply {
            Ok(payload) => format!("{label}:{}", String::from_utf8_lossy(payload)),
            Err(err) => format!("{label}!{err}"),
        };
        seen.lock().expect("seen lock").push(entry);
    })
}

fn seen(log: &Seen) -> Vec<String> { log.lock().expect("seen lock").clone() }

#[tokio::test]
async fn reply_is_dispatched_only_after_the_last_chunk() {
    let mut h = Harness::new(ConnectionState::Connected);
    let log = Seen::default();
    let tag = h.client.enqueue(record_reply(&log, "get")).expect("queued");
    h.pump();

    let wire = Frame::user(ProcessId::new(0), tag, &b"0123456789"[..]).to_bytes();
    let (header, payload) = wire.split_at(HEADER_LEN);
    h.connection.process_inbound(header);
    for chunk in [&payload[..3], &payload[3..4]] {
        h.connection.process_inbound(chunk);
        assert!(seen(&log).is_empty());
    }
    h.connection.process_inbound(&payload[4..]);

    assert_eq!(seen(&log), ["get:0123456789"]);
    assert!(h.connection.registry.is_empty());
    assert!(h.errors().is_empty());
}

#[tokio::test]
async fn identification_while_connected_fails_the_connection_once() {
    let mut h = Harness::new(ConnectionState::Connected);
    let log = Seen::default();
    h.client.enqueue(record_reply(&log, "a")).expect("queued");
    h.client.enqueue(record_reply(&log, "b")).expect("queued");
    h.pump();

    let ident = Frame::identification(ProcessId::new(0), &b"x"[..]).to_bytes();
    h.connection.process_inbound(&ident);
    h.connection.process_inbound(&ident);

    assert_eq!(h.connection.state(), ConnectionState::Failed);
    assert!(h.connection.stream.is_none());
    assert_eq!(h.errors().len(), 1);
    let replies = seen(&log);
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.contains("communication failure")));
    assert_eq!(h.connection.shared.tags.with(|space| space.outstanding()), 0);
}

#[tokio::test]
async fn unknown_kind_reports_framing_error_to_handler() {
    let mut h = Harness::new(ConnectionState::Connected);
    let mut wire = Frame::user(ProcessId::new(0), Tag::NONE, &b""[..])
        .to_bytes()
        .to_vec();
    wire[8] = 9;
    h.connection.process_inbound(&wire);

    assert_eq!(h.connection.state(), ConnectionState::Failed);
    assert_eq!(h.errors(), ["framing error: unknown message kind: 9"]);
}

#[rstest]
#[case(ConnectionState::Closed, "operation cancelled")]
#[case(ConnectionState::Failed, "communication failure")]
#[tokio::test]
async fn sends_in_terminal_states_are_refused(
    #[case] state: ConnectionState,
    #[case] expected: &str,
) {
    let mut h = Harness::new(state);
    let log = Seen::default();
    let sent = Arc::clone(&log);
    let request = record_reply(&log, "req").on_sent(move |res| {
        let entry = res.map_or_else(|err| format!("sent!{err}"), |()| "sent".to_owned());
        sent.lock().expect("seen lock").push(entry);
    });
    h.client.enqueue(request).expect("handle still accepts work");
    h.pump();

    let entries = seen(&log);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.contains(expected)), "{entries:?}");
    assert!(h.connection.registry.is_empty());
    assert_eq!(h.connection.send.len(), 0);
    assert!(h.errors().is_empty());
}

#[tokio::test]
async fn disconnect_cancels_outstanding_work_without_error_handler() {
    let mut h = Harness::new(ConnectionState::Connected);
    let log = Seen::default();
    h.client.enqueue(record_reply(&log, "a")).expect("queued");
    let done = h.client.disconnect();
    h.pump();

    done.await.expect("disconnected");
    assert_eq!(h.connection.state(), ConnectionState::Closed);
    assert_eq!(seen(&log), ["a!operation cancelled"]);
    assert!(h.errors().is_empty());
    assert!(h.connection.state().can_connect());
}

#[tokio::test]
async fn user_frame_during_handshake_schedules_a_retry() {
    let mut h = Harness::new(ConnectionState::HandshakeSent);
    let wire = Frame::user(ProcessId::new(0), Tag::new(1), &b"early"[..]).to_bytes();
    h.connection.process_inbound(&wire);

    assert_eq!(h.connection.state(), ConnectionState::Connecting);
    assert!(h.connection.stream.is_none());
    assert!(h.connection.retry_timer.is_some());
    assert_eq!(h.connection.retry.retries(), 1);
    assert!(h.errors().is_empty());
}

#[tokio::test]
async fn unsolicited_frames_reach_the_inbound_handler() {
    let mut h = Harness::new(ConnectionState::Connected);
    let log = Seen::default();
    let sink = Arc::clone(&log);
    h.client
        .register_inbound_handler(move |tag, payload| {
            sink.lock()
                .expect("seen lock")
                .push(format!("{tag}:{}", String::from_utf8_lossy(payload)));
        })
        .expect("registered");
    h.pump();

    for (tag, body) in [(0, "event"), (42, "stray")] {
        let wire = Frame::user(ProcessId::new(0), Tag::new(tag), body.as_bytes().to_vec());
        assert_eq!(wire.kind(), MessageKind::User);
        h.connection.process_inbound(&wire.to_bytes());
    }

    assert_eq!(seen(&log), ["0:event", "42:stray"]);
}

#[tokio::test]
async fn connect_is_refused_while_connected() {
    let mut h = Harness::new(ConnectionState::Connected);
    let done = h.client.connect();
    h.pump();

    assert!(matches!(
        done.await,
        Err(ClientError::InvalidState {
            operation: "connect",
            state: ConnectionState::Connected,
        })
    ));
    assert_eq!(h.connection.state(), ConnectionState::Connected);
}

#[tokio::test]
#[traced_test]
async fn state_transitions_are_traced() {
    let mut h = Harness::new(ConnectionState::Connected);
    let done = h.client.disconnect();
    h.pump();
    done.await.expect("disconnected");

    assert!(logs_contain("connection state changed"));
    assert!(logs_contain("to=closed"));
}
