//! Connection loss, protocol violations and shutdown.

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use pmix_link::{
    Client,
    ClientBuilder,
    ClientError,
    ConnectionState,
    FramingError,
    Request,
    frame::{FrameHeader, MessageKind, Tag},
};
use pmix_link_testing::{LoggerHandle, MockServer, ServerConnection, logger, server::SERVER_ID};
use rstest::rstest;
use tokio::sync::mpsc;

type Errors = Arc<Mutex<Vec<ClientError>>>;

async fn connected(builder: ClientBuilder) -> (MockServer, Client, ServerConnection, Errors) {
    let errors = Errors::default();
    let sink = Arc::clone(&errors);
    let server = MockServer::bind().expect("bind mock server");
    let client = builder
        .address(server.address())
        .error_handler(move |err| sink.lock().expect("errors lock").push(err.clone()))
        .spawn();
    let connect = client.connect();
    let conn = server.accept().await.expect("accept client");
    connect.await.expect("connect");
    (server, client, conn, errors)
}

fn error_count(errors: &Errors) -> usize { errors.lock().expect("errors lock").len() }

#[tokio::test]
async fn server_loss_fails_every_outstanding_request_once() {
    let (_server, client, mut conn, errors) = connected(ClientBuilder::new()).await;
    let replies: Vec<_> = ["a", "b", "c"].into_iter().map(|p| client.call(p)).collect();
    for _ in 0..3 {
        conn.recv().await.expect("request");
    }
    drop(conn);

    for reply in replies {
        assert!(matches!(
            reply.await,
            Err(ClientError::CommunicationFailure { .. })
        ));
    }
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(error_count(&errors), 1);

    let late = client.call("after failure").await;
    assert!(matches!(late, Err(ClientError::CommunicationFailure { .. })));
    assert_eq!(error_count(&errors), 1);
}

#[tokio::test]
async fn unknown_kind_from_server_is_a_framing_error() {
    let (_server, client, mut conn, errors) = connected(ClientBuilder::new()).await;
    let pending = client.call("GET k");
    conn.recv().await.expect("request");

    let mut raw = FrameHeader::new(SERVER_ID, MessageKind::User, Tag::NONE, 0).to_bytes().to_vec();
    raw[8] = 7;
    conn.send_raw(&raw).await.expect("raw header");

    assert!(matches!(
        pending.await,
        Err(ClientError::CommunicationFailure { .. })
    ));
    let seen = errors.lock().expect("errors lock").clone();
    assert!(matches!(
        seen.as_slice(),
        [ClientError::Framing(FramingError::UnknownKind { kind: 7 })]
    ));
}

#[tokio::test]
async fn oversized_inbound_frame_tears_the_connection_down() {
    let (_server, client, mut conn, errors) = connected(ClientBuilder::new().max_payload(16)).await;

    let header = FrameHeader::new(SERVER_ID, MessageKind::User, Tag::NONE, 17);
    conn.send_raw(&header.to_bytes()).await.expect("raw header");
    let frames = conn.drain_until_closed().await.expect("client closes");
    assert!(frames.is_empty());

    assert_eq!(client.state(), ConnectionState::Failed);
    let seen = errors.lock().expect("errors lock").clone();
    assert!(matches!(
        seen.as_slice(),
        [ClientError::Framing(FramingError::OversizedPayload { size: 17, max: 16 })]
    ));
}

#[tokio::test]
async fn finalize_cancels_outstanding_work_and_closes_the_client() {
    let (_server, client, mut conn, errors) = connected(ClientBuilder::new()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    for body in ["x", "y"] {
        let tx = tx.clone();
        client
            .enqueue(Request::new(body).on_reply(move |reply| {
                let _ = tx.send(reply.map(<[u8]>::to_vec));
            }))
            .expect("queued");
    }
    conn.recv().await.expect("first request");
    conn.recv().await.expect("second request");

    client.finalize().await.expect("finalize");
    for _ in 0..2 {
        assert!(matches!(rx.recv().await, Some(Err(ClientError::Cancelled))));
    }
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(error_count(&errors), 0);

    client.finalize().await.expect("finalize again");
    assert!(matches!(client.enqueue(Request::new("z")), Err(ClientError::Closed)));
    assert!(matches!(client.call("z").await, Err(ClientError::Closed)));
    assert!(conn.drain_until_closed().await.expect("socket closed").is_empty());
}

#[tokio::test]
async fn dropping_every_handle_stops_the_reactor() {
    let (_server, client, mut conn, errors) = connected(ClientBuilder::new()).await;
    let clone = client.clone();
    drop(client);
    assert_eq!(clone.state(), ConnectionState::Connected);
    drop(clone);

    assert!(conn.drain_until_closed().await.expect("socket closed").is_empty());
    assert_eq!(error_count(&errors), 0);
}

#[rstest]
#[tokio::test]
async fn panicking_callbacks_do_not_stop_the_reactor(mut logger: LoggerHandle) {
    let (_server, client, mut conn, _errors) = connected(ClientBuilder::new()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    client
        .enqueue(Request::new("boom").on_reply(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("callback exploded");
        }))
        .expect("queued");
    let request = conn.recv().await.expect("request");
    conn.reply(&request, "ok").await.expect("reply");

    let follow_up = client.call("still alive");
    let request = conn.recv().await.expect("second request");
    conn.reply(&request, "yes").await.expect("reply");
    assert_eq!(follow_up.await.expect("reply").as_ref(), b"yes");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
    let logged = logger.take_matching("reply callback panicked");
    assert_eq!(logged.len(), 1);
    assert!(logged[0].args().contains("callback exploded"));
}
