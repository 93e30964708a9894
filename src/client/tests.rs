//! Unit tests for the client handle and builder.

use std::{
    env,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use rstest::rstest;
use serial_test::serial;

use super::*;
use crate::connection::{DEFAULT_MAX_RETRIES, SharedTags};

fn counting_request(payload: &'static [u8], calls: &Arc<AtomicUsize>) -> Request {
    let sent = Arc::clone(calls);
    let replied = Arc::clone(calls);
    Request::new(payload)
        .on_sent(move |_| {
            sent.fetch_add(1, Ordering::SeqCst);
        })
        .on_reply(move |_: Result<&[u8], ClientError>| {
            replied.fetch_add(1, Ordering::SeqCst);
        })
}

#[test]
fn enqueue_assigns_tags_only_when_a_reply_is_expected() {
    let (client, _connection) = ClientBuilder::new().build();

    let fire_and_forget = client.enqueue(Request::new("PUT k=v")).expect("queued");
    assert_eq!(fire_and_forget, Tag::NONE);

    let calls = Arc::new(AtomicUsize::new(0));
    let first = client
        .enqueue(counting_request(b"GET a", &calls))
        .expect("queued");
    let second = client
        .enqueue(counting_request(b"GET b", &calls))
        .expect("queued");
    assert_eq!(first, Tag::new(1));
    assert_eq!(second, Tag::new(2));
    assert_eq!(client.state(), ConnectionState::Unconnected);
}

#[test]
fn oversized_payload_is_rejected_without_callbacks() {
    let (client, _connection) = ClientBuilder::new().max_payload(4).build();
    let calls = Arc::new(AtomicUsize::new(0));

    let err = client
        .enqueue(counting_request(b"too long", &calls))
        .expect_err("payload exceeds limit");
    assert!(matches!(
        err,
        ClientError::Framing(FramingError::OversizedPayload { size: 8, max: 4 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn exhausted_tag_space_is_reported() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::with_tags(SharedTags::with_limit(1)));
    let client = Client::new(tx, shared, ProcessId::new(3), 1024);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(
        client
            .enqueue(counting_request(b"GET a", &calls))
            .expect("first tag"),
        Tag::new(1)
    );
    assert!(matches!(
        client.enqueue(counting_request(b"GET b", &calls)),
        Err(ClientError::TagsExhausted)
    ));
    assert_eq!(client.enqueue(Request::new("PUT")).expect("untagged"), Tag::NONE);
}

#[test]
fn enqueue_after_reactor_dropped_releases_the_tag() {
    let (client, connection) = ClientBuilder::new().build();
    drop(connection);
    let calls = Arc::new(AtomicUsize::new(0));

    assert!(matches!(
        client.enqueue(counting_request(b"GET", &calls)),
        Err(ClientError::Closed)
    ));
    assert_eq!(client.shared.tags.with(|space| space.outstanding()), 0);
}

#[test]
fn shutting_down_the_runtime_cancels_pending_callbacks() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let client = ClientBuilder::new().spawn_on(rt.handle());
    let (tx, rx) = std::sync::mpsc::channel();
    let sent = tx.clone();
    let tag = client
        .enqueue(
            Request::new("GET k")
                .on_sent(move |res| {
                    let _ = sent.send(("sent", res.err()));
                })
                .on_reply(move |res: Result<&[u8], ClientError>| {
                    let _ = tx.send(("reply", res.err()));
                }),
        )
        .expect("queued");
    assert_eq!(tag, Tag::new(1));

    drop(rt);

    let mut seen: Vec<_> = rx.try_iter().collect();
    seen.sort_by_key(|(which, _)| *which);
    assert!(
        matches!(
            seen.as_slice(),
            [
                ("reply", Some(ClientError::Cancelled)),
                ("sent", Some(ClientError::Cancelled))
            ]
        ),
        "{seen:?}"
    );
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.shared.tags.with(|space| space.outstanding()), 0);
    assert!(matches!(client.enqueue(Request::new("x")), Err(ClientError::Closed)));
}

#[tokio::test]
async fn finalize_is_idempotent_and_closes_the_client() {
    let client = ClientBuilder::new().spawn();
    client.finalize().await.expect("first finalize");
    client.finalize().await.expect("second finalize is a no-op");

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(client.enqueue(Request::new("x")), Err(ClientError::Closed)));
    assert!(matches!(client.connect().await, Err(ClientError::Closed)));
    assert!(matches!(client.stage(Scope::Local, "a"), Err(ClientError::Closed)));
    assert!(matches!(
        client.register_error_handler(|_| {}),
        Err(ClientError::Closed)
    ));
}

#[tokio::test]
async fn staged_data_is_taken_per_scope() {
    let client = ClientBuilder::new().spawn();
    client.stage(Scope::Global, "a=1;").expect("staged");
    client.stage(Scope::Global, "b=2;").expect("staged");
    client.stage(Scope::Remote, "r").expect("staged");

    let global = client.take_staged(Scope::Global).await.expect("taken");
    assert_eq!(global.as_ref(), b"a=1;b=2;");
    assert!(client.take_staged(Scope::Global).await.expect("taken").is_empty());
    assert_eq!(client.take_staged(Scope::Remote).await.expect("taken").as_ref(), b"r");
}

#[tokio::test]
async fn blocking_calls_are_refused_inside_a_runtime() {
    let client = ClientBuilder::new().spawn();
    assert!(matches!(client.connect_blocking(), Err(ClientError::BlockingInRuntime)));
    assert!(matches!(client.call_blocking("GET"), Err(ClientError::BlockingInRuntime)));
    assert!(matches!(client.finalize_blocking(), Err(ClientError::BlockingInRuntime)));
    assert!(client.enqueue(Request::new("still open")).is_ok());
}

#[rstest]
#[case(Some("12"), Some("5"), Ok((12, 5)))]
#[case(None, None, Ok((0, DEFAULT_MAX_RETRIES)))]
#[case(Some("twelve"), None, Err(ENV_ID))]
#[case(Some("1"), Some("-1"), Err(ENV_MAX_RETRIES))]
#[serial]
fn builder_reads_identity_and_retries_from_environment(
    #[case] id: Option<&str>,
    #[case] retries: Option<&str>,
    #[case] expected: Result<(u64, u32), &str>,
) {
    // SAFETY: serialised with every other test touching the environment.
    unsafe {
        for (name, value) in [(ENV_ID, id), (ENV_MAX_RETRIES, retries)] {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
    let builder = ClientBuilder::from_env();
    unsafe {
        env::remove_var(ENV_ID);
        env::remove_var(ENV_MAX_RETRIES);
    }

    match (builder, expected) {
        (Ok(builder), Ok((id, retries))) => {
            assert!(format!("{builder:?}").contains(&format!("max_retries: {retries}")));
            let (client, _connection) = builder.build();
            assert_eq!(client.identity(), ProcessId::new(id));
        }
        (Err(ClientError::InvalidConfiguration { reason }), Err(name)) => {
            assert!(reason.starts_with(name), "{reason}");
        }
        (other, expected) => panic!("unexpected outcome {other:?} for {expected:?}"),
    }
}
