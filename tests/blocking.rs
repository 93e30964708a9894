//! Synchronous callers driving a client through its progress thread.

use std::{io, sync::mpsc, thread, time::Duration};

use pmix_link::{BackoffConfig, ClientBuilder, ClientError, ConnectionState, ServerAddress};
use pmix_link_testing::{MockServer, unique_socket_path};
use tokio::runtime;

/// Run a mock server on its own thread and runtime, answering one request.
fn serve_one(reply: &'static str) -> (ServerAddress, thread::JoinHandle<io::Result<usize>>) {
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || -> io::Result<usize> {
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        rt.block_on(async move {
            let server = MockServer::bind()?;
            let _ = ready_tx.send(server.address());
            let mut conn = server.accept().await?;
            let request = conn.recv().await?;
            conn.reply(&request, reply).await?;
            Ok::<_, io::Error>(conn.drain_until_closed().await?.len())
        })
    });
    let address = ready_rx.recv().expect("server address");
    (address, handle)
}

#[test]
fn blocking_round_trip_through_progress_thread() {
    let (address, server) = serve_one("pong");
    let (client, progress) = ClientBuilder::new()
        .address(address)
        .spawn_progress_thread()
        .expect("progress thread");

    client.connect_blocking().expect("connect");
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.call_blocking("ping").expect("reply").as_ref(), b"pong");

    client.finalize_blocking().expect("finalize");
    client.finalize_blocking().expect("finalize is idempotent");
    progress.join().expect("progress thread exits");
    assert_eq!(server.join().expect("server thread").expect("server io"), 0);
}

#[test]
fn blocking_connect_reports_exhausted_retries() {
    let (client, progress) = ClientBuilder::new()
        .address(ServerAddress::new(unique_socket_path()))
        .backoff(BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        })
        .max_retries(1)
        .spawn_progress_thread()
        .expect("progress thread");

    assert!(matches!(
        client.connect_blocking(),
        Err(ClientError::ExhaustedRetries { attempts: 2 })
    ));
    assert!(matches!(
        client.call_blocking("ping"),
        Err(ClientError::CommunicationFailure { .. })
    ));

    drop(client);
    progress.join().expect("progress thread exits once handles drop");
}
