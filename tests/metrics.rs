#![cfg(feature = "metrics")]
//! Tests for `pmix_link` metrics.
//!
//! Counters and gauges are captured with
//! `metrics_util::debugging::DebuggingRecorder`.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use pmix_link::{
    ClientBuilder,
    metrics::{CONNECT_ATTEMPTS, CONNECTED, CONNECTION_FAILURES, Direction, FRAMES_PROCESSED},
};
use pmix_link_testing::MockServer;
use rstest::rstest;

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

type Entry = (CompositeKey, Option<metrics::Unit>, Option<metrics::SharedString>, DebugValue);

fn counter(snapshot: &[Entry], name: &str, direction: Option<&str>) -> u64 {
    snapshot
        .iter()
        .filter(|(k, _, _, _)| k.key().name() == name)
        .filter(|(k, _, _, _)| {
            direction.is_none_or(|dir| {
                k.key()
                    .labels()
                    .any(|l| l.key() == "direction" && l.value() == dir)
            })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_counter_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        pmix_link::metrics::inc_frames(direction);
        pmix_link::metrics::inc_frames(direction);
    });
    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter(&snapshot, FRAMES_PROCESSED, Some(label)), 2);
}

#[test]
fn session_updates_connection_metrics() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let server = MockServer::bind().expect("bind mock server");
            let (lost_tx, mut lost_rx) = tokio::sync::mpsc::unbounded_channel();
            let client = ClientBuilder::new()
                .address(server.address())
                .error_handler(move |_| {
                    let _ = lost_tx.send(());
                })
                .spawn();
            let connect = client.connect();
            let mut conn = server.accept().await.expect("accept");
            connect.await.expect("connect");

            let reply = client.call("ping");
            let request = conn.recv().await.expect("request");
            conn.reply(&request, "pong").await.expect("reply");
            reply.await.expect("reply");

            drop(conn);
            lost_rx.recv().await.expect("connection loss reported");
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter(&snapshot, CONNECT_ATTEMPTS, None), 1);
    assert_eq!(counter(&snapshot, FRAMES_PROCESSED, Some("outbound")), 1);
    assert_eq!(counter(&snapshot, FRAMES_PROCESSED, Some("inbound")), 2);
    assert_eq!(counter(&snapshot, CONNECTION_FAILURES, None), 1);

    let connected = snapshot
        .iter()
        .find(|(k, _, _, _)| k.key().name() == CONNECTED)
        .map(|(_, _, _, v)| v);
    assert!(matches!(connected, Some(DebugValue::Gauge(g)) if g.into_inner().abs() < f64::EPSILON));
}
