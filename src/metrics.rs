//! Metric helpers for `pmix_link`.
//!
//! This module defines metric names and helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge reporting whether the client is connected (0 or 1).
pub const CONNECTED: &str = "pmix_link_connected";
/// Name of the counter tracking frames written or read.
pub const FRAMES_PROCESSED: &str = "pmix_link_frames_total";
/// Name of the counter tracking connect attempts, retries included.
pub const CONNECT_ATTEMPTS: &str = "pmix_link_connect_attempts_total";
/// Name of the counter tracking connection failures.
pub const CONNECTION_FAILURES: &str = "pmix_link_connection_failures_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames read from the server.
    Inbound,
    /// Frames written to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connect attempt.
pub fn inc_connect_attempts() {
    #[cfg(feature = "metrics")]
    counter!(CONNECT_ATTEMPTS).increment(1);
}

/// Record a connection failure.
pub fn inc_connection_failures() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_FAILURES).increment(1);
}

/// Publish whether the client is connected.
pub fn set_connected(connected: bool) {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = connected;
}
