//! Client-side transport for process-management servers.
//!
//! A process joins a job by connecting to its local management server over
//! a Unix domain socket. This crate owns that connection: it resolves the
//! server address, performs the identification handshake with bounded
//! retries, frames outbound requests, reassembles inbound frames across
//! partial reads, and routes replies to the callback registered for their
//! tag.
//!
//! ```no_run
//! use pmix_link::{ClientBuilder, ClientError};
//!
//! # async fn demo() -> Result<(), ClientError> {
//! let client = ClientBuilder::from_env()?.spawn();
//! client.connect().await?;
//! let reply = client.call("GET k").await?;
//! println!("{}", String::from_utf8_lossy(&reply));
//! client.finalize().await
//! # }
//! ```

pub mod address;
pub mod client;
pub mod connection;
mod error;
pub mod frame;
pub mod handshake;
pub mod hooks;
pub mod metrics;
pub mod panic;
pub mod payload;
mod wait;

pub use address::{AddressResolver, RendezvousResolver, ServerAddress};
pub use client::{Client, ClientBuilder, ProgressThread, Request};
pub use connection::{BackoffConfig, Connection, ConnectionState, Scope};
pub use error::ClientError;
pub use frame::{Frame, FramingError, ProcessId, Tag};
pub use panic::PanicMessage;
pub use wait::{Completion, Signal, WaitCell};
