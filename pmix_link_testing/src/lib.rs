//! Test doubles for exercising [`pmix_link`] clients.
//!
//! [`MockServer`] listens on a private Unix socket and speaks the server
//! side of the identification handshake, so tests can drive a real client
//! reactor end to end.
//!
//! ```no_run
//! use pmix_link::ClientBuilder;
//! use pmix_link_testing::MockServer;
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockServer::bind()?;
//! let client = ClientBuilder::new().address(server.address()).spawn();
//! let connect = client.connect();
//! let mut conn = server.accept().await?;
//! connect.await.expect("connected");
//! let request = conn.recv().await?;
//! conn.reply(&request, "v=1").await?;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod server;

pub use logging::{LoggerHandle, logger};
pub use server::{MockServer, ServerConnection, unique_socket_path};
