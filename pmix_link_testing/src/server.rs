//! Scripted management server for end-to-end client tests.

use std::{
    env,
    io,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use pmix_link::{
    ServerAddress,
    frame::{Frame, FrameCodec, MessageKind, ProcessId, Tag},
    handshake::{Identification, Version},
};
use tokio::{
    io::AsyncWriteExt,
    net::{UnixListener, UnixStream},
};
use tokio_util::codec::Framed;

/// Identity the mock server presents unless told otherwise.
pub const SERVER_ID: ProcessId = ProcessId::new(1000);

/// A socket path no other test in this process will use.
#[must_use]
pub fn unique_socket_path() -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("pmix-link-{}-{n}.sock", process::id()))
}

/// Listening end of a fake management server.
///
/// The socket file is removed when the server is dropped.
#[derive(Debug)]
pub struct MockServer {
    listener: UnixListener,
    path: PathBuf,
    identity: ProcessId,
    identification: Identification,
}

impl MockServer {
    /// Listen on a fresh socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn bind() -> io::Result<Self> { Self::bind_at(unique_socket_path()) }

    /// Listen on `path`, replacing any stale socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn bind_at(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener,
            path,
            identity: SERVER_ID,
            identification: Identification {
                version: pmix_link::handshake::PROTOCOL_VERSION,
                agent: "mock-server".into(),
            },
        })
    }

    /// Acknowledge handshakes as `identity`.
    #[must_use]
    pub fn with_identity(mut self, identity: ProcessId) -> Self {
        self.identity = identity;
        self
    }

    /// Advertise `version` in handshake acknowledgements.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.identification.version = version;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    #[must_use]
    pub fn identity(&self) -> ProcessId { self.identity }

    /// Address naming this server's socket and identity.
    #[must_use]
    pub fn address(&self) -> ServerAddress { ServerAddress::new(&self.path).with_server(self.identity) }

    /// URI in the `<server-id>:<socket-path>` form clients read from the
    /// environment.
    #[must_use]
    pub fn uri(&self) -> String { self.address().to_string() }

    /// Accept a client without performing the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails.
    pub async fn accept_raw(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Accept a client, read its identification and acknowledge it.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnects or its first frame is not
    /// an identification.
    pub async fn accept(&self) -> io::Result<ServerConnection> {
        let mut conn = self.accept_unacknowledged().await?;
        let ack = self
            .identification
            .encode()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        conn.framed
            .send(Frame::identification(self.identity, ack))
            .await?;
        Ok(conn)
    }

    /// Accept a client and read its identification, sending nothing back.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnects or its first frame is not
    /// an identification.
    pub async fn accept_unacknowledged(&self) -> io::Result<ServerConnection> {
        let stream = self.accept_raw().await?;
        let mut framed = Framed::new(stream, FrameCodec::default());
        let frame = next_frame(&mut framed).await?;
        if frame.kind() != MessageKind::Identification || frame.tag() != Tag::NONE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected identification, got {:?}", frame.header()),
            ));
        }
        let peer = Identification::decode(frame.payload())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(ServerConnection {
            framed,
            identity: self.identity,
            client: frame.sender(),
            peer,
        })
    }
}

impl Drop for MockServer {
    fn drop(&mut self) { let _ = std::fs::remove_file(&self.path); }
}

async fn next_frame(framed: &mut Framed<UnixStream, FrameCodec>) -> io::Result<Frame> {
    framed.next().await.unwrap_or_else(|| {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "client closed the connection",
        ))
    })
}

/// Server side of an accepted client connection.
#[derive(Debug)]
pub struct ServerConnection {
    framed: Framed<UnixStream, FrameCodec>,
    identity: ProcessId,
    client: ProcessId,
    peer: Identification,
}

impl ServerConnection {
    /// Identity the client put in its identification frame header.
    #[must_use]
    pub fn client(&self) -> ProcessId { self.client }

    /// Identification payload the client sent.
    #[must_use]
    pub fn peer(&self) -> &Identification { &self.peer }

    /// Read the next frame from the client.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` once the client has disconnected.
    pub async fn recv(&mut self) -> io::Result<Frame> { next_frame(&mut self.framed).await }

    /// Answer `request` under its tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn reply(&mut self, request: &Frame, payload: impl Into<Bytes>) -> io::Result<()> {
        self.notify(request.tag(), payload).await
    }

    /// Send a user frame under an arbitrary tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn notify(&mut self, tag: Tag, payload: impl Into<Bytes>) -> io::Result<()> {
        self.framed
            .send(Frame::user(self.identity, tag, payload))
            .await
    }

    /// Write raw bytes, bypassing the codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    /// Wait until the client closes its end.
    ///
    /// Frames arriving first are returned in order.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails for a reason other than EOF.
    pub async fn drain_until_closed(&mut self) -> io::Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.framed.next().await {
            frames.push(frame?);
        }
        Ok(frames)
    }
}
