//! Server rendezvous addresses.
//!
//! A management server advertises itself through the `PMIX_SERVER_URI`
//! environment variable as `<server-id>:<socket-path>`.

use std::{
    env,
    fmt,
    path::{Path, PathBuf},
};

use crate::{ClientError, frame::ProcessId};

/// Environment variable holding the server URI.
pub const SERVER_URI_ENV: &str = "PMIX_SERVER_URI";

/// Longest socket path accepted by `sockaddr_un`, excluding the NUL.
pub const MAX_SOCKET_PATH_LEN: usize = 107;

/// Location and optional identity of the management server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddress {
    server: Option<ProcessId>,
    path: PathBuf,
}

impl ServerAddress {
    /// Address a server by socket path, accepting any server identity.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            server: None,
            path: path.into(),
        }
    }

    /// Require the server to identify as `server` during the handshake.
    #[must_use]
    pub fn with_server(mut self, server: ProcessId) -> Self {
        self.server = Some(server);
        self
    }

    /// Parse a `<server-id>:<socket-path>` URI.
    ///
    /// # Examples
    ///
    /// ```
    /// use pmix_link::{ServerAddress, frame::ProcessId};
    ///
    /// let addr = ServerAddress::from_uri("17:/tmp/pmix.sock").expect("valid uri");
    /// assert_eq!(addr.server(), Some(ProcessId::new(17)));
    /// assert_eq!(addr.path().to_str(), Some("/tmp/pmix.sock"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AddressResolution`] if the URI lacks a
    /// separator, the identity is not a decimal `u64`, or the path is empty.
    pub fn from_uri(uri: &str) -> Result<Self, ClientError> {
        let (id, path) = uri
            .split_once(':')
            .ok_or_else(|| resolution(format!("server URI {uri:?} lacks ':' separator")))?;
        let id: u64 = id
            .trim()
            .parse()
            .map_err(|err| resolution(format!("invalid server id {id:?}: {err}")))?;
        if path.is_empty() {
            return Err(resolution(format!("server URI {uri:?} has no socket path")));
        }
        Ok(Self::new(path).with_server(ProcessId::new(id)))
    }

    /// Read the address from [`SERVER_URI_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AddressResolution`] if the variable is unset or
    /// malformed.
    pub fn from_env() -> Result<Self, ClientError> {
        let uri = env::var(SERVER_URI_ENV)
            .map_err(|err| resolution(format!("{SERVER_URI_ENV}: {err}")))?;
        Self::from_uri(&uri)
    }

    #[must_use]
    pub fn server(&self) -> Option<ProcessId> { self.server }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.server {
            Some(id) => write!(f, "{id}:{}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

fn resolution(reason: String) -> ClientError { ClientError::AddressResolution { reason } }

/// Turns the configured address into the one to connect to.
///
/// Called on every connect attempt, retries included, so an implementation
/// may pick up a server that moved between attempts.
pub trait AddressResolver: Send + Sync {
    /// Resolve `configured`, or discover an address when none was given.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AddressResolution`] when no usable address
    /// exists. This error is not retried.
    fn resolve(&self, configured: Option<&ServerAddress>) -> Result<ServerAddress, ClientError>;
}

/// Default resolver: the configured address, else [`ServerAddress::from_env`].
///
/// The socket path must be non-empty and fit in `sockaddr_un`. Whether the
/// socket exists is left to the connect attempt, which is retried.
#[derive(Clone, Copy, Debug, Default)]
pub struct RendezvousResolver;

impl AddressResolver for RendezvousResolver {
    fn resolve(&self, configured: Option<&ServerAddress>) -> Result<ServerAddress, ClientError> {
        let address = match configured {
            Some(address) => address.clone(),
            None => ServerAddress::from_env()?,
        };
        let len = address.path.as_os_str().len();
        if len == 0 {
            return Err(resolution("empty socket path".to_owned()));
        }
        if len > MAX_SOCKET_PATH_LEN {
            return Err(resolution(format!(
                "socket path is {len} bytes, longer than {MAX_SOCKET_PATH_LEN}"
            )));
        }
        Ok(address)
    }
}
