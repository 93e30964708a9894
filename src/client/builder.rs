//! Builder for configuring a client and spawning its reactor.

use std::{env, fmt, io, sync::Arc, thread};

use tokio::{runtime, sync::mpsc};

use super::Client;
use crate::{
    ClientError,
    address::{AddressResolver, RendezvousResolver, ServerAddress},
    connection::{BackoffConfig, Connection, ConnectionConfig, DEFAULT_MAX_RETRIES, Shared},
    frame::{DEFAULT_MAX_PAYLOAD, ProcessId},
    handshake::Identification,
    hooks::{ErrorHandler, InboundHandler},
};

/// Environment variable holding this process's identity.
pub const ENV_ID: &str = "PMIX_ID";

/// Environment variable overriding the connect retry bound.
pub const ENV_MAX_RETRIES: &str = "PMIX_MAX_RETRIES";

/// Builder for [`Client`].
///
/// # Examples
///
/// ```
/// use pmix_link::{ClientBuilder, ServerAddress, frame::ProcessId};
///
/// let builder = ClientBuilder::new()
///     .identity(ProcessId::new(4))
///     .address(ServerAddress::new("/tmp/pmix.sock"))
///     .max_retries(5);
/// let _ = builder;
/// ```
#[must_use]
pub struct ClientBuilder {
    identity: ProcessId,
    address: Option<ServerAddress>,
    resolver: Arc<dyn AddressResolver>,
    identification: Identification,
    max_retries: u32,
    backoff: BackoffConfig,
    max_payload: usize,
    error_handler: Option<ErrorHandler>,
    inbound_handler: Option<InboundHandler>,
}

impl Default for ClientBuilder {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("identity", &self.identity)
            .field("address", &self.address)
            .field("identification", &self.identification)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Create a builder with default settings.
    ///
    /// The address is resolved from `PMIX_SERVER_URI` at connect time unless
    /// one is set explicitly.
    pub fn new() -> Self {
        Self {
            identity: ProcessId::default(),
            address: None,
            resolver: Arc::new(RendezvousResolver),
            identification: Identification::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffConfig::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            error_handler: None,
            inbound_handler: None,
        }
    }

    /// Create a builder seeded from [`ENV_ID`] and [`ENV_MAX_RETRIES`].
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfiguration`] if a variable is set but
    /// does not parse.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut builder = Self::new();
        if let Some(id) = env_parse::<u64>(ENV_ID)? {
            builder.identity = ProcessId::new(id);
        }
        if let Some(retries) = env_parse::<u32>(ENV_MAX_RETRIES)? {
            builder.max_retries = retries;
        }
        Ok(builder)
    }

    /// Identity presented in every outbound frame header.
    pub fn identity(mut self, identity: ProcessId) -> Self {
        self.identity = identity;
        self
    }

    /// Connect to `address` instead of reading the environment.
    pub fn address(mut self, address: ServerAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Replace the resolver consulted on every connect attempt.
    pub fn resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Number of retries after the first failed connect attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Delay schedule between connect attempts.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Largest payload sent or accepted, in bytes.
    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Identification sent during the handshake.
    pub fn identification(mut self, identification: Identification) -> Self {
        self.identification = identification;
        self
    }

    /// Install the error handler before the reactor starts.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Install the inbound handler before the reactor starts.
    pub fn inbound_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(crate::frame::Tag, &[u8]) + Send + Sync + 'static,
    {
        self.inbound_handler = Some(Arc::new(handler));
        self
    }

    /// Build the handle and the reactor without starting it.
    ///
    /// The caller must drive [`Connection::run`] on a Tokio runtime.
    pub fn build(self) -> (Client, Connection) {
        let shared = Arc::new(Shared::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Client::new(tx, Arc::clone(&shared), self.identity, self.max_payload);
        let config = ConnectionConfig {
            identity: self.identity,
            address: self.address,
            resolver: self.resolver,
            identification: self.identification,
            max_retries: self.max_retries,
            backoff: self.backoff,
            max_payload: self.max_payload,
            error_handler: self.error_handler,
            inbound_handler: self.inbound_handler,
        };
        (client, Connection::new(config, shared, rx))
    }

    /// Spawn the reactor on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> Client {
        let (client, connection) = self.build();
        tokio::spawn(connection.run());
        client
    }

    /// Spawn the reactor on `handle`.
    pub fn spawn_on(self, handle: &runtime::Handle) -> Client {
        let (client, connection) = self.build();
        handle.spawn(connection.run());
        client
    }

    /// Run the reactor on a dedicated thread with its own runtime.
    ///
    /// Use this from synchronous programs together with the `*_blocking`
    /// methods.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or thread cannot be created.
    pub fn spawn_progress_thread(self) -> io::Result<(Client, ProgressThread)> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (client, connection) = self.build();
        let handle = thread::Builder::new()
            .name("pmix-progress".to_owned())
            .spawn(move || runtime.block_on(connection.run()))?;
        Ok((client, ProgressThread { handle }))
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ClientError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| ClientError::InvalidConfiguration {
                reason: format!("{name}={raw:?}: {err}"),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ClientError::InvalidConfiguration {
            reason: format!("{name}: {err}"),
        }),
    }
}

/// Thread driving a reactor started by
/// [`ClientBuilder::spawn_progress_thread`].
#[derive(Debug)]
pub struct ProgressThread {
    handle: thread::JoinHandle<()>,
}

impl ProgressThread {
    /// Wait for the reactor to stop.
    ///
    /// The reactor stops after `finalize` or once every client handle has
    /// been dropped.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the progress thread panicked.
    pub fn join(self) -> thread::Result<()> { self.handle.join() }
}
