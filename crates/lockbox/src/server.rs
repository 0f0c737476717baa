//! The listener, shared server state and graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use lockbox_core::{Identity, RegistrySnapshot, Request, Response};
use lockbox_perms::{
    validate, AccessRegistry, IdentityKeys, KeyDirectory, PublicKeys, SignaturePolicy,
    ValidationError,
};
use lockbox_store::{BlobStore, RegistryStore};
use lockbox_wire::FrameConfig;

use crate::dispatcher;
use crate::error::{LockboxError, Result};
use crate::executor;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7878";

/// Default accept backlog.
pub const DEFAULT_BACKLOG: u32 = 20;

/// How long in-flight connections get to finish after shutdown is signaled.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub listen_addr: SocketAddr,

    /// Pending-connection queue length.
    pub backlog: u32,

    /// Framing limits and read deadline.
    pub frame: FrameConfig,

    /// What to do with requests whose signature does not verify.
    pub signature_policy: SignaturePolicy,

    /// Grace period for in-flight connections at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7878)),
            backlog: DEFAULT_BACKLOG,
            frame: FrameConfig::default(),
            signature_policy: SignaturePolicy::Enforce,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerConfig {
    /// Reject settings the listener cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(LockboxError::Config("backlog must be at least 1".into()));
        }
        if self.frame.max_message_size == 0 {
            return Err(LockboxError::Config(
                "max_message_size must be at least 1".into(),
            ));
        }
        if self.frame.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LockboxError::Config(
                "read_timeout must be positive; use None to wait forever".into(),
            ));
        }
        Ok(())
    }
}

/// State shared by every connection.
///
/// The registry mutex is held from validation through execution, storage
/// I/O included, so check-then-act is atomic per request.
pub struct ServerState {
    config: ServerConfig,
    identity: IdentityKeys,
    directory: Arc<dyn KeyDirectory>,
    blobs: Arc<dyn BlobStore>,
    persistence: Arc<dyn RegistryStore>,
    registry: Arc<Mutex<AccessRegistry>>,
    persisted: AtomicBool,
}

impl ServerState {
    /// Build the state, loading the registry from `persistence`.
    pub async fn load(
        config: ServerConfig,
        identity: IdentityKeys,
        directory: Arc<dyn KeyDirectory>,
        blobs: Arc<dyn BlobStore>,
        persistence: Arc<dyn RegistryStore>,
    ) -> Result<Self> {
        let snapshot = persistence.load_registry().await?;
        tracing::info!(
            users = snapshot.users.len(),
            files = snapshot.files.len(),
            "loaded registry"
        );

        Ok(Self {
            config,
            identity,
            directory,
            blobs,
            persistence,
            registry: Arc::new(Mutex::new(AccessRegistry::from_snapshot(snapshot))),
            persisted: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The server's own keys.
    pub fn identity(&self) -> &IdentityKeys {
        &self.identity
    }

    /// Where client public keys are looked up.
    pub fn directory(&self) -> &dyn KeyDirectory {
        self.directory.as_ref()
    }

    /// Public keys of `identity`, or `UnknownKey`.
    ///
    /// The lookup runs on the blocking pool since directories may read disk.
    pub async fn sender_keys(&self, identity: &Identity) -> Result<PublicKeys> {
        let directory = self.directory.clone();
        let identity = identity.clone();
        let keys = tokio::task::spawn_blocking(move || directory.require(&identity))
            .await
            .map_err(std::io::Error::from)??;
        Ok(keys)
    }

    /// Validate and, if allowed, execute one authenticated request.
    pub async fn handle_request(&self, sender: &Identity, request: Request) -> Response {
        let mut registry = self.lock_registry().await;
        match self.check(sender, &request, &registry) {
            Ok(()) => self.execute(sender, request, &mut registry).await,
            Err(rejection) => Response::failure(rejection),
        }
    }

    /// Enter the critical section. Hold the guard from [`check`] through
    /// [`execute`].
    ///
    /// The guard is owned, so execution can move to its own task and
    /// outlive the connection that started it.
    ///
    /// [`check`]: Self::check
    /// [`execute`]: Self::execute
    pub async fn lock_registry(&self) -> OwnedMutexGuard<AccessRegistry> {
        self.registry.clone().lock_owned().await
    }

    /// Run the validator, logging rejections.
    pub fn check(
        &self,
        sender: &Identity,
        request: &Request,
        registry: &AccessRegistry,
    ) -> std::result::Result<(), ValidationError> {
        validate(sender, request, registry).map_err(|rejection| {
            tracing::info!(%sender, operation = request.header(), reason = %rejection, "rejected request");
            rejection
        })
    }

    /// Execute a request that passed [`check`](Self::check) under the same guard.
    pub async fn execute(
        &self,
        sender: &Identity,
        request: Request,
        registry: &mut AccessRegistry,
    ) -> Response {
        executor::execute(sender, request, registry, self.blobs.as_ref()).await
    }

    /// A copy of the current registry.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.lock_registry().await.snapshot()
    }

    /// Save the registry. Only the first successful call does anything.
    ///
    /// Returns whether this call performed the save. A failed save leaves
    /// the registry unpersisted so a later call can retry.
    pub async fn persist(&self) -> Result<bool> {
        if self.persisted.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot = self.snapshot().await;
        if let Err(e) = self.persistence.save_registry(&snapshot).await {
            self.persisted.store(false, Ordering::SeqCst);
            tracing::error!(error = %e, "failed to persist registry");
            return Err(e.into());
        }
        tracing::info!(
            users = snapshot.users.len(),
            files = snapshot.files.len(),
            "persisted registry"
        );
        Ok(true)
    }

    /// Whether the registry has been persisted.
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::SeqCst)
    }
}

/// Signals a running server to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(watch::Sender<()>);

impl ShutdownHandle {
    /// Create a handle and the receiver to pass to [`Server::serve`].
    pub fn channel() -> (Self, watch::Receiver<()>) {
        let (tx, rx) = watch::channel(());
        (Self(tx), rx)
    }

    /// Stop accepting connections and begin shutdown.
    pub fn shutdown(&self) {
        let _ = self.0.send(());
    }
}

/// What happened during one [`Server::serve`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeReport {
    /// Connections accepted.
    pub connections: u64,

    /// Connections still running when the grace period ran out.
    pub aborted: usize,

    /// Whether this run saved the registry.
    pub persisted: bool,
}

/// A bound listener ready to serve.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the configured address.
    pub fn bind(state: Arc<ServerState>) -> Result<Self> {
        let config = state.config();
        config.validate()?;
        let socket = match config.listen_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.listen_addr)?;
        let listener = socket.listen(config.backlog)?;

        Ok(Self { listener, state })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Accept connections until `shutdown` fires (or its sender is dropped),
    /// drain in-flight connections, then persist the registry once.
    pub async fn serve(self, mut shutdown: watch::Receiver<()>) -> Result<ServeReport> {
        let Self { listener, state } = self;
        let mut connections = JoinSet::new();
        let mut report = ServeReport::default();

        tracing::info!(addr = %listener.local_addr()?, "listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        report.connections += 1;
                        connections.spawn(dispatcher::handle_connection(state.clone(), stream, peer));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        report.aborted = drain(&mut connections, state.config().shutdown_grace).await;
        report.persisted = state.persist().await?;

        tracing::info!(
            connections = report.connections,
            aborted = report.aborted,
            "server stopped"
        );
        Ok(report)
    }
}

/// Wait up to `grace` for connections to finish, then abort the rest.
///
/// Returns how many were aborted.
async fn drain(connections: &mut JoinSet<()>, grace: Duration) -> usize {
    if connections.is_empty() {
        return 0;
    }
    tracing::info!(in_flight = connections.len(), "waiting for connections");

    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if finished.is_ok() {
        return 0;
    }

    let stragglers = connections.len();
    tracing::warn!(
        stragglers,
        "connections did not finish within {} seconds, aborting",
        grace.as_secs()
    );
    connections.shutdown().await;
    stragglers
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "connection task panicked");
        }
    }
}
