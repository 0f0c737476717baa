//! Test fixtures and helpers.
//!
//! A [`TestServer`] runs a real listener on a free loopback port with an
//! in-memory key directory, and hands out clients whose keys it has already
//! published.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use lockbox::{
    Client, ClientConfig, Identity, Result, ServeReport, Server, ServerConfig, ServerState,
    ShutdownHandle,
};
use lockbox_perms::{IdentityKeys, KeyDirectory, MemoryKeyDirectory, PublicKeys};
use lockbox_store::{BlobStore, MemoryStore, RegistryStore};
use lockbox_wire::FrameConfig;

/// Seed the test server's keys are derived from.
pub const SERVER_SEED: [u8; 32] = [0xA5; 32];

/// Deterministic key seed for a user name.
pub fn seed_for(name: &str) -> [u8; 32] {
    let mut seed = [0u8; 32];
    for (i, b) in name.bytes().enumerate() {
        seed[i % 32] ^= b;
    }
    seed[31] ^= name.len() as u8;
    seed
}

/// Deterministic keys for a user name.
pub fn keys_for(name: &str) -> IdentityKeys {
    IdentityKeys::from_seed(&seed_for(name))
}

/// Server configuration suited to tests: free port, short deadlines.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        frame: FrameConfig {
            read_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
        shutdown_grace: Duration::from_secs(2),
        ..Default::default()
    }
}

/// A running server plus what a test needs to talk to it.
pub struct TestServer {
    addr: SocketAddr,
    server_keys: PublicKeys,
    directory: Arc<MemoryKeyDirectory>,
    state: Arc<ServerState>,
    handle: ShutdownHandle,
    task: JoinHandle<Result<ServeReport>>,
}

impl TestServer {
    /// Start a server backed by a fresh [`MemoryStore`].
    pub async fn start() -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::start_with(test_config(), store.clone(), store).await
    }

    /// Start a server with explicit configuration and stores.
    pub async fn start_with(
        config: ServerConfig,
        blobs: Arc<dyn BlobStore>,
        persistence: Arc<dyn RegistryStore>,
    ) -> Result<Self> {
        let identity = IdentityKeys::from_seed(&SERVER_SEED);
        let server_keys = identity.public_keys();
        let directory = Arc::new(MemoryKeyDirectory::new());

        let state = ServerState::load(config, identity, directory.clone(), blobs, persistence).await?;
        let server = Server::bind(Arc::new(state))?;
        let addr = server.local_addr()?;
        let state = server.state().clone();

        let (handle, shutdown) = ShutdownHandle::channel();
        let task = tokio::spawn(server.serve(shutdown));

        Ok(Self {
            addr,
            server_keys,
            directory,
            state,
            handle,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The server's public keys, as a client would have them on file.
    pub fn server_keys(&self) -> PublicKeys {
        self.server_keys
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// A client for `name` whose public keys are published to the server.
    ///
    /// Panics if `name` is not a valid identity.
    pub fn client(&self, name: &str) -> Client {
        let identity = identity(name);
        let keys = keys_for(name);
        // The memory directory never fails.
        let _ = self.directory.publish(&identity, &keys.public_keys());
        self.client_with_keys(identity, keys)
    }

    /// A client using `keys` without publishing anything.
    pub fn client_with_keys(&self, identity: Identity, keys: IdentityKeys) -> Client {
        let config = ClientConfig {
            server_addr: self.addr,
            frame: FrameConfig {
                read_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            ..Default::default()
        };
        Client::new(identity, keys, self.server_keys, config)
    }

    /// Signal shutdown and wait for the server to drain and persist.
    pub async fn stop(self) -> Result<ServeReport> {
        self.handle.shutdown();
        self.task.await.map_err(std::io::Error::from)?
    }
}

/// Build an identity, panicking on invalid names.
pub fn identity(name: &str) -> Identity {
    match Identity::new(name) {
        Ok(id) => id,
        Err(e) => panic!("bad test identity {name:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeds_are_deterministic_and_distinct() {
        assert_eq!(seed_for("alice"), seed_for("alice"));
        assert_ne!(seed_for("alice"), seed_for("bob"));
        assert_eq!(
            keys_for("alice").public_keys(),
            keys_for("alice").public_keys()
        );
    }

    #[tokio::test]
    async fn test_server_starts_and_stops() {
        let server = TestServer::start().await.unwrap();
        assert_ne!(server.addr().port(), 0);

        let alice = server.client("alice");
        assert!(alice.add_user().await.unwrap().is_success());

        let report = server.stop().await.unwrap();
        assert_eq!(report.connections, 1);
        assert!(report.persisted);
    }
}
