//! Per-connection request handling.
//!
//! Each accepted connection carries exactly one request and gets at most one
//! response:
//!
//! ```text
//! AwaitRequest -> Authenticate -> Validate -> Execute -> RespondSealed -> Closed
//! ```
//!
//! Anything that goes wrong before `Validate` (framing, decoding, unknown
//! sender key, decryption, signature) closes the connection without a
//! response. Validation failures are ordinary failure responses.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Instrument;

use lockbox_core::{Identity, Request, RequestKind, Response};
use lockbox_perms::{KeyDirectory, PublicKeys};
use lockbox_wire::{recv_message, send_message, WireMessage};

use crate::error::{LockboxError, Result};
use crate::server::ServerState;

/// Where a connection is in its single request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the request frame.
    AwaitRequest,
    /// Checking who sent the request and opening its envelope.
    Authenticate,
    /// Running the validator under the registry lock.
    Validate,
    /// Applying an accepted request, still under the lock.
    Execute,
    /// Sealing the response for the sender (clear for `add_user`) and
    /// sending it.
    RespondSealed,
    /// Done; the write half has been shut down.
    Closed,
}

/// An authenticated request and where to send the answer.
struct Authenticated {
    sender: Identity,
    request: Request,
    /// Keys to seal the response for; `None` answers in the clear.
    reply_to: Option<PublicKeys>,
}

/// Drives one connection through its request/response cycle.
pub struct ConnectionHandler<S> {
    state: Arc<ServerState>,
    stream: S,
    phase: Phase,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(state: Arc<ServerState>, stream: S) -> Self {
        Self {
            state,
            stream,
            phase: Phase::AwaitRequest,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Serve the one request on this connection.
    ///
    /// Returns the response that was sent. On error nothing was sent, or
    /// sending it failed.
    pub async fn run(mut self) -> Result<Response> {
        let result = self.cycle().await;
        if let Err(e) = &result {
            tracing::warn!(phase = ?self.phase, error = %e, "closing connection without response");
        }

        self.phase = Phase::Closed;
        let _ = self.stream.shutdown().await;
        result
    }

    async fn cycle(&mut self) -> Result<Response> {
        let frame = self.state.config().frame.clone();

        self.phase = Phase::AwaitRequest;
        let message = recv_message(&mut self.stream, &frame).await?;

        self.phase = Phase::Authenticate;
        let Authenticated {
            sender,
            request,
            reply_to,
        } = self.authenticate(message).await?;

        let operation = request.header().to_string();
        self.phase = Phase::Validate;
        let mut registry = self.state.lock_registry().await;
        let response = match self.state.check(&sender, &request, &registry) {
            Ok(()) => {
                self.phase = Phase::Execute;
                // Detached so an abort at shutdown cannot stop a mutation halfway.
                let state = self.state.clone();
                let actor = sender.clone();
                tokio::spawn(async move { state.execute(&actor, request, &mut registry).await })
                    .await
                    .map_err(std::io::Error::from)?
            }
            Err(rejection) => {
                drop(registry);
                Response::failure(rejection)
            }
        };

        self.phase = Phase::RespondSealed;
        let reply = match &reply_to {
            Some(keys) => WireMessage::sealed_response(&response, keys, self.state.identity())?,
            None => WireMessage::clear_response(&response)?,
        };
        send_message(&mut self.stream, &reply, &frame).await?;

        tracing::debug!(%sender, %operation, outcome = response.header(), "request complete");
        Ok(response)
    }

    async fn authenticate(&self, message: WireMessage) -> Result<Authenticated> {
        let kind = message.header.parse::<RequestKind>().ok();

        // add_user is the only request a stranger can make.
        if kind.is_some_and(|k| k.is_bootstrap()) {
            let request: Request = message.decode_clear()?;
            ensure_header_matches(&message.header, &request)?;
            return Ok(Authenticated {
                sender: message.sender,
                request,
                reply_to: None,
            });
        }

        let sender_keys = self.state.sender_keys(&message.sender).await?;
        let envelope = message.envelope()?;
        let recipient = self.state.identity();
        let policy = self.state.config().signature_policy;

        let request = match kind {
            Some(_) => {
                let request: Request =
                    envelope.open(recipient, &message.sender, &sender_keys, policy)?;
                ensure_header_matches(&message.header, &request)?;
                request
            }
            // Authenticate anyway so strangers learn nothing from garbage.
            None => {
                envelope.open_bytes(recipient, &message.sender, &sender_keys, policy)?;
                Request::Unrecognized {
                    header: message.header.clone(),
                }
            }
        };

        Ok(Authenticated {
            sender: message.sender,
            request,
            reply_to: Some(sender_keys),
        })
    }
}

fn ensure_header_matches(header: &str, request: &Request) -> Result<()> {
    if request.header() != header {
        return Err(LockboxError::Protocol(format!(
            "header {header} does not match {} payload",
            request.header()
        )));
    }
    Ok(())
}

/// Serve one accepted TCP connection inside a span naming the peer.
pub async fn handle_connection(state: Arc<ServerState>, stream: TcpStream, peer: SocketAddr) {
    let span = tracing::info_span!("connection", %peer);
    async move {
        tracing::debug!("accepted connection");
        let _ = ConnectionHandler::new(state, stream).run().await;
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use lockbox_core::Filename;
    use lockbox_perms::{IdentityKeys, MemoryKeyDirectory, SignaturePolicy};
    use lockbox_store::MemoryStore;
    use lockbox_wire::{send_frame, FrameConfig};
    use tokio::io::{duplex, DuplexStream};

    use crate::server::ServerConfig;

    struct Harness {
        state: Arc<ServerState>,
        server_keys: PublicKeys,
        alice_keys: IdentityKeys,
    }

    fn alice() -> Identity {
        Identity::new("alice").unwrap()
    }

    async fn harness() -> Harness {
        let server_identity = IdentityKeys::generate();
        let server_keys = server_identity.public_keys();
        let alice_keys = IdentityKeys::generate();

        let directory = Arc::new(MemoryKeyDirectory::new());
        directory.publish(&alice(), &alice_keys.public_keys()).unwrap();

        let store = Arc::new(MemoryStore::new());
        let config = ServerConfig {
            frame: FrameConfig {
                read_timeout: Some(Duration::from_millis(200)),
                ..Default::default()
            },
            ..Default::default()
        };
        let state = ServerState::load(config, server_identity, directory, store.clone(), store)
            .await
            .unwrap();

        Harness {
            state: Arc::new(state),
            server_keys,
            alice_keys,
        }
    }

    /// Send `message` through a handler and return its result plus whatever
    /// the client side received.
    async fn exchange(
        state: Arc<ServerState>,
        message: &WireMessage,
    ) -> (Result<Response>, Option<WireMessage>) {
        let (mut client, server): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let frame = FrameConfig::default();

        send_message(&mut client, message, &frame).await.unwrap();
        let result = ConnectionHandler::new(state, server).run().await;
        let reply = recv_message(&mut client, &frame).await.ok();
        (result, reply)
    }

    #[tokio::test]
    async fn test_add_user_in_the_clear() {
        let h = harness().await;
        let message = WireMessage::clear_request(alice(), &Request::AddUser).unwrap();

        let (result, reply) = exchange(h.state.clone(), &message).await;
        assert!(result.unwrap().is_success());

        let reply = reply.unwrap();
        assert!(!reply.is_sealed());
        assert_eq!(reply.header, "success");
        assert!(h.state.snapshot().await.users.contains(&alice()));
    }

    #[tokio::test]
    async fn test_sealed_request_gets_sealed_response() {
        let h = harness().await;
        h.state.handle_request(&alice(), Request::AddUser).await;

        let request = Request::UploadFile {
            filename: Filename::new("notes.txt"),
            data: Bytes::from_static(b"hi"),
        };
        let message =
            WireMessage::sealed_request(alice(), &request, &h.server_keys, &h.alice_keys).unwrap();

        let (result, reply) = exchange(h.state.clone(), &message).await;
        assert!(result.unwrap().is_success());

        let reply = reply.unwrap();
        let response: Response = reply
            .envelope()
            .unwrap()
            .open(&h.alice_keys, &Identity::server(), &h.server_keys, SignaturePolicy::Enforce)
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_unknown_sender_key_gets_no_response() {
        let h = harness().await;
        let mallory = Identity::new("mallory").unwrap();
        let message = WireMessage::sealed_request(
            mallory,
            &Request::DownloadFile {
                filename: Filename::new("notes.txt"),
            },
            &h.server_keys,
            &IdentityKeys::generate(),
        )
        .unwrap();

        let (result, reply) = exchange(h.state, &message).await;
        assert!(matches!(result, Err(LockboxError::Perms(_))));
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_forged_signature_gets_no_response() {
        let h = harness().await;
        h.state.handle_request(&alice(), Request::AddUser).await;

        // Signed with a key that is not alice's.
        let message = WireMessage::sealed_request(
            alice(),
            &Request::DeleteFile {
                filename: Filename::new("notes.txt"),
            },
            &h.server_keys,
            &IdentityKeys::generate(),
        )
        .unwrap();

        let (result, reply) = exchange(h.state, &message).await;
        assert!(matches!(result, Err(LockboxError::Perms(_))));
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_header_body_mismatch_is_rejected() {
        let h = harness().await;
        let mut message = WireMessage::sealed_request(
            alice(),
            &Request::DeleteFile {
                filename: Filename::new("notes.txt"),
            },
            &h.server_keys,
            &h.alice_keys,
        )
        .unwrap();
        message.header = "download_file".into();

        let (result, reply) = exchange(h.state, &message).await;
        assert!(matches!(result, Err(LockboxError::Protocol(_))));
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_sealed_add_user_is_rejected() {
        let h = harness().await;
        let message =
            WireMessage::sealed_request(alice(), &Request::AddUser, &h.server_keys, &h.alice_keys)
                .unwrap();

        let (result, reply) = exchange(h.state.clone(), &message).await;
        assert!(result.is_err());
        assert!(reply.is_none());
        assert!(h.state.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_header_is_answered_after_authentication() {
        let h = harness().await;
        let mut message =
            WireMessage::sealed_request(alice(), &Request::AddUser, &h.server_keys, &h.alice_keys)
                .unwrap();
        message.header = "format_disk".into();

        let (result, reply) = exchange(h.state, &message).await;
        assert_eq!(
            result.unwrap().error(),
            Some("unrecognized operation: format_disk")
        );
        assert_eq!(reply.unwrap().header, "failure");
    }

    #[tokio::test]
    async fn test_garbage_frame_closes_connection() {
        let h = harness().await;
        let (mut client, server) = duplex(1024);
        send_frame(&mut client, b"not cbor at all", &FrameConfig::default())
            .await
            .unwrap();

        let handler = ConnectionHandler::new(h.state, server);
        assert_eq!(handler.phase(), Phase::AwaitRequest);
        assert!(matches!(handler.run().await, Err(LockboxError::Wire(_))));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let h = harness().await;
        let (_client, server) = duplex(1024);

        let result = ConnectionHandler::new(h.state, server).run().await;
        assert!(matches!(result, Err(LockboxError::Wire(_))));
    }
}
