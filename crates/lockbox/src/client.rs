//! Client side: build a request, send it on a fresh connection, open the
//! response.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use lockbox_core::{Filename, Identity, Request, Response};
use lockbox_perms::{IdentityKeys, PublicKeys, SignaturePolicy};
use lockbox_wire::{recv_message, send_message, FrameConfig, WireMessage};

use crate::error::{LockboxError, Result};

/// Configuration for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where the server listens.
    pub server_addr: SocketAddr,

    /// Framing limits and read deadline.
    pub frame: FrameConfig,

    /// What to do with responses whose signature does not verify.
    pub signature_policy: SignaturePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 7878)),
            frame: FrameConfig::default(),
            signature_policy: SignaturePolicy::Enforce,
        }
    }
}

/// A user talking to one server.
pub struct Client {
    identity: Identity,
    keys: IdentityKeys,
    server: PublicKeys,
    config: ClientConfig,
}

impl Client {
    pub fn new(identity: Identity, keys: IdentityKeys, server: PublicKeys, config: ClientConfig) -> Self {
        Self {
            identity,
            keys,
            server,
            config,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Register this client's identity with the server.
    pub async fn add_user(&self) -> Result<Response> {
        self.send(&Request::AddUser).await
    }

    pub async fn upload_file(&self, filename: impl Into<Filename>, data: impl Into<Bytes>) -> Result<Response> {
        self.send(&Request::UploadFile {
            filename: filename.into(),
            data: data.into(),
        })
        .await
    }

    pub async fn download_file(&self, filename: impl Into<Filename>) -> Result<Response> {
        self.send(&Request::DownloadFile {
            filename: filename.into(),
        })
        .await
    }

    pub async fn delete_file(&self, filename: impl Into<Filename>) -> Result<Response> {
        self.send(&Request::DeleteFile {
            filename: filename.into(),
        })
        .await
    }

    pub async fn share_file(&self, filename: impl Into<Filename>, target: Identity) -> Result<Response> {
        self.send(&Request::ShareFile {
            filename: filename.into(),
            target,
        })
        .await
    }

    /// Send one request on a new connection and wait for the response.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let message = self.build(request)?;

        let mut stream = TcpStream::connect(self.config.server_addr).await?;
        send_message(&mut stream, &message, &self.config.frame).await?;
        let reply = recv_message(&mut stream, &self.config.frame).await?;
        let _ = stream.shutdown().await;

        self.open(request, reply)
    }

    /// The wire message for `request`: clear for `add_user`, sealed otherwise.
    pub fn build(&self, request: &Request) -> Result<WireMessage> {
        let bootstrap = request.kind().is_some_and(|k| k.is_bootstrap());
        let message = if bootstrap {
            WireMessage::clear_request(self.identity.clone(), request)?
        } else {
            WireMessage::sealed_request(self.identity.clone(), request, &self.server, &self.keys)?
        };
        Ok(message)
    }

    fn open(&self, request: &Request, reply: WireMessage) -> Result<Response> {
        if reply.sender != Identity::server() {
            return Err(LockboxError::Protocol(format!(
                "response came from {}, not the server",
                reply.sender
            )));
        }

        let response: Response = if reply.is_sealed() {
            reply.envelope()?.open(
                &self.keys,
                &reply.sender,
                &self.server,
                self.config.signature_policy,
            )?
        } else if request.kind().is_some_and(|k| k.is_bootstrap()) {
            reply.decode_clear()?
        } else {
            return Err(LockboxError::Protocol(
                "unsealed response to a sealed request".into(),
            ));
        };

        if response.header() != reply.header {
            return Err(LockboxError::Protocol(format!(
                "response header {} does not match {} payload",
                reply.header,
                response.header()
            )));
        }

        Ok(response)
    }
}
