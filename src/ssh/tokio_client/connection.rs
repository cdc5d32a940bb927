// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SSH connection establishment and the russh session handle.

use async_trait::async_trait;
use russh::client::{Config, Handle, Handler, Msg};
use russh::Channel;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use super::authentication::{auth_plan, authenticate, ServerCheckMethod};
use crate::auth::AgentSource;
use crate::config::ConnectionSpec;
use crate::error::HostError;
use crate::ssh::transport::{
    BoxedStream, Endpoint, ExecRequest, RemoteProcess, Session, SftpChannel, Transport,
};

/// Opens sessions with russh.
#[derive(Clone)]
pub struct RusshTransport {
    config: Arc<Config>,
    server_check: ServerCheckMethod,
}

impl RusshTransport {
    pub fn new(server_check: ServerCheckMethod) -> Self {
        Self::with_config(server_check, Config::default())
    }

    /// Same as `new`, but with a non default [`russh::client::Config`].
    pub fn with_config(server_check: ServerCheckMethod, config: Config) -> Self {
        Self {
            config: Arc::new(config),
            server_check,
        }
    }

    async fn connect_direct(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Handle<ClientHandler>, super::Error> {
        // Connection code inspired from std::net::TcpStream::connect and std::net::each_addr
        let socket_addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(super::Error::AddressInvalid)?;
        let mut connect_res = Err(super::Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(host.to_string(), port, self.server_check.clone());
            match russh::client::connect(self.config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok(h);
                    break;
                }
                Err(e) => {
                    debug!("Connection to {} ({}) failed: {}", host, socket_addr, e);
                    connect_res = Err(e);
                }
            }
        }
        connect_res
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open(
        &self,
        spec: &ConnectionSpec,
        endpoint: Endpoint,
        agent: &AgentSource,
    ) -> Result<Arc<dyn Session>, HostError> {
        let methods = auth_plan(spec, agent)?;

        let mut handle = match endpoint {
            Endpoint::Direct { host, port } => self
                .connect_direct(&host, port)
                .await
                .map_err(|e| e.into_host_error(&spec.host))?,
            Endpoint::Tunnel(tunnel) => {
                debug!(
                    "Handshaking with {}:{} through {}",
                    tunnel.target_host, tunnel.target_port, tunnel.proxy
                );
                let handler = ClientHandler::new(
                    tunnel.target_host.clone(),
                    tunnel.target_port,
                    self.server_check.clone(),
                );
                russh::client::connect_stream(self.config.clone(), tunnel.stream, handler)
                    .await
                    .map_err(|e: super::Error| e.into_host_error(&spec.host))?
            }
        };

        if let Err(reasons) = authenticate(&mut handle, &spec.user, methods).await {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            return Err(HostError::Authentication {
                host: spec.host.clone(),
                user: spec.user.clone(),
                reason: reasons.join("; "),
            });
        }

        Ok(Arc::new(RusshSession {
            host: spec.host.clone(),
            handle,
        }))
    }
}

/// An authenticated russh session.
pub struct RusshSession {
    host: String,
    handle: Handle<ClientHandler>,
}

impl std::fmt::Debug for RusshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshSession")
            .field("host", &self.host)
            .field("handle", &"Handle<ClientHandler>")
            .finish()
    }
}

#[async_trait]
impl Session for RusshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<BoxedStream, HostError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, port.into(), "127.0.0.1", 0)
            .await
            .map_err(|e| HostError::channel(&self.host, e))?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn exec(&self, request: ExecRequest) -> Result<RemoteProcess, HostError> {
        super::channel_manager::start_process(&self.handle, request)
            .await
            .map_err(|e| HostError::channel(&self.host, e))
    }

    async fn open_sftp(&self) -> Result<Box<dyn SftpChannel>, HostError> {
        super::file_transfer::RusshSftp::open(&self.handle)
            .await
            .map(|sftp| Box::new(sftp) as Box<dyn SftpChannel>)
            .map_err(|e| HostError::channel(&self.host, e))
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
        {
            debug!("Disconnect from {} failed: {}", self.host, e);
        }
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

/// SSH client handler for server key verification and agent forwarding.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            port,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::PublicKey(key) => {
                let pk = russh::keys::parse_public_key_base64(key)
                    .map_err(|_| super::Error::ServerCheckFailed)?;

                Ok(pk == *server_public_key)
            }
            ServerCheckMethod::PublicKeyFile(key_file_name) => {
                let pk = russh::keys::load_public_key(key_file_name)
                    .map_err(|_| super::Error::ServerCheckFailed)?;

                Ok(pk == *server_public_key)
            }
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => {
                russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.port,
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| super::Error::ServerCheckFailed)
            }
            ServerCheckMethod::DefaultKnownHostsFile => {
                russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                    .map_err(|_| super::Error::ServerCheckFailed)
            }
        }
    }

    async fn server_channel_open_agent_forward(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut russh::client::Session,
    ) -> Result<(), Self::Error> {
        let hostname = self.hostname.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge_agent(channel).await {
                warn!("Agent forwarding for {} failed: {}", hostname, e);
            }
        });
        Ok(())
    }
}

/// Relay a forwarded agent channel to the local agent socket.
#[cfg(unix)]
async fn bridge_agent(channel: Channel<Msg>) -> io::Result<()> {
    let path = std::env::var_os("SSH_AUTH_SOCK")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "SSH_AUTH_SOCK is not set"))?;
    let mut socket = tokio::net::UnixStream::connect(path).await?;
    let mut stream = channel.into_stream();
    tokio::io::copy_bidirectional(&mut stream, &mut socket).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn bridge_agent(channel: Channel<Msg>) -> io::Result<()> {
    let _ = channel.close().await;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "agent forwarding is not supported on this platform",
    ))
}
