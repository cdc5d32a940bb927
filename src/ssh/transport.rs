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

//! Seams between the execution engine and the SSH implementation.
//!
//! [`Transport`] opens authenticated sessions, [`Session`] starts remote
//! processes, tunnels and SFTP channels. The production implementation lives
//! in [`crate::ssh::tokio_client`]; tests provide in-memory doubles.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::auth::AgentSource;
use crate::config::ConnectionSpec;
use crate::error::HostError;

/// Byte stream carried over a proxy channel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedStream = Box<dyn TunnelStream>;

/// A forwarded channel through a proxy session, ready to carry the SSH
/// handshake with the target host.
pub struct ChannelEndpoint {
    pub proxy: String,
    pub target_host: String,
    pub target_port: u16,
    pub stream: BoxedStream,
}

impl fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("proxy", &self.proxy)
            .field("target_host", &self.target_host)
            .field("target_port", &self.target_port)
            .finish_non_exhaustive()
    }
}

/// Where the SSH handshake for a session is performed.
#[derive(Debug)]
pub enum Endpoint {
    Direct { host: String, port: u16 },
    Tunnel(ChannelEndpoint),
}

impl Endpoint {
    pub fn direct(spec: &ConnectionSpec) -> Self {
        Endpoint::Direct {
            host: spec.host.clone(),
            port: spec.port,
        }
    }
}

/// Parameters for starting one remote process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: String,
    pub pty: bool,
    pub forward_agent: bool,
}

/// Raw output of a remote process as it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    StdOut(Vec<u8>),
    StdErr(Vec<u8>),
    ExitCode(u32),
}

/// Messages accepted by a running remote process.
#[derive(Debug)]
pub enum StdinMessage {
    Data(Vec<u8>),
    /// Acknowledged once every preceding `Data` has been handed to the channel.
    Flush(oneshot::Sender<()>),
    Eof,
}

/// Handles to a started remote process. The output receiver is closed once
/// the channel is closed by the remote side.
#[derive(Debug)]
pub struct RemoteProcess {
    pub output: mpsc::Receiver<CommandOutput>,
    pub stdin: mpsc::Sender<StdinMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFileKind {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteFileKind,
}

pub type RemoteReader = Box<dyn AsyncRead + Unpin + Send>;
pub type RemoteWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// File operations on one SFTP channel. Remote paths always use `/`.
#[async_trait]
pub trait SftpChannel: Send + Sync {
    /// Kind of the entry at `path`; `NotFound` when it does not exist.
    async fn metadata(&self, path: &str) -> io::Result<RemoteFileKind>;

    async fn create_dir(&self, path: &str) -> io::Result<()>;

    /// Entries of a directory without `.` and `..`.
    async fn read_dir(&self, path: &str) -> io::Result<Vec<RemoteEntry>>;

    /// Create or truncate a file for writing.
    async fn create(&self, path: &str) -> io::Result<RemoteWriter>;

    async fn open(&self, path: &str) -> io::Result<RemoteReader>;

    async fn close(&self) -> io::Result<()>;
}

/// An authenticated SSH session to one host.
#[async_trait]
pub trait Session: Send + Sync {
    fn host(&self) -> &str;

    /// Open a `direct-tcpip` channel from this host to `host:port`.
    async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<BoxedStream, HostError>;

    /// Start a remote process on a fresh channel.
    async fn exec(&self, request: ExecRequest) -> Result<RemoteProcess, HostError>;

    async fn open_sftp(&self) -> Result<Box<dyn SftpChannel>, HostError>;

    async fn disconnect(&self);

    fn is_closed(&self) -> bool;
}

/// Opens sessions. `agent` is the identity source resolved for this host.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        spec: &ConnectionSpec,
        endpoint: Endpoint,
        agent: &AgentSource,
    ) -> Result<Arc<dyn Session>, HostError>;
}
