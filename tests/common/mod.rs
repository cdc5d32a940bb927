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

//! In-process transport double for the integration tests.
//!
//! Each host is scripted with a [`Behavior`]. Remote commands are interpreted
//! by a tiny shell: statements separated by `;` out of `echo TEXT`,
//! `echo TEXT >&2`, `exit N`, `cat`, `sleep MS` and `raw HEX..` (bytes on
//! stdout). SFTP paths map into `<root>/<host>/`, and a host's SFTP can be
//! broken with an [`SftpFault`].

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;

use pssh::error::HostError;
use pssh::ssh::transport::{RemoteReader, RemoteWriter};
use pssh::ssh::{
    BoxedStream, CommandOutput, Endpoint, ExecRequest, RemoteEntry, RemoteFileKind,
    RemoteProcess, Session, SftpChannel, StdinMessage, Transport,
};
use pssh::{AgentSource, ClientConfig, ConnectionSpec, ParallelSshClient};

/// Target port that no proxy can reach.
pub const UNREACHABLE_PORT: u16 = 1;

#[derive(Debug, Clone)]
pub enum Behavior {
    Ok,
    AuthFail,
    Unreachable,
    /// Accept after the delay.
    Delay(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpFault {
    /// `create_dir` is refused with `PermissionDenied`.
    DenyMkdir,
    /// Reads return a few bytes and then fail.
    BrokenRead,
}

/// One call to [`Transport::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Proxy host when the handshake ran over a tunnel.
    pub via: Option<String>,
}

#[derive(Default)]
struct State {
    behaviors: HashMap<String, Behavior>,
    opens: Vec<OpenRecord>,
    execs: Vec<(String, ExecRequest)>,
    tunnels: Vec<(String, String, u16)>,
    sftp_faults: HashMap<String, SftpFault>,
}

pub struct MockTransport {
    state: Arc<Mutex<State>>,
    sftp_root: PathBuf,
    live_sessions: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(sftp_root: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(State::default())),
            sftp_root: sftp_root.as_ref().to_path_buf(),
            live_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_behavior(&self, host: &str, behavior: Behavior) {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .insert(host.to_string(), behavior);
    }

    pub fn set_sftp_fault(&self, host: &str, fault: SftpFault) {
        self.state
            .lock()
            .unwrap()
            .sftp_faults
            .insert(host.to_string(), fault);
    }

    /// Every open attempt, successful or not.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn opens_for(&self, host: &str) -> usize {
        self.opens().iter().filter(|o| o.host == host).count()
    }

    /// Commands started per host, in start order.
    pub fn execs(&self) -> Vec<(String, ExecRequest)> {
        self.state.lock().unwrap().execs.clone()
    }

    /// `(proxy, target host, target port)` for every tunnel requested.
    pub fn tunnels(&self) -> Vec<(String, String, u16)> {
        self.state.lock().unwrap().tunnels.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Directory backing `host`'s remote filesystem.
    pub fn host_root(&self, host: &str) -> PathBuf {
        self.sftp_root.join(host)
    }

    fn behavior(&self, host: &str) -> Behavior {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .get(host)
            .cloned()
            .unwrap_or(Behavior::Ok)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        spec: &ConnectionSpec,
        endpoint: Endpoint,
        _agent: &AgentSource,
    ) -> Result<Arc<dyn Session>, HostError> {
        let via = match &endpoint {
            Endpoint::Direct { .. } => None,
            Endpoint::Tunnel(channel) => Some(channel.proxy.clone()),
        };
        self.state.lock().unwrap().opens.push(OpenRecord {
            host: spec.host.clone(),
            user: spec.user.clone(),
            port: spec.port,
            via,
        });

        match self.behavior(&spec.host) {
            Behavior::Ok => {}
            Behavior::Delay(delay) => tokio::time::sleep(delay).await,
            Behavior::Unreachable => {
                return Err(HostError::Connection {
                    host: spec.host.clone(),
                    reason: "connection refused".to_string(),
                })
            }
            Behavior::AuthFail => {
                return Err(HostError::Authentication {
                    host: spec.host.clone(),
                    user: spec.user.clone(),
                    reason: "publickey rejected".to_string(),
                })
            }
        }

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            host: spec.host.clone(),
            state: Arc::clone(&self.state),
            root: self.host_root(&spec.host),
            closed: AtomicBool::new(false),
            live_sessions: Arc::clone(&self.live_sessions),
        }))
    }
}

pub struct MockSession {
    host: String,
    state: Arc<Mutex<State>>,
    root: PathBuf,
    closed: AtomicBool,
    live_sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<BoxedStream, HostError> {
        self.state
            .lock()
            .unwrap()
            .tunnels
            .push((self.host.clone(), host.to_string(), port));
        if port == UNREACHABLE_PORT {
            return Err(HostError::Channel {
                host: self.host.clone(),
                reason: format!("open failed: {host}:{port} unreachable"),
            });
        }
        let (near, _far) = tokio::io::duplex(1024);
        Ok(Box::new(near))
    }

    async fn exec(&self, request: ExecRequest) -> Result<RemoteProcess, HostError> {
        self.state
            .lock()
            .unwrap()
            .execs
            .push((self.host.clone(), request.clone()));

        let (output_tx, output_rx) = mpsc::channel(64);
        let (stdin_tx, stdin_rx) = mpsc::channel(64);
        tokio::spawn(run_script(request.command, output_tx, stdin_rx));
        Ok(RemoteProcess {
            output: output_rx,
            stdin: stdin_tx,
        })
    }

    async fn open_sftp(&self) -> Result<Box<dyn SftpChannel>, HostError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| HostError::Channel {
                host: self.host.clone(),
                reason: e.to_string(),
            })?;
        let fault = self.state.lock().unwrap().sftp_faults.get(&self.host).copied();
        Ok(Box::new(MockSftp {
            root: self.root.clone(),
            fault,
        }))
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

async fn run_script(
    script: String,
    output: mpsc::Sender<CommandOutput>,
    mut stdin: mpsc::Receiver<StdinMessage>,
) {
    let mut exit_code = 0;
    for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (program, rest) = statement.split_once(' ').unwrap_or((statement, ""));
        match program {
            "echo" => match rest.strip_suffix(">&2") {
                Some(text) => {
                    let line = format!("{}\n", text.trim_end());
                    let _ = output.send(CommandOutput::StdErr(line.into_bytes())).await;
                }
                None => {
                    let line = format!("{rest}\n");
                    let _ = output.send(CommandOutput::StdOut(line.into_bytes())).await;
                }
            },
            "raw" => {
                let bytes = rest
                    .split_whitespace()
                    .map(|b| u8::from_str_radix(b, 16).unwrap())
                    .collect();
                let _ = output.send(CommandOutput::StdOut(bytes)).await;
            }
            "sleep" => {
                let ms: u64 = rest.trim().parse().unwrap();
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            "cat" => {
                while let Some(message) = stdin.recv().await {
                    match message {
                        StdinMessage::Data(data) => {
                            let _ = output.send(CommandOutput::StdOut(data)).await;
                        }
                        StdinMessage::Flush(ack) => {
                            let _ = ack.send(());
                        }
                        StdinMessage::Eof => break,
                    }
                }
            }
            "exit" => {
                exit_code = rest.trim().parse().unwrap();
                break;
            }
            other => {
                let line = format!("sh: {other}: command not found\n");
                let _ = output.send(CommandOutput::StdErr(line.into_bytes())).await;
                exit_code = 127;
                break;
            }
        }
    }
    let _ = output.send(CommandOutput::ExitCode(exit_code)).await;
}

pub struct MockSftp {
    root: PathBuf,
    fault: Option<SftpFault>,
}

impl MockSftp {
    fn local(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SftpChannel for MockSftp {
    async fn metadata(&self, path: &str) -> io::Result<RemoteFileKind> {
        let metadata = tokio::fs::metadata(self.local(path)).await?;
        Ok(if metadata.is_dir() {
            RemoteFileKind::Directory
        } else if metadata.is_file() {
            RemoteFileKind::File
        } else {
            RemoteFileKind::Other
        })
    }

    async fn create_dir(&self, path: &str) -> io::Result<()> {
        if self.fault == Some(SftpFault::DenyMkdir) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("mkdir {path}: permission denied"),
            ));
        }
        tokio::fs::create_dir(self.local(path)).await
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(self.local(path)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if file_type.is_dir() {
                    RemoteFileKind::Directory
                } else {
                    RemoteFileKind::File
                },
            });
        }
        Ok(entries)
    }

    async fn create(&self, path: &str) -> io::Result<RemoteWriter> {
        Ok(Box::new(tokio::fs::File::create(self.local(path)).await?))
    }

    async fn open(&self, path: &str) -> io::Result<RemoteReader> {
        let file = tokio::fs::File::open(self.local(path)).await?;
        if self.fault == Some(SftpFault::BrokenRead) {
            return Ok(Box::new(file.take(4).chain(FailingReader)));
        }
        Ok(Box::new(file))
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader whose every read fails, like a channel that dropped mid-transfer.
struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "channel closed",
        )))
    }
}

/// Client over a fresh mock transport, connecting as `tester`.
pub fn client(
    hosts: &[&str],
    config: ClientConfig,
    sftp_root: impl AsRef<Path>,
) -> (ParallelSshClient, Arc<MockTransport>) {
    let transport = MockTransport::new(sftp_root);
    let client = ParallelSshClient::with_transport(
        hosts.iter().copied(),
        config.with_user("tester"),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    (client, transport)
}
