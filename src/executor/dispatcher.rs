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

//! Fan-out of one command to many hosts.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::output::{forward_stdin, LineSink, OutputHandle, StdinWriter};
use super::result_types::{HostOutput, RunOutput};
use super::template::{CommandTemplate, HostArgs};
use crate::auth::AgentSource;
use crate::codec::{Codec, DEFAULT_ENCODING};
use crate::config::ConnectionSpec;
use crate::error::{DispatchError, HostError, StreamKind};
use crate::ssh::transport::{CommandOutput, ExecRequest, RemoteProcess};
use crate::ssh::SessionPool;

/// Stdin messages queued per host before writers wait.
const STDIN_QUEUE_SIZE: usize = 64;

/// Per-call execution settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// One argument set per host, in host order.
    pub host_args: Option<Vec<HostArgs>>,
    pub sudo: bool,
    /// Run the command as this user through sudo.
    pub user: Option<String>,
    pub use_pty: bool,
    pub encoding: String,
    /// Deadline for each host task, including connecting.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            host_args: None,
            sudo: false,
            user: None,
            use_pty: true,
            encoding: DEFAULT_ENCODING.to_string(),
            timeout: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<HostArgs>,
    {
        self.host_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_pty(mut self, use_pty: bool) -> Self {
        self.use_pty = use_pty;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Render the command for every host.
///
/// Without argument sets the template is used verbatim. With them, every host
/// must have one; the check happens before anything is rendered.
pub fn render_commands(
    template: &str,
    hosts: &[&str],
    host_args: Option<&[HostArgs]>,
) -> Result<Vec<String>, DispatchError> {
    let Some(host_args) = host_args else {
        return Ok(vec![template.to_string(); hosts.len()]);
    };

    if host_args.len() < hosts.len() {
        return Err(DispatchError::Arity {
            hosts: hosts.len(),
            args: host_args.len(),
        });
    }
    let Some(first) = hosts.first() else {
        return Ok(Vec::new());
    };

    let parsed = CommandTemplate::parse(template).map_err(|source| DispatchError::Template {
        host: first.to_string(),
        index: 0,
        source,
    })?;

    hosts
        .iter()
        .zip(host_args)
        .enumerate()
        .map(|(index, (host, args))| {
            parsed
                .render(args)
                .map_err(|source| DispatchError::Template {
                    host: host.to_string(),
                    index,
                    source,
                })
        })
        .collect()
}

/// Wrap a command for privilege elevation. The password must be written to
/// the task's stdin by the caller.
pub fn wrap_sudo(command: &str, sudo: bool, user: Option<&str>) -> String {
    if !sudo && user.is_none() {
        return command.to_string();
    }
    let escaped = command.replace('\'', r"'\''");
    match user {
        Some(user) => format!("sudo -u {user} -S $SHELL -c '{escaped}'"),
        None => format!("sudo -S $SHELL -c '{escaped}'"),
    }
}

/// Starts one task per host against a shared session pool.
pub struct CommandDispatcher {
    pool: Arc<SessionPool>,
    forward_agent: bool,
    host_logger: bool,
}

impl CommandDispatcher {
    pub fn new(pool: Arc<SessionPool>, forward_agent: bool, host_logger: bool) -> Self {
        Self {
            pool,
            forward_agent,
            host_logger,
        }
    }

    /// Render every command, then spawn one task per spec. Nothing is spawned
    /// when rendering fails.
    pub fn dispatch(
        &self,
        specs: &[ConnectionSpec],
        template: &str,
        options: &RunOptions,
    ) -> Result<RunOutput, DispatchError> {
        let codec = Codec::for_label(&options.encoding).ok_or_else(|| {
            DispatchError::UnknownEncoding {
                label: options.encoding.clone(),
            }
        })?;
        let hosts: Vec<&str> = specs.iter().map(|spec| spec.host.as_str()).collect();
        let commands = render_commands(template, &hosts, options.host_args.as_deref())?;

        let outputs = specs
            .iter()
            .zip(commands)
            .map(|(spec, command)| {
                let command = wrap_sudo(&command, options.sudo, options.user.as_deref());
                self.spawn_host(spec.clone(), command, options, codec)
            })
            .collect();
        Ok(RunOutput::new(outputs))
    }

    fn spawn_host(
        &self,
        spec: ConnectionSpec,
        command: String,
        options: &RunOptions,
        codec: Codec,
    ) -> HostOutput {
        let host = spec.host.clone();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_QUEUE_SIZE);

        let forward_agent = self.forward_agent
            && matches!(self.pool.agents().resolve(&spec), AgentSource::SystemAgent);
        let run = HostRun {
            pool: Arc::clone(&self.pool),
            request: ExecRequest {
                command,
                pty: options.use_pty,
                forward_agent,
            },
            stdout: LineSink::new(&host, StreamKind::Stdout, codec, stdout_tx, self.host_logger),
            stderr: LineSink::new(&host, StreamKind::Stderr, codec, stderr_tx, self.host_logger),
            stdin: stdin_rx,
            spec,
        };

        let timeout = options.timeout;
        let task_host = host.clone();
        let handle = tokio::spawn(async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, run.execute())
                    .await
                    .unwrap_or_else(|_| {
                        Err(HostError::Timeout {
                            host: task_host,
                            timeout: limit,
                        })
                    }),
                None => run.execute().await,
            }
        });

        HostOutput::new(
            &host,
            OutputHandle::new(&host, StreamKind::Stdout, stdout_rx),
            OutputHandle::new(&host, StreamKind::Stderr, stderr_rx),
            StdinWriter::new(&host, codec, stdin_tx),
            handle,
        )
    }
}

/// Everything one host task needs.
struct HostRun {
    pool: Arc<SessionPool>,
    spec: ConnectionSpec,
    request: ExecRequest,
    stdout: LineSink,
    stderr: LineSink,
    stdin: mpsc::Receiver<crate::ssh::transport::StdinMessage>,
}

impl HostRun {
    async fn execute(self) -> Result<Option<u32>, HostError> {
        let HostRun {
            pool,
            spec,
            request,
            mut stdout,
            mut stderr,
            stdin,
        } = self;

        let session = pool.acquire(&spec).await?;
        debug!("Executing on {}: {}", spec.host, request.command);

        // With a PTY the remote merges both streams; stderr stays empty.
        let merged = request.pty;
        let RemoteProcess {
            mut output,
            stdin: process_stdin,
        } = session.exec(request).await?;
        let forwarder = tokio::spawn(forward_stdin(stdin, process_stdin));

        let mut exit_code = None;
        while let Some(chunk) = output.recv().await {
            match chunk {
                CommandOutput::StdOut(data) => stdout.push(&data),
                CommandOutput::StdErr(data) if merged => stdout.push(&data),
                CommandOutput::StdErr(data) => stderr.push(&data),
                CommandOutput::ExitCode(code) => exit_code = Some(code),
            }
        }
        forwarder.abort();

        let stdout_error = stdout.finish();
        let stderr_error = stderr.finish();
        match stdout_error.or(stderr_error) {
            Some(err) => Err(err),
            None => {
                debug!("{} exited with {:?}", spec.host, exit_code);
                Ok(exit_code)
            }
        }
    }
}
