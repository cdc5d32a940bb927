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

//! Parallel SSH client facade.

use std::path::Path;
use std::sync::Arc;

use crate::auth::AgentRegistry;
use crate::config::{ClientConfig, ConnectionSpec, HostConfigResolver};
use crate::error::{AggregateJoinError, DispatchError};
use crate::executor::{
    join, CommandDispatcher, Joinable, RunOptions, RunOutput, TransferEngine, TransferTask,
};
use crate::ssh::{RusshTransport, SessionPool, Transport};

/// Runs commands and copies files on many hosts at once.
///
/// Every operation snapshots the current host list and resolves one
/// [`ConnectionSpec`] per entry. Sessions are opened lazily on first use and
/// reused by later calls. Operations spawn Tokio tasks and must be called
/// from within a Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use pssh::{ClientConfig, ParallelSshClient, RunOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ParallelSshClient::new(["web1", "web2"], ClientConfig::new());
///     let mut output = client.run_command("uname -a", RunOptions::new())?;
///     output.join(false).await?;
///     for host in output.iter_mut() {
///         for line in host.stdout.collect_lines().await? {
///             println!("{}: {}", host.host, line);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct ParallelSshClient {
    hosts: Vec<String>,
    config: ClientConfig,
    pool: Arc<SessionPool>,
    dispatcher: CommandDispatcher,
    transfers: TransferEngine,
}

impl ParallelSshClient {
    /// Client over the russh transport.
    pub fn new<I, S>(hosts: I, config: ClientConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Arc::new(RusshTransport::new(config.server_check.clone()));
        Self::with_transport(hosts, config, transport)
    }

    /// Client over a caller supplied transport.
    pub fn with_transport<I, S>(hosts: I, config: ClientConfig, transport: Arc<dyn Transport>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = Arc::new(SessionPool::new(
            transport,
            AgentRegistry::new(config.agent.clone()),
            config.connect_timeout,
        ));
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&pool), config.forward_agent, config.host_logger);
        let transfers = TransferEngine::new(Arc::clone(&pool));

        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            config,
            pool,
            dispatcher,
            transfers,
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Replace the target hosts for subsequent calls.
    ///
    /// Results already returned are unaffected and in-flight tasks keep their
    /// sessions. Pooled sessions of hosts no longer listed are dropped.
    pub fn set_hosts<I, S>(&mut self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self.pool.retain_hosts(&self.hosts);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Connection parameters for the current host list, in order.
    pub fn connection_specs(&self) -> Vec<ConnectionSpec> {
        HostConfigResolver::new(&self.config).resolve(&self.hosts)
    }

    /// Run a command on every host.
    ///
    /// Fails before starting anything when the argument sets, template or
    /// encoding are unusable. Host failures are recorded on each host's
    /// output instead.
    pub fn run_command(
        &self,
        template: &str,
        options: RunOptions,
    ) -> Result<RunOutput, DispatchError> {
        let specs = self.connection_specs();
        self.dispatcher.dispatch(&specs, template, &options)
    }

    /// Upload `local` to `remote` on every host.
    pub fn copy_file(
        &self,
        local: impl AsRef<Path>,
        remote: &str,
        recurse: bool,
    ) -> Vec<TransferTask> {
        let specs = self.connection_specs();
        self.transfers.copy_to(&specs, local.as_ref(), remote, recurse)
    }

    /// Download `remote` from every host to `<local><separator><host>`.
    pub fn copy_remote_file(
        &self,
        remote: &str,
        local: impl AsRef<Path>,
        recurse: bool,
        separator: &str,
    ) -> Vec<TransferTask> {
        let specs = self.connection_specs();
        self.transfers
            .copy_from(&specs, remote, local.as_ref(), recurse, separator)
    }

    /// Wait for every task. See [`crate::executor::join`].
    pub async fn join<T: Joinable>(
        &self,
        tasks: &mut [T],
        raise_on_error: bool,
    ) -> Result<(), AggregateJoinError> {
        join(tasks, raise_on_error).await
    }

    /// Disconnect every pooled session.
    pub async fn disconnect(&self) {
        self.pool.clear().await;
    }
}
