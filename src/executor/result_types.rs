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

//! Result types for parallel execution operations.

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

use super::join::{join, Joinable};
use super::output::{OutputHandle, StdinWriter};
use crate::error::{AggregateJoinError, HostError};

/// State of one spawned per-host task.
#[derive(Debug)]
pub(crate) enum HostTask<T> {
    Pending(JoinHandle<Result<T, HostError>>),
    Finished(Result<T, HostError>),
}

impl<T> HostTask<T> {
    async fn wait(&mut self, host: &str) {
        let result = match self {
            HostTask::Pending(handle) => match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(HostError::Cancelled {
                    host: host.to_string(),
                }),
                Err(e) => Err(HostError::channel(host, format!("host task panicked: {e}"))),
            },
            HostTask::Finished(_) => return,
        };
        *self = HostTask::Finished(result);
    }

    fn result(&self) -> Option<&Result<T, HostError>> {
        match self {
            HostTask::Pending(_) => None,
            HostTask::Finished(result) => Some(result),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            HostTask::Pending(handle) => handle.is_finished(),
            HostTask::Finished(_) => true,
        }
    }

    fn abort(&self) {
        if let HostTask::Pending(handle) = self {
            handle.abort();
        }
    }
}

/// Output of one command task.
///
/// `stdout` and `stderr` are live: they can be read while the command is
/// still running. The exit code and error are available after a join.
#[derive(Debug)]
pub struct HostOutput {
    pub host: String,
    pub stdout: OutputHandle,
    pub stderr: OutputHandle,
    pub stdin: StdinWriter,
    task: HostTask<Option<u32>>,
}

impl HostOutput {
    pub(crate) fn new(
        host: &str,
        stdout: OutputHandle,
        stderr: OutputHandle,
        stdin: StdinWriter,
        handle: JoinHandle<Result<Option<u32>, HostError>>,
    ) -> Self {
        Self {
            host: host.to_string(),
            stdout,
            stderr,
            stdin,
            task: HostTask::Pending(handle),
        }
    }

    /// Exit status reported by the remote process. `None` until joined, when
    /// the host failed, or when the channel closed without a status.
    pub fn exit_code(&self) -> Option<u32> {
        match self.task.result() {
            Some(Ok(code)) => *code,
            _ => None,
        }
    }

    /// Error recorded for this host, after a join.
    pub fn error(&self) -> Option<&HostError> {
        match self.task.result() {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Abort the host task. It is reported as cancelled after a join.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Wait for this host's task only.
    pub async fn wait(&mut self) -> Result<Option<u32>, HostError> {
        self.task.wait(&self.host).await;
        match self.task.result() {
            Some(Ok(code)) => Ok(*code),
            Some(Err(e)) => Err(e.clone()),
            None => Err(HostError::Cancelled {
                host: self.host.clone(),
            }),
        }
    }
}

impl Joinable for HostOutput {
    fn host(&self) -> &str {
        &self.host
    }

    fn wait(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.task.wait(&self.host))
    }

    fn failure(&self) -> Option<&HostError> {
        self.error()
    }
}

/// One host's file transfer.
#[derive(Debug)]
pub struct TransferTask {
    host: String,
    task: HostTask<PathBuf>,
}

impl TransferTask {
    pub(crate) fn new(host: &str, handle: JoinHandle<Result<PathBuf, HostError>>) -> Self {
        Self {
            host: host.to_string(),
            task: HostTask::Pending(handle),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path written by the transfer: the local file for downloads, the
    /// remote file for uploads. Available after a join.
    pub fn path(&self) -> Option<&Path> {
        match self.task.result() {
            Some(Ok(path)) => Some(path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&HostError> {
        match self.task.result() {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.task.result(), Some(Ok(_)))
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Joinable for TransferTask {
    fn host(&self) -> &str {
        &self.host
    }

    fn wait(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.task.wait(&self.host))
    }

    fn failure(&self) -> Option<&HostError> {
        self.error()
    }
}

/// Per-host outputs of one `run_command` call, in host list order.
/// Duplicate host identifiers produce separate entries.
#[derive(Debug, Default)]
pub struct RunOutput {
    outputs: Vec<HostOutput>,
}

impl RunOutput {
    pub(crate) fn new(outputs: Vec<HostOutput>) -> Self {
        Self { outputs }
    }

    /// First entry for `host`.
    pub fn get(&self, host: &str) -> Option<&HostOutput> {
        self.outputs.iter().find(|o| o.host == host)
    }

    pub fn get_mut(&mut self, host: &str) -> Option<&mut HostOutput> {
        self.outputs.iter_mut().find(|o| o.host == host)
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.host.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HostOutput> {
        self.outputs.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, HostOutput> {
        self.outputs.iter_mut()
    }

    pub fn as_mut_slice(&mut self) -> &mut [HostOutput] {
        &mut self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Wait for every host. See [`join`].
    pub async fn join(&mut self, raise_on_error: bool) -> Result<(), AggregateJoinError> {
        join(&mut self.outputs, raise_on_error).await
    }
}

impl IntoIterator for RunOutput {
    type Item = HostOutput;
    type IntoIter = std::vec::IntoIter<HostOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.into_iter()
    }
}

impl<'a> IntoIterator for &'a RunOutput {
    type Item = &'a HostOutput;
    type IntoIter = std::slice::Iter<'a, HostOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.iter()
    }
}

impl<'a> IntoIterator for &'a mut RunOutput {
    type Item = &'a mut HostOutput;
    type IntoIter = std::slice::IterMut<'a, HostOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_task_reports_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(PathBuf::from("/never"))
        });
        let mut task = TransferTask::new("slow", handle);
        task.cancel();
        join(std::slice::from_mut(&mut task), false).await.unwrap();
        assert!(matches!(task.error(), Some(HostError::Cancelled { host }) if host == "slow"));
        assert!(task.path().is_none());
    }

    #[tokio::test]
    async fn test_finished_task_keeps_result() {
        let handle = tokio::spawn(async { Ok(PathBuf::from("/tmp/out_host")) });
        let mut task = TransferTask::new("host", handle);
        join(std::slice::from_mut(&mut task), true).await.unwrap();
        assert!(task.is_success());
        assert_eq!(task.path(), Some(Path::new("/tmp/out_host")));
    }
}
