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

//! Error types for the parallel execution engine.
//!
//! Host-scoped failures ([`HostError`]) are captured on the per-host result
//! and never abort other hosts. [`DispatchError`] is raised eagerly before
//! any host task is started. [`AggregateJoinError`] is produced by the join
//! barrier once every task has reached a terminal state.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::auth::keys::KeyFormat;
use crate::executor::template::TemplateError;

/// Which output stream of a remote process a line or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// A failure attributed to exactly one target host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// Every authentication method offered for the host was rejected.
    #[error("authentication failed for {user}@{host}: {reason}")]
    Authentication {
        host: String,
        user: String,
        reason: String,
    },

    /// Network level failure, including tunnel open failures through a proxy.
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// Connection or task deadline expired.
    #[error("operation on {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// A private key configured for this host could not be loaded.
    #[error("private key for {host} could not be loaded: {source}")]
    KeyLoad {
        host: String,
        #[source]
        source: KeyLoadError,
    },

    /// Remote output could not be decoded with the configured codec.
    #[error("failed to decode {stream} of {host} as {encoding}: {reason}")]
    Decode {
        host: String,
        stream: StreamKind,
        encoding: String,
        reason: String,
    },

    /// File transfer failure for one host.
    #[error("transfer of '{path}' on {host} failed: {reason}")]
    Transfer {
        host: String,
        path: String,
        kind: io::ErrorKind,
        reason: String,
    },

    /// Channel level failure while starting or driving a remote process.
    #[error("channel error on {host}: {reason}")]
    Channel { host: String, reason: String },

    /// The host task was aborted before completion.
    #[error("task for {host} was cancelled")]
    Cancelled { host: String },
}

impl HostError {
    /// Host this error is scoped to.
    pub fn host(&self) -> &str {
        match self {
            HostError::Authentication { host, .. }
            | HostError::Connection { host, .. }
            | HostError::Timeout { host, .. }
            | HostError::KeyLoad { host, .. }
            | HostError::Decode { host, .. }
            | HostError::Transfer { host, .. }
            | HostError::Channel { host, .. }
            | HostError::Cancelled { host } => host,
        }
    }

    pub(crate) fn connection(host: &str, reason: impl fmt::Display) -> Self {
        HostError::Connection {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn channel(host: &str, reason: impl fmt::Display) -> Self {
        HostError::Channel {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transfer(host: &str, path: impl fmt::Display, err: &io::Error) -> Self {
        HostError::Transfer {
            host: host.to_string(),
            path: path.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// One failed attempt to parse key material in a particular encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttempt {
    pub format: KeyFormat,
    pub reason: String,
}

fn describe_attempts(attempts: &[KeyAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.format, a.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure to load a private key from a file or from memory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyLoadError {
    /// The key file itself could not be read.
    #[error("cannot read private key file '{path}': {reason}")]
    Io {
        path: String,
        kind: io::ErrorKind,
        reason: String,
    },

    /// The data was read but no supported key encoding accepted it.
    #[error("'{origin}' is not a usable private key; tried {}", describe_attempts(.attempts))]
    Unrecognized {
        origin: String,
        attempts: Vec<KeyAttempt>,
    },
}

impl KeyLoadError {
    /// Formats that were attempted before giving up, in order.
    pub fn attempted_formats(&self) -> Vec<KeyFormat> {
        match self {
            KeyLoadError::Io { .. } => Vec::new(),
            KeyLoadError::Unrecognized { attempts, .. } => {
                attempts.iter().map(|a| a.format).collect()
            }
        }
    }
}

/// Errors raised before any host task is started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Fewer per-host argument sets than hosts.
    #[error("{args} host argument sets supplied for {hosts} hosts")]
    Arity { hosts: usize, args: usize },

    /// The command template could not be rendered for one host.
    #[error("cannot render command for {host} (argument set {index}): {source}")]
    Template {
        host: String,
        index: usize,
        #[source]
        source: TemplateError,
    },

    /// The requested output encoding is unknown.
    #[error("unknown output encoding '{label}'")]
    UnknownEncoding { label: String },
}

/// Raised by the join barrier when `raise_on_error` is set and at least one
/// host failed. Every failed host's error is kept; successful results stay
/// available on the joined collection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} of {total} hosts failed: {}", .failures.len(), summarize(.failures))]
pub struct AggregateJoinError {
    pub total: usize,
    pub failures: Vec<HostError>,
}

fn summarize(failures: &[HostError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AggregateJoinError {
    /// Hosts that failed, in task order.
    pub fn hosts(&self) -> Vec<&str> {
        self.failures.iter().map(HostError::host).collect()
    }

    /// First error recorded for `host`.
    pub fn error_for(&self, host: &str) -> Option<&HostError> {
        self.failures.iter().find(|e| e.host() == host)
    }
}
