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

//! Error type of the russh backed transport.

use std::io;

use crate::error::HostError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Address could not be resolved: {0}")]
    AddressInvalid(io::Error),
    #[error("Server host key could not be verified")]
    ServerCheckFailed,
    #[error("SSH agent error: {0}")]
    Agent(String),
    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),
    #[error("SFTP error: {0}")]
    SftpError(#[from] russh_sftp::client::error::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// Attribute this failure to `host`.
    pub fn into_host_error(self, host: &str) -> HostError {
        match self {
            Error::ServerCheckFailed => {
                HostError::connection(host, "host key verification failed")
            }
            other => HostError::connection(host, other),
        }
    }
}
