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

//! SFTP channel backed by russh-sftp.
//!
//! Some sshd_config does not enable sftp by default. A config line like
//! `Subsystem sftp internal-sftp` or `Subsystem sftp /usr/lib/openssh/sftp-server`
//! is needed on the remote machine.

use async_trait::async_trait;
use russh::client::Handle;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{OpenFlags, StatusCode};
use std::io;

use super::connection::ClientHandler;
use crate::ssh::transport::{RemoteEntry, RemoteFileKind, RemoteReader, RemoteWriter, SftpChannel};

pub struct RusshSftp {
    sftp: SftpSession,
}

impl RusshSftp {
    /// Start the sftp subsystem on a new channel.
    pub(super) async fn open(handle: &Handle<ClientHandler>) -> Result<Self, super::Error> {
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(Self { sftp })
    }
}

fn to_io_error(err: SftpError) -> io::Error {
    let kind = match &err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => io::ErrorKind::NotFound,
            StatusCode::PermissionDenied => io::ErrorKind::PermissionDenied,
            _ => io::ErrorKind::Other,
        },
        SftpError::Timeout => io::ErrorKind::TimedOut,
        // Servers that answer without a status still name the cause.
        other => {
            let message = other.to_string();
            if message.contains("No such file") || message.contains("not found") {
                io::ErrorKind::NotFound
            } else if message.contains("Permission denied") {
                io::ErrorKind::PermissionDenied
            } else {
                io::ErrorKind::Other
            }
        }
    };
    io::Error::new(kind, err.to_string())
}

#[async_trait]
impl SftpChannel for RusshSftp {
    async fn metadata(&self, path: &str) -> io::Result<RemoteFileKind> {
        let metadata = self.sftp.metadata(path).await.map_err(to_io_error)?;
        let file_type = metadata.file_type();
        Ok(if file_type.is_dir() {
            RemoteFileKind::Directory
        } else if file_type.is_file() {
            RemoteFileKind::File
        } else {
            RemoteFileKind::Other
        })
    }

    async fn create_dir(&self, path: &str) -> io::Result<()> {
        self.sftp.create_dir(path).await.map_err(to_io_error)
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<RemoteEntry>> {
        let entries = self.sftp.read_dir(path).await.map_err(to_io_error)?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let file_type = entry.metadata().file_type();
                let kind = if file_type.is_dir() {
                    RemoteFileKind::Directory
                } else if file_type.is_file() {
                    RemoteFileKind::File
                } else {
                    RemoteFileKind::Other
                };
                RemoteEntry {
                    name: entry.file_name(),
                    kind,
                }
            })
            .collect())
    }

    async fn create(&self, path: &str) -> io::Result<RemoteWriter> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(to_io_error)?;
        Ok(Box::new(file))
    }

    async fn open(&self, path: &str) -> io::Result<RemoteReader> {
        let file = self
            .sftp
            .open_with_flags(path, OpenFlags::READ)
            .await
            .map_err(to_io_error)?;
        Ok(Box::new(file))
    }

    async fn close(&self) -> io::Result<()> {
        self.sftp.close().await.map_err(to_io_error)
    }
}
