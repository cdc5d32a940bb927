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

//! Parallel SFTP uploads and downloads.
//!
//! Every host gets its own task and its own SFTP channel over the host's
//! pooled session. Downloads from many hosts share one local filesystem, so
//! each host's copy is written to `<local><separator><host>`.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::result_types::TransferTask;
use crate::config::ConnectionSpec;
use crate::error::HostError;
use crate::ssh::transport::{RemoteFileKind, SftpChannel};
use crate::ssh::SessionPool;

pub const DEFAULT_SUFFIX_SEPARATOR: &str = "_";

type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HostError>> + Send + 'a>>;

/// Local destination of one host's download.
pub fn download_path(local: &Path, separator: &str, host: &str) -> PathBuf {
    let mut name = OsString::from(local.as_os_str());
    name.push(separator);
    name.push(host);
    PathBuf::from(name)
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn remote_parent(path: &str) -> Option<&str> {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

/// Starts per-host transfer tasks.
pub struct TransferEngine {
    pool: Arc<SessionPool>,
}

impl TransferEngine {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }

    /// Upload `local` to `remote` on every host.
    pub fn copy_to(
        &self,
        specs: &[ConnectionSpec],
        local: &Path,
        remote: &str,
        recurse: bool,
    ) -> Vec<TransferTask> {
        specs
            .iter()
            .map(|spec| {
                let upload = Upload {
                    pool: Arc::clone(&self.pool),
                    spec: spec.clone(),
                    local: local.to_path_buf(),
                    remote: remote.to_string(),
                    recurse,
                };
                TransferTask::new(&spec.host, tokio::spawn(upload.run()))
            })
            .collect()
    }

    /// Download `remote` from every host to `<local><separator><host>`.
    pub fn copy_from(
        &self,
        specs: &[ConnectionSpec],
        remote: &str,
        local: &Path,
        recurse: bool,
        separator: &str,
    ) -> Vec<TransferTask> {
        specs
            .iter()
            .map(|spec| {
                let download = Download {
                    pool: Arc::clone(&self.pool),
                    spec: spec.clone(),
                    remote: remote.to_string(),
                    local: download_path(local, separator, &spec.host),
                    recurse,
                };
                TransferTask::new(&spec.host, tokio::spawn(download.run()))
            })
            .collect()
    }
}

struct Upload {
    pool: Arc<SessionPool>,
    spec: ConnectionSpec,
    local: PathBuf,
    remote: String,
    recurse: bool,
}

impl Upload {
    async fn run(self) -> Result<PathBuf, HostError> {
        let host = self.spec.host.as_str();
        let metadata = tokio::fs::metadata(&self.local)
            .await
            .map_err(|e| HostError::transfer(host, self.local.display(), &e))?;
        if metadata.is_dir() && !self.recurse {
            return Err(HostError::Transfer {
                host: host.to_string(),
                path: self.local.display().to_string(),
                kind: io::ErrorKind::InvalidInput,
                reason: "is a directory; enable recurse to copy directories".to_string(),
            });
        }

        let session = self.pool.acquire(&self.spec).await?;
        let sftp = session.open_sftp().await?;

        let result = if metadata.is_dir() {
            debug!("Uploading directory {} to {}:{}", self.local.display(), host, self.remote);
            match make_remote_dirs(sftp.as_ref(), host, &self.remote).await {
                Ok(()) => upload_dir(sftp.as_ref(), host, &self.local, &self.remote).await,
                Err(e) => Err(e),
            }
        } else {
            debug!("Uploading {} to {}:{}", self.local.display(), host, self.remote);
            let parent = remote_parent(&self.remote);
            match parent {
                Some(parent) => make_remote_dirs(sftp.as_ref(), host, parent).await,
                None => Ok(()),
            }?;
            upload_file(sftp.as_ref(), host, &self.local, &self.remote).await
        };

        if let Err(e) = sftp.close().await {
            debug!("Closing sftp channel on {} failed: {}", host, e);
        }
        result.map(|()| PathBuf::from(&self.remote))
    }
}

/// Create `path` and every missing parent on the remote host.
async fn make_remote_dirs(sftp: &dyn SftpChannel, host: &str, path: &str) -> Result<(), HostError> {
    let mut current = if path.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    for component in path.split('/').filter(|c| !c.is_empty()) {
        current = if current.is_empty() {
            component.to_string()
        } else {
            join_remote(&current, component)
        };

        match sftp.metadata(&current).await {
            Ok(RemoteFileKind::Directory) => continue,
            Ok(_) => {
                return Err(HostError::Transfer {
                    host: host.to_string(),
                    path: current,
                    kind: io::ErrorKind::AlreadyExists,
                    reason: "exists and is not a directory".to_string(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => sftp
                .create_dir(&current)
                .await
                .map_err(|e| HostError::transfer(host, &current, &e))?,
            Err(e) => return Err(HostError::transfer(host, &current, &e)),
        }
    }
    Ok(())
}

async fn upload_file(
    sftp: &dyn SftpChannel,
    host: &str,
    local: &Path,
    remote: &str,
) -> Result<(), HostError> {
    let mut source = tokio::fs::File::open(local)
        .await
        .map_err(|e| HostError::transfer(host, local.display(), &e))?;
    let mut target = sftp
        .create(remote)
        .await
        .map_err(|e| HostError::transfer(host, remote, &e))?;

    tokio::io::copy(&mut source, &mut target)
        .await
        .map_err(|e| HostError::transfer(host, remote, &e))?;
    target
        .shutdown()
        .await
        .map_err(|e| HostError::transfer(host, remote, &e))
}

/// Upload the contents of `local_dir` into the existing `remote_dir`.
fn upload_dir<'a>(
    sftp: &'a dyn SftpChannel,
    host: &'a str,
    local_dir: &'a Path,
    remote_dir: &'a str,
) -> TransferFuture<'a> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(local_dir)
            .await
            .map_err(|e| HostError::transfer(host, local_dir.display(), &e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HostError::transfer(host, local_dir.display(), &e))?
        {
            let path = entry.path();
            let remote_path = join_remote(remote_dir, &entry.file_name().to_string_lossy());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| HostError::transfer(host, path.display(), &e))?;

            if file_type.is_dir() {
                make_remote_dirs(sftp, host, &remote_path).await?;
                upload_dir(sftp, host, &path, &remote_path).await?;
            } else if file_type.is_file() {
                upload_file(sftp, host, &path, &remote_path).await?;
            } else {
                debug!("Skipping {}: not a regular file", path.display());
            }
        }
        Ok(())
    })
}

struct Download {
    pool: Arc<SessionPool>,
    spec: ConnectionSpec,
    remote: String,
    local: PathBuf,
    recurse: bool,
}

impl Download {
    async fn run(self) -> Result<PathBuf, HostError> {
        let host = self.spec.host.as_str();
        let session = self.pool.acquire(&self.spec).await?;
        let sftp = session.open_sftp().await?;

        let result = match sftp.metadata(&self.remote).await {
            Ok(RemoteFileKind::Directory) if self.recurse => {
                debug!("Downloading directory {}:{} to {}", host, self.remote, self.local.display());
                download_dir(sftp.as_ref(), host, &self.remote, &self.local).await
            }
            Ok(RemoteFileKind::Directory) => Err(HostError::Transfer {
                host: host.to_string(),
                path: self.remote.clone(),
                kind: io::ErrorKind::InvalidInput,
                reason: "is a directory; enable recurse to copy directories".to_string(),
            }),
            Ok(_) => {
                debug!("Downloading {}:{} to {}", host, self.remote, self.local.display());
                download_file(sftp.as_ref(), host, &self.remote, &self.local).await
            }
            Err(e) => Err(HostError::transfer(host, &self.remote, &e)),
        };

        if let Err(e) = sftp.close().await {
            debug!("Closing sftp channel on {} failed: {}", host, e);
        }
        result.map(|()| self.local.clone())
    }
}

async fn download_file(
    sftp: &dyn SftpChannel,
    host: &str,
    remote: &str,
    local: &Path,
) -> Result<(), HostError> {
    if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HostError::transfer(host, parent.display(), &e))?;
    }

    let mut source = sftp
        .open(remote)
        .await
        .map_err(|e| HostError::transfer(host, remote, &e))?;
    let mut target = tokio::fs::File::create(local)
        .await
        .map_err(|e| HostError::transfer(host, local.display(), &e))?;

    let copied = match tokio::io::copy(&mut source, &mut target).await {
        Ok(_) => target
            .flush()
            .await
            .map_err(|e| HostError::transfer(host, local.display(), &e)),
        Err(e) => Err(HostError::transfer(host, remote, &e)),
    };
    if copied.is_err() {
        drop(target);
        // A partial copy must not look like a finished download.
        if let Err(e) = tokio::fs::remove_file(local).await {
            debug!("Removing partial download {} failed: {}", local.display(), e);
        }
    }
    copied
}

fn download_dir<'a>(
    sftp: &'a dyn SftpChannel,
    host: &'a str,
    remote_dir: &'a str,
    local_dir: &'a Path,
) -> TransferFuture<'a> {
    Box::pin(async move {
        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|e| HostError::transfer(host, local_dir.display(), &e))?;

        let entries = sftp
            .read_dir(remote_dir)
            .await
            .map_err(|e| HostError::transfer(host, remote_dir, &e))?;

        for entry in entries {
            let remote_path = join_remote(remote_dir, &entry.name);
            let local_path = local_dir.join(&entry.name);
            match entry.kind {
                RemoteFileKind::Directory => {
                    download_dir(sftp, host, &remote_path, &local_path).await?
                }
                RemoteFileKind::File => {
                    download_file(sftp, host, &remote_path, &local_path).await?
                }
                RemoteFileKind::Other => debug!("Skipping {}: not a regular file", remote_path),
            }
        }
        Ok(())
    })
}
