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

//! Configuration types for the parallel client.

use russh::keys::PrivateKey;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::auth::AgentSource;
use crate::ssh::tokio_client::ServerCheckMethod;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection and authentication must complete within this window.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Private key supplied by the caller, either as a file to load on connect or
/// as already parsed key material.
#[derive(Clone)]
pub enum PrivateKeySource {
    File {
        path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
    Loaded(Arc<PrivateKey>),
}

impl PrivateKeySource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
            passphrase: None,
        }
    }

    pub fn file_with_passphrase(path: impl AsRef<Path>, passphrase: &str) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
            passphrase: Some(Zeroizing::new(passphrase.to_string())),
        }
    }

    pub fn loaded(key: PrivateKey) -> Self {
        Self::Loaded(Arc::new(key))
    }
}

impl fmt::Debug for PrivateKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKeySource::File { path, passphrase } => f
                .debug_struct("File")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            PrivateKeySource::Loaded(key) => f
                .debug_tuple("Loaded")
                .field(&key.algorithm().as_str())
                .finish(),
        }
    }
}

/// Single intermediary host used to reach targets that are not directly
/// reachable. Only one hop is supported.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<Zeroizing<String>>,
    pub private_key: Option<PrivateKeySource>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            password: None,
            private_key: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    pub fn with_private_key(mut self, key: PrivateKeySource) -> Self {
        self.private_key = Some(key);
        self
    }
}

/// Per-host overrides. Every field is optional and wins over the client-wide
/// default individually.
///
/// Proxy settings cannot be expressed per host; a proxy is a client-wide
/// setting only.
#[derive(Debug, Clone, Default)]
pub struct HostOverride {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<Zeroizing<String>>,
    pub private_key: Option<PrivateKeySource>,
    pub use_agent: Option<bool>,
}

impl HostOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    pub fn with_private_key(mut self, key: PrivateKeySource) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_agent(mut self, use_agent: bool) -> Self {
        self.use_agent = Some(use_agent);
        self
    }
}

/// Client-wide defaults and settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<Zeroizing<String>>,
    pub private_key: Option<PrivateKeySource>,
    pub proxy: Option<ProxyConfig>,
    pub host_config: HashMap<String, HostOverride>,
    pub agent: AgentSource,
    pub forward_agent: bool,
    pub connect_timeout: Duration,
    pub server_check: ServerCheckMethod,
    pub host_logger: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: None,
            port: None,
            password: None,
            private_key: None,
            proxy: None,
            host_config: HashMap::new(),
            agent: AgentSource::SystemAgent,
            forward_agent: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_check: ServerCheckMethod::NoCheck,
            host_logger: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    pub fn with_private_key(mut self, key: PrivateKeySource) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add an override for one host identifier. Keys are matched exactly
    /// against the identifiers in the host list.
    pub fn with_host_config(mut self, host: impl Into<String>, config: HostOverride) -> Self {
        self.host_config.insert(host.into(), config);
        self
    }

    pub fn with_agent(mut self, agent: AgentSource) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_forward_agent(mut self, forward_agent: bool) -> Self {
        self.forward_agent = forward_agent;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    /// Log every decoded output line under the `pssh::host_logger` target.
    pub fn with_host_logger(mut self, enabled: bool) -> Self {
        self.host_logger = enabled;
        self
    }
}

/// Resolved proxy hop.
#[derive(Debug, Clone)]
pub struct ProxySpec {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub password: Option<Zeroizing<String>>,
    pub private_key: Option<PrivateKeySource>,
}

impl ProxySpec {
    /// View of the proxy hop as a connection of its own.
    pub fn as_connection_spec(&self, use_agent: bool) -> ConnectionSpec {
        ConnectionSpec {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
            password: self.password.clone(),
            private_key: self.private_key.clone(),
            proxy: None,
            use_agent,
        }
    }
}

/// Concrete, immutable connection parameters for one host.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub password: Option<Zeroizing<String>>,
    pub private_key: Option<PrivateKeySource>,
    pub proxy: Option<ProxySpec>,
    pub use_agent: bool,
}

impl ConnectionSpec {
    /// Minimal spec with default port and no credentials.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            password: None,
            private_key: None,
            proxy: None,
            use_agent: true,
        }
    }

    /// Parameters identifying where a pooled session points.
    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            user: self.user.clone(),
            port: self.port,
            proxy: self
                .proxy
                .as_ref()
                .map(|p| (p.host.clone(), p.port, p.user.clone())),
        }
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {}@{}:{}", proxy.user, proxy.host, proxy.port)?;
        }
        Ok(())
    }
}

/// Target parameters a pooled session was opened with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user: String,
    pub port: u16,
    pub proxy: Option<(String, u16, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new();
        assert!(config.forward_agent);
        assert!(matches!(config.agent, AgentSource::SystemAgent));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(config.proxy.is_none());
        assert!(!config.host_logger);
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKeySource::file_with_passphrase("/home/u/.ssh/id_rsa", "hunter2");
        let debug = format!("{key:?}");
        assert!(debug.contains("id_rsa"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_connection_spec_display_with_proxy() {
        let mut spec = ConnectionSpec::new("10.0.0.5", "admin");
        spec.proxy = Some(ProxySpec {
            host: "bastion".to_string(),
            user: "jump".to_string(),
            port: 2222,
            password: None,
            private_key: None,
        });
        assert_eq!(spec.to_string(), "admin@10.0.0.5:22 via jump@bastion:2222");
    }

    #[test]
    fn test_session_key_tracks_retargeting() {
        let a = ConnectionSpec::new("h", "u");
        let mut b = a.clone();
        assert_eq!(a.session_key(), b.session_key());
        b.port = 2200;
        assert_ne!(a.session_key(), b.session_key());
    }
}
