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

//! SSH authentication methods and server verification.
//!
//! Every host gets an ordered plan of methods built from its resolved
//! [`ConnectionSpec`] and identity source:
//! - Password, when configured
//! - The explicitly configured private key
//! - Keys of the programmatic agent, or the system agent
//! - Default identity files, only when no explicit credential was given
//!
//! Each method is tried in turn until the server accepts one.

use russh::client::Handle;
use russh::keys::agent::client::{AgentClient, AgentStream};
use russh::keys::{ssh_key, PrivateKey, PrivateKeyWithHashAlg};
use russh::{AgentAuthError, CryptoVec, Signer};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use super::connection::ClientHandler;
use crate::auth::keys::{default_identity_files, load_private_key, resolve_key};
use crate::auth::AgentSource;
use crate::config::ConnectionSpec;
use crate::error::HostError;

/// One way of proving identity to a server.
#[derive(Clone)]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKey(Arc<PrivateKey>),
    /// Identities held by the agent behind `SSH_AUTH_SOCK`.
    Agent,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => write!(f, "Password([REDACTED])"),
            AuthMethod::PrivateKey(key) => write!(f, "PrivateKey({})", key.algorithm().as_str()),
            AuthMethod::Agent => write!(f, "Agent"),
        }
    }
}

impl AuthMethod {
    /// Convenience method to create a [`AuthMethod`] from a string literal.
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    fn label(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::PrivateKey(_) => "publickey",
            AuthMethod::Agent => "agent",
        }
    }
}

/// Server host key verification methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// Accept any host key.
    #[default]
    NoCheck,
    /// Verify against a specific base64 encoded public key
    PublicKey(String),
    /// Verify against a public key file
    PublicKeyFile(String),
    /// Use default known_hosts file (~/.ssh/known_hosts)
    DefaultKnownHostsFile,
    /// Use a specific known_hosts file path
    KnownHostsFile(String),
}

impl ServerCheckMethod {
    /// Convenience method to create a [`ServerCheckMethod`] from a string literal.
    pub fn with_public_key(key: &str) -> Self {
        Self::PublicKey(key.to_string())
    }

    /// Convenience method to create a [`ServerCheckMethod`] from a string literal.
    pub fn with_public_key_file(key_file_name: &str) -> Self {
        Self::PublicKeyFile(key_file_name.to_string())
    }

    /// Convenience method to create a [`ServerCheckMethod`] from a string literal.
    pub fn with_known_hosts_file(known_hosts_file: &str) -> Self {
        Self::KnownHostsFile(known_hosts_file.to_string())
    }
}

/// Ordered authentication plan for one host.
///
/// An explicit key that cannot be loaded is a host error. Default identity
/// files that fail to load (typically because they are encrypted) are skipped.
pub fn auth_plan(spec: &ConnectionSpec, agent: &AgentSource) -> Result<Vec<AuthMethod>, HostError> {
    let mut methods = Vec::new();

    if let Some(password) = &spec.password {
        methods.push(AuthMethod::Password(password.clone()));
    }

    if let Some(source) = &spec.private_key {
        let key = resolve_key(source).map_err(|source| HostError::KeyLoad {
            host: spec.host.clone(),
            source,
        })?;
        methods.push(AuthMethod::PrivateKey(key));
    }

    match agent {
        AgentSource::Programmatic(keys) => {
            methods.extend(keys.iter().cloned().map(AuthMethod::PrivateKey));
        }
        AgentSource::SystemAgent => methods.push(AuthMethod::Agent),
        AgentSource::Disabled => {}
    }

    if spec.password.is_none() && spec.private_key.is_none() {
        for path in default_identity_files() {
            match load_private_key(&path, None) {
                Ok(key) => methods.push(AuthMethod::PrivateKey(Arc::new(key))),
                Err(e) => debug!("Skipping identity file {}: {}", path.display(), e),
            }
        }
    }

    Ok(methods)
}

/// Send-safe signer over an agent connection. The public key is cloned before
/// the signing future is built so the future only holds owned values.
struct AgentSigner<'a> {
    agent: &'a mut AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>,
}

impl Signer for AgentSigner<'_> {
    type Error = AgentAuthError;

    fn auth_publickey_sign(
        &mut self,
        key: &ssh_key::PublicKey,
        hash_alg: Option<ssh_key::HashAlg>,
        to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let key_owned = key.clone();
        async move {
            self.agent
                .sign_request(&key_owned, hash_alg, to_sign)
                .await
                .map_err(Into::into)
        }
    }
}

/// Try every method in order. On failure returns one reason per method.
pub(super) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    methods: Vec<AuthMethod>,
) -> Result<(), Vec<String>> {
    if methods.is_empty() {
        return Err(vec!["no authentication methods available".to_string()]);
    }

    let mut reasons = Vec::with_capacity(methods.len());
    for method in methods {
        let label = method.label();
        match try_method(handle, username, method).await {
            Ok(true) => {
                debug!("Authenticated {} with {}", username, label);
                return Ok(());
            }
            Ok(false) => reasons.push(format!("{label} rejected")),
            Err(e) => reasons.push(format!("{label}: {e}")),
        }
    }
    Err(reasons)
}

async fn try_method(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    method: AuthMethod,
) -> Result<bool, super::Error> {
    match method {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, &**password).await?;
            Ok(result.success())
        }
        AuthMethod::PrivateKey(key) => {
            let result = handle
                .authenticate_publickey(
                    username,
                    PrivateKeyWithHashAlg::new(key, handle.best_supported_rsa_hash().await?.flatten()),
                )
                .await?;
            Ok(result.success())
        }
        AuthMethod::Agent => authenticate_with_agent(handle, username).await,
    }
}

#[cfg(not(target_os = "windows"))]
async fn authenticate_with_agent(
    handle: &mut Handle<ClientHandler>,
    username: &str,
) -> Result<bool, super::Error> {
    let mut agent = AgentClient::connect_env()
        .await
        .map_err(|e| super::Error::Agent(format!("cannot connect: {e}")))?
        .dynamic();

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| super::Error::Agent(format!("cannot list identities: {e}")))?;

    if identities.is_empty() {
        return Err(super::Error::Agent("no identities".to_string()));
    }

    for identity in identities {
        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
        let result = handle
            .authenticate_publickey_with(
                username,
                identity.clone(),
                hash_alg,
                &mut AgentSigner { agent: &mut agent },
            )
            .await;

        match result {
            Ok(auth_result) if auth_result.success() => return Ok(true),
            Ok(_) => debug!("Agent key {} rejected", identity.comment()),
            Err(e) => debug!("Agent signing failed for {}: {}", identity.comment(), e),
        }
    }

    Ok(false)
}

#[cfg(target_os = "windows")]
async fn authenticate_with_agent(
    _handle: &mut Handle<ClientHandler>,
    _username: &str,
) -> Result<bool, super::Error> {
    Err(super::Error::Agent(
        "SSH agent is not supported on this platform".to_string(),
    ))
}
