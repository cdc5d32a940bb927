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

//! Merge of client-wide defaults and per-host overrides.

use super::types::{ClientConfig, ConnectionSpec, ProxySpec, DEFAULT_SSH_PORT};
use crate::auth::AgentSource;

/// Produces one [`ConnectionSpec`] per host identifier.
///
/// Overrides win field by field. Overrides keyed by identifiers absent from
/// the host list are never consulted.
pub struct HostConfigResolver<'a> {
    config: &'a ClientConfig,
    default_user: String,
}

impl<'a> HostConfigResolver<'a> {
    pub fn new(config: &'a ClientConfig) -> Self {
        let default_user = config.user.clone().unwrap_or_else(current_username);
        Self {
            config,
            default_user,
        }
    }

    /// Resolve every host in order; duplicates yield duplicate specs.
    pub fn resolve(&self, hosts: &[String]) -> Vec<ConnectionSpec> {
        hosts.iter().map(|host| self.resolve_host(host)).collect()
    }

    pub fn resolve_host(&self, host: &str) -> ConnectionSpec {
        let config = self.config;
        let host_override = config.host_config.get(host);

        let user = host_override
            .and_then(|o| o.user.clone())
            .unwrap_or_else(|| self.default_user.clone());
        let port = host_override
            .and_then(|o| o.port)
            .or(config.port)
            .unwrap_or(DEFAULT_SSH_PORT);
        let password = host_override
            .and_then(|o| o.password.clone())
            .or_else(|| config.password.clone());
        let private_key = host_override
            .and_then(|o| o.private_key.clone())
            .or_else(|| config.private_key.clone());
        let use_agent = host_override
            .and_then(|o| o.use_agent)
            .unwrap_or(!matches!(config.agent, AgentSource::Disabled));

        ConnectionSpec {
            host: host.to_string(),
            user,
            port,
            password,
            private_key,
            proxy: self.resolve_proxy(),
            use_agent,
        }
    }

    fn resolve_proxy(&self) -> Option<ProxySpec> {
        self.config.proxy.as_ref().map(|proxy| ProxySpec {
            host: proxy.host.clone(),
            user: proxy
                .user
                .clone()
                .unwrap_or_else(|| self.default_user.clone()),
            port: proxy.port.unwrap_or(DEFAULT_SSH_PORT),
            password: proxy.password.clone(),
            private_key: proxy.private_key.clone(),
        })
    }
}

fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| whoami::username())
}
