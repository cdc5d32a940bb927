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

//! Authentication identity sources.
//!
//! A system SSH agent serves a bounded number of simultaneous clients. When
//! thousands of hosts are authenticated at once the agent runs out of slots
//! and unrelated hosts fail to connect. Supplying a
//! [`AgentSource::Programmatic`] key list keeps authentication in-process
//! and is the recommended configuration for large fleets.

use russh::keys::PrivateKey;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::keys::load_private_key;
use crate::config::ConnectionSpec;
use crate::error::KeyLoadError;

/// Where authentication identities come from. Exactly one source is active
/// per client.
#[derive(Clone, Default)]
pub enum AgentSource {
    /// The agent reachable through `SSH_AUTH_SOCK`.
    #[default]
    SystemAgent,
    /// No agent is consulted.
    Disabled,
    /// An explicit, ordered list of keys held in memory. The system agent is
    /// never consulted when this is active.
    Programmatic(Vec<Arc<PrivateKey>>),
}

impl AgentSource {
    pub fn programmatic(keys: impl IntoIterator<Item = PrivateKey>) -> Self {
        Self::Programmatic(keys.into_iter().map(Arc::new).collect())
    }

    /// Build a programmatic agent from unencrypted key files, in order.
    pub fn from_key_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, KeyLoadError> {
        let keys = paths
            .iter()
            .map(|path| load_private_key(path, None).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Programmatic(keys))
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, AgentSource::Disabled)
    }
}

impl fmt::Debug for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSource::SystemAgent => write!(f, "SystemAgent"),
            AgentSource::Disabled => write!(f, "Disabled"),
            AgentSource::Programmatic(keys) => {
                write!(f, "Programmatic({} keys)", keys.len())
            }
        }
    }
}

/// Decides which identity source each host uses.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    source: AgentSource,
}

impl AgentRegistry {
    pub fn new(source: AgentSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &AgentSource {
        &self.source
    }

    /// A programmatic agent always wins. Otherwise the host's opt-out
    /// selects [`AgentSource::Disabled`], else the system agent.
    pub fn resolve(&self, spec: &ConnectionSpec) -> AgentSource {
        match &self.source {
            AgentSource::Programmatic(_) => self.source.clone(),
            _ if !spec.use_agent => AgentSource::Disabled,
            _ => AgentSource::SystemAgent,
        }
    }
}
