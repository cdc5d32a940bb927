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

//! Per-host session pool.
//!
//! At most one live session exists per host. Opening is serialized per host
//! through a [`OnceCell`]; different hosts open concurrently. Proxy sessions
//! are pooled separately and shared by every target that uses the same hop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::auth::AgentRegistry;
use crate::config::{ConnectionSpec, ProxySpec, SessionKey};
use crate::error::HostError;
use crate::jump::TunnelBroker;
use crate::ssh::transport::{Endpoint, Session, Transport};

type SessionCell = Arc<OnceCell<Arc<dyn Session>>>;

struct PoolSlot {
    key: SessionKey,
    cell: SessionCell,
}

impl PoolSlot {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Reusable when opened with the same parameters and not closed since.
    fn reusable_for(&self, key: &SessionKey) -> bool {
        self.key == *key
            && self
                .cell
                .get()
                .map(|session| !session.is_closed())
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProxyKey {
    host: String,
    port: u16,
    user: String,
}

impl From<&ProxySpec> for ProxyKey {
    fn from(proxy: &ProxySpec) -> Self {
        Self {
            host: proxy.host.clone(),
            port: proxy.port,
            user: proxy.user.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lazily opened sessions keyed by host identifier.
pub struct SessionPool {
    transport: Arc<dyn Transport>,
    agents: AgentRegistry,
    broker: TunnelBroker,
    connect_timeout: Duration,
    slots: Mutex<HashMap<String, PoolSlot>>,
    proxies: Mutex<HashMap<ProxyKey, SessionCell>>,
}

impl SessionPool {
    pub fn new(
        transport: Arc<dyn Transport>,
        agents: AgentRegistry,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            agents,
            broker: TunnelBroker::new(connect_timeout),
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
            proxies: Mutex::new(HashMap::new()),
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Session for `spec.host`, opening it if absent, closed, or opened with
    /// different parameters. Concurrent callers for the same host wait for a
    /// single in-flight open.
    pub async fn acquire(&self, spec: &ConnectionSpec) -> Result<Arc<dyn Session>, HostError> {
        let cell = self.slot_for(spec);
        let session = tokio::time::timeout(
            self.connect_timeout,
            cell.get_or_try_init(|| self.open(spec)),
        )
        .await
        .map_err(|_| HostError::Timeout {
            host: spec.host.clone(),
            timeout: self.connect_timeout,
        })??;
        Ok(Arc::clone(session))
    }

    fn slot_for(&self, spec: &ConnectionSpec) -> SessionCell {
        let key = spec.session_key();
        let mut slots = lock(&self.slots);
        match slots.get(&spec.host) {
            Some(slot) if slot.reusable_for(&key) => Arc::clone(&slot.cell),
            _ => {
                debug!("Opening new pool slot for {}", spec);
                let slot = PoolSlot::new(key);
                let cell = Arc::clone(&slot.cell);
                slots.insert(spec.host.clone(), slot);
                cell
            }
        }
    }

    async fn open(&self, spec: &ConnectionSpec) -> Result<Arc<dyn Session>, HostError> {
        let agent = self.agents.resolve(spec);
        let endpoint = match &spec.proxy {
            None => Endpoint::direct(spec),
            Some(proxy) => {
                let proxy_session = self.acquire_proxy(proxy).await.map_err(|e| {
                    HostError::connection(
                        &spec.host,
                        format!("proxy {} unavailable: {}", proxy.host, e),
                    )
                })?;
                Endpoint::Tunnel(
                    self.broker
                        .open_tunnel(proxy_session.as_ref(), &spec.host, spec.port)
                        .await?,
                )
            }
        };
        self.transport.open(spec, endpoint, &agent).await
    }

    async fn acquire_proxy(&self, proxy: &ProxySpec) -> Result<Arc<dyn Session>, HostError> {
        let cell = {
            let mut proxies = lock(&self.proxies);
            let cell = proxies.entry(ProxyKey::from(proxy)).or_default();
            if cell.get().is_some_and(|session| session.is_closed()) {
                *cell = Arc::default();
            }
            Arc::clone(cell)
        };

        let proxy_spec = proxy.as_connection_spec(!self.agents.source().is_disabled());
        let session = cell
            .get_or_try_init(|| async {
                let agent = self.agents.resolve(&proxy_spec);
                self.transport
                    .open(&proxy_spec, Endpoint::direct(&proxy_spec), &agent)
                    .await
            })
            .await?;
        Ok(Arc::clone(session))
    }

    /// Drop the session for `host` and disconnect it.
    pub async fn release(&self, host: &str) {
        let slot = lock(&self.slots).remove(host);
        if let Some(session) = slot.and_then(|slot| slot.cell.get().cloned()) {
            session.disconnect().await;
        }
    }

    /// Forget the session for `host` so the next acquire re-opens it. Tasks
    /// still holding the old session keep using it; the connection closes
    /// when the last of them drops its handle.
    pub fn invalidate(&self, host: &str) {
        lock(&self.slots).remove(host);
    }

    /// Drop sessions of every host not in `hosts`. As with [`invalidate`],
    /// a session closes once no in-flight task holds it. Proxy sessions are
    /// shared by every target and stay pooled until [`clear`].
    ///
    /// [`invalidate`]: SessionPool::invalidate
    /// [`clear`]: SessionPool::clear
    pub fn retain_hosts(&self, hosts: &[String]) {
        lock(&self.slots).retain(|host, _| hosts.iter().any(|h| h == host));
    }

    /// Number of hosts with a pool slot.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every target and proxy session.
    pub async fn clear(&self) {
        let targets: Vec<SessionCell> = lock(&self.slots)
            .drain()
            .map(|(_, slot)| slot.cell)
            .collect();
        let proxies: Vec<SessionCell> = lock(&self.proxies).drain().map(|(_, c)| c).collect();

        for cell in targets.into_iter().chain(proxies) {
            if let Some(session) = cell.get() {
                session.disconnect().await;
            }
        }
    }
}
