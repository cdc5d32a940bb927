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

//! Forwarded channels through a proxy session.

use std::time::Duration;
use tracing::debug;

use crate::error::HostError;
use crate::ssh::transport::{ChannelEndpoint, Session};

/// Opens `direct-tcpip` channels on proxy sessions for target hosts.
#[derive(Debug, Clone)]
pub struct TunnelBroker {
    open_timeout: Duration,
}

impl TunnelBroker {
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }

    /// Open a channel from `proxy` to `target_host:target_port`.
    ///
    /// Failures are scoped to the target host; the proxy session stays usable
    /// for other targets.
    pub async fn open_tunnel(
        &self,
        proxy: &dyn Session,
        target_host: &str,
        target_port: u16,
    ) -> Result<ChannelEndpoint, HostError> {
        debug!(
            "Opening tunnel to {}:{} via {}",
            target_host,
            target_port,
            proxy.host()
        );

        let stream = tokio::time::timeout(
            self.open_timeout,
            proxy.open_direct_tcpip(target_host, target_port),
        )
        .await
        .map_err(|_| HostError::Timeout {
            host: target_host.to_string(),
            timeout: self.open_timeout,
        })?
        .map_err(|e| {
            HostError::connection(
                target_host,
                format!("tunnel via {} failed: {}", proxy.host(), reason_of(&e)),
            )
        })?;

        Ok(ChannelEndpoint {
            proxy: proxy.host().to_string(),
            target_host: target_host.to_string(),
            target_port,
            stream,
        })
    }
}

fn reason_of(err: &HostError) -> String {
    match err {
        HostError::Connection { reason, .. } | HostError::Channel { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
