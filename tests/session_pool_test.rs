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

mod common;

use common::client;
use pssh::{ClientConfig, HostOverride, RunOptions};

async fn run_ok(client: &pssh::ParallelSshClient) {
    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    output.join(true).await.unwrap();
}

#[tokio::test]
async fn test_sessions_are_reused_across_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["h1", "h2"], ClientConfig::new(), dir.path());

    run_ok(&client).await;
    run_ok(&client).await;
    run_ok(&client).await;

    assert_eq!(transport.opens_for("h1"), 1);
    assert_eq!(transport.opens_for("h2"), 1);
    assert_eq!(client.pool().len(), 2);
    assert_eq!(transport.live_sessions(), 2);
}

#[tokio::test]
async fn test_closed_session_is_reopened() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["h1"], ClientConfig::new(), dir.path());

    run_ok(&client).await;
    client.pool().release("h1").await;
    assert_eq!(transport.live_sessions(), 0);
    assert!(client.pool().is_empty());

    run_ok(&client).await;
    assert_eq!(transport.opens_for("h1"), 2);
}

#[tokio::test]
async fn test_changed_parameters_retarget_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = common::MockTransport::new(dir.path());

    let first = pssh::ParallelSshClient::with_transport(
        ["h1"],
        ClientConfig::new().with_user("alice"),
        transport.clone(),
    );
    run_ok(&first).await;

    // A spec with another port for the same host id must not reuse the slot.
    let spec_a = first.connection_specs().remove(0);
    let mut spec_b = spec_a.clone();
    spec_b.port = 2222;
    first.pool().acquire(&spec_b).await.unwrap();
    first.pool().acquire(&spec_b).await.unwrap();

    let ports: Vec<u16> = transport.opens().iter().map(|o| o.port).collect();
    assert_eq!(ports, vec![22, 2222]);
}

#[tokio::test]
async fn test_set_hosts_drops_removed_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, transport) = client(&["h1", "h2"], ClientConfig::new(), dir.path());

    run_ok(&client).await;
    assert_eq!(transport.live_sessions(), 2);
    client.set_hosts(["h2", "h3"]);
    assert_eq!(client.pool().len(), 1);
    // Nothing else holds h1's session, so dropping it from the pool closes it.
    assert_eq!(transport.live_sessions(), 1);

    run_ok(&client).await;
    assert_eq!(transport.live_sessions(), 2);
    assert_eq!(transport.opens_for("h2"), 1);
    assert_eq!(transport.opens_for("h3"), 1);
    assert_eq!(client.hosts().to_vec(), vec!["h2", "h3"]);
}

#[tokio::test]
async fn test_disconnect_closes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new()
        .with_proxy(pssh::ProxyConfig::new("bastion"))
        .with_host_config("h2", HostOverride::new().with_port(2200));
    let (client, transport) = client(&["h1", "h2"], config, dir.path());

    run_ok(&client).await;
    assert_eq!(transport.live_sessions(), 3);

    client.disconnect().await;
    assert_eq!(transport.live_sessions(), 0);
    assert!(client.pool().is_empty());
}

#[tokio::test]
async fn test_concurrent_acquires_open_once() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["h1"; 8], ClientConfig::new(), dir.path());
    transport.set_behavior("h1", common::Behavior::Delay(std::time::Duration::from_millis(50)));

    run_ok(&client).await;
    assert_eq!(transport.opens_for("h1"), 1);
    assert_eq!(transport.execs().len(), 8);
}
