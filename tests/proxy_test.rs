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

use common::{client, Behavior, UNREACHABLE_PORT};
use pssh::{ClientConfig, HostError, HostOverride, ProxyConfig, RunOptions};

fn proxied() -> ClientConfig {
    ClientConfig::new().with_proxy(ProxyConfig::new("bastion").with_user("jump"))
}

#[tokio::test]
async fn test_hosts_are_reached_through_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["10.0.0.1", "10.0.0.2"], proxied(), dir.path());

    let mut output = client.run_command("echo inside", RunOptions::new()).unwrap();
    output.join(true).await.unwrap();

    for host in output.iter_mut() {
        assert_eq!(host.stdout.collect_lines().await.unwrap(), vec!["inside"]);
    }

    let opens = transport.opens();
    let proxy_opens: Vec<_> = opens.iter().filter(|o| o.host == "bastion").collect();
    assert_eq!(proxy_opens.len(), 1, "one proxy session shared by every target");
    assert_eq!(proxy_opens[0].user, "jump");
    assert_eq!(proxy_opens[0].via, None);

    for target in ["10.0.0.1", "10.0.0.2"] {
        let record = opens.iter().find(|o| o.host == target).unwrap();
        assert_eq!(record.via.as_deref(), Some("bastion"));
        assert_eq!(record.user, "tester");
    }

    let mut tunnels = transport.tunnels();
    tunnels.sort();
    assert_eq!(
        tunnels,
        vec![
            ("bastion".to_string(), "10.0.0.1".to_string(), 22),
            ("bastion".to_string(), "10.0.0.2".to_string(), 22),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_target_port_fails_only_that_host() {
    let dir = tempfile::tempdir().unwrap();
    let config = proxied().with_host_config("dead", HostOverride::new().with_port(UNREACHABLE_PORT));
    let (client, _) = client(&["dead", "alive"], config, dir.path());

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    let err = output.join(true).await.unwrap_err();

    assert_eq!(err.hosts(), vec!["dead"]);
    match output.get("dead").unwrap().error() {
        Some(HostError::Connection { host, reason }) => {
            assert_eq!(host, "dead");
            assert!(reason.contains("bastion"), "reason was {reason}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }

    let alive = output.get_mut("alive").unwrap();
    assert!(alive.is_success());
    assert_eq!(alive.stdout.collect_lines().await.unwrap(), vec!["ok"]);
}

#[tokio::test]
async fn test_proxy_failure_is_reported_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["t1", "t2"], proxied(), dir.path());
    transport.set_behavior("bastion", Behavior::AuthFail);

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    let err = output.join(true).await.unwrap_err();

    let mut hosts = err.hosts();
    hosts.sort();
    assert_eq!(hosts, vec!["t1", "t2"]);
    for failure in &err.failures {
        assert!(matches!(failure, HostError::Connection { reason, .. } if reason.contains("bastion")));
    }
}

#[tokio::test]
async fn test_host_override_keeps_global_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let config = proxied().with_host_config("t1", HostOverride::new().with_user("other"));
    let (client, transport) = client(&["t1"], config, dir.path());

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    output.join(true).await.unwrap();

    let record = transport
        .opens()
        .into_iter()
        .find(|o| o.host == "t1")
        .unwrap();
    assert_eq!(record.user, "other");
    assert_eq!(record.via.as_deref(), Some("bastion"));
}
