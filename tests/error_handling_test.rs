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

use common::{client, Behavior};
use pssh::{ClientConfig, HostError, Joinable, RunOptions};
use std::time::Duration;

#[tokio::test]
async fn test_auth_failure_is_scoped_to_host() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["h1", "bad", "h3"], ClientConfig::new(), dir.path());
    transport.set_behavior("bad", Behavior::AuthFail);

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    client.join(output.as_mut_slice(), false).await.unwrap();

    assert!(matches!(
        output.get("bad").unwrap().error(),
        Some(HostError::Authentication { host, .. }) if host == "bad"
    ));
    for host in ["h1", "h3"] {
        let result = output.get_mut(host).unwrap();
        assert!(result.is_success());
        assert_eq!(result.stdout.collect_lines().await.unwrap(), vec!["ok"]);
    }
}

#[tokio::test]
async fn test_raise_on_error_names_failed_host_and_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["h1", "bad", "h3"], ClientConfig::new(), dir.path());
    transport.set_behavior("bad", Behavior::AuthFail);

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    let err = output.join(true).await.unwrap_err();

    assert_eq!(err.total, 3);
    assert_eq!(err.hosts(), vec!["bad"]);
    assert!(matches!(
        err.error_for("bad"),
        Some(HostError::Authentication { .. })
    ));
    assert!(err.to_string().contains("bad"));

    assert!(output.iter().all(|o| o.is_finished()));
    let h1 = output.get_mut("h1").unwrap();
    assert_eq!(h1.exit_code(), Some(0));
    assert_eq!(h1.stdout.collect_lines().await.unwrap(), vec!["ok"]);
}

#[tokio::test]
async fn test_join_waits_for_slow_hosts_after_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["fast-fail", "slow"], ClientConfig::new(), dir.path());
    transport.set_behavior("fast-fail", Behavior::Unreachable);
    transport.set_behavior("slow", Behavior::Delay(Duration::from_millis(100)));

    let mut output = client.run_command("echo done", RunOptions::new()).unwrap();
    let err = output.join(true).await.unwrap_err();

    assert_eq!(err.hosts(), vec!["fast-fail"]);
    assert!(output.get("slow").unwrap().is_finished());
    assert_eq!(output.get("slow").unwrap().exit_code(), Some(0));
}

#[tokio::test]
async fn test_connect_timeout_is_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new().with_connect_timeout(Duration::from_millis(100));
    let (client, transport) = client(&["stuck", "h2"], config, dir.path());
    transport.set_behavior("stuck", Behavior::Delay(Duration::from_secs(30)));

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    output.join(false).await.unwrap();

    assert!(matches!(
        output.get("stuck").unwrap().error(),
        Some(HostError::Timeout { host, .. }) if host == "stuck"
    ));
    assert!(output.get("h2").unwrap().is_success());
}

#[tokio::test]
async fn test_failed_open_is_retried_on_next_call() {
    let dir = tempfile::tempdir().unwrap();
    let (client, transport) = client(&["flaky"], ClientConfig::new(), dir.path());
    transport.set_behavior("flaky", Behavior::Unreachable);

    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    output.join(false).await.unwrap();
    assert!(output.get("flaky").unwrap().error().is_some());

    transport.set_behavior("flaky", Behavior::Ok);
    let mut output = client.run_command("echo ok", RunOptions::new()).unwrap();
    output.join(true).await.unwrap();
    assert_eq!(transport.opens_for("flaky"), 2);
}

#[tokio::test]
async fn test_task_timeout_expires_long_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&["h1"], ClientConfig::new(), dir.path());

    let options = RunOptions::new().with_timeout(Duration::from_millis(100));
    let mut output = client
        .run_command("echo started; sleep 10000; echo never", options)
        .unwrap();
    output.join(false).await.unwrap();

    let h1 = output.get_mut("h1").unwrap();
    assert!(matches!(h1.error(), Some(HostError::Timeout { .. })));
    assert_eq!(h1.stdout.collect_lines().await.unwrap(), vec!["started"]);
}

#[tokio::test]
async fn test_cancelled_host_reports_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&["h1", "h2"], ClientConfig::new(), dir.path());

    let mut output = client.run_command("sleep 10000", RunOptions::new()).unwrap();
    output.get("h1").unwrap().cancel();
    output.get("h2").unwrap().cancel();
    let err = output.join(true).await.unwrap_err();

    assert_eq!(err.failures.len(), 2);
    assert!(err
        .failures
        .iter()
        .all(|e| matches!(e, HostError::Cancelled { .. })));
    assert!(output.get("h1").unwrap().failure().is_some());
}
