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

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

use pssh::{
    cli::{Cli, Commands},
    load_private_key,
    utils::init_logging,
    AgentSource, ClientConfig, HostOutput, ParallelSshClient, PrivateKeySource, ProxyConfig,
    RunOptions, ServerCheckMethod, TransferTask,
};

/// Format a Duration into a human-readable string
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs_f64();

    if total_seconds < 1.0 {
        format!("{:.1} ms", total_seconds * 1000.0)
    } else if total_seconds < 60.0 {
        format!("{total_seconds:.2} s")
    } else {
        let minutes = duration.as_secs() / 60;
        let seconds = duration.as_secs() % 60;
        format!("{minutes}m {seconds}s")
    }
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config =
        ClientConfig::new().with_connect_timeout(Duration::from_secs(cli.connect_timeout));

    if let Some(user) = &cli.user {
        config = config.with_user(user);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(password) = &cli.password {
        config = config.with_password(password);
    }
    if let Some(path) = &cli.identity {
        // Fail here instead of once per host.
        let key = load_private_key(path, cli.identity_passphrase.as_deref())
            .with_context(|| format!("Failed to load identity file {}", path.display()))?;
        config = config.with_private_key(PrivateKeySource::loaded(key));
    }
    if let Some(proxy_host) = &cli.proxy_host {
        let mut proxy = ProxyConfig::new(proxy_host);
        if let Some(user) = &cli.proxy_user {
            proxy = proxy.with_user(user);
        }
        if let Some(port) = cli.proxy_port {
            proxy = proxy.with_port(port);
        }
        config = config.with_proxy(proxy);
    }
    if cli.no_agent {
        config = config
            .with_agent(AgentSource::Disabled)
            .with_forward_agent(false);
    }
    if cli.check_host_keys {
        config = config.with_server_check(ServerCheckMethod::DefaultKnownHostsFile);
    }
    // Output is printed by the binary itself.
    Ok(config.with_host_logger(false))
}

async fn print_host_output(output: &mut HostOutput) -> bool {
    let prefix = format!("[{}]", output.host);

    while let Some(line) = output.stdout.next_line().await {
        match line {
            Ok(line) => println!("{} {}", prefix.cyan(), line),
            Err(e) => eprintln!("{} {}", prefix.cyan(), e.to_string().red()),
        }
    }
    while let Some(line) = output.stderr.next_line().await {
        match line {
            Ok(line) => eprintln!("{} {}", prefix.cyan(), line.yellow()),
            Err(e) => eprintln!("{} {}", prefix.cyan(), e.to_string().red()),
        }
    }

    match (output.error(), output.exit_code()) {
        (Some(error), _) => {
            println!("{} {} {}", "●".red(), prefix, error.to_string().red());
            false
        }
        (None, Some(0)) => {
            println!("{} {} {}", "●".green(), prefix, "exit code 0".green());
            true
        }
        (None, Some(code)) => {
            println!(
                "{} {} {}",
                "●".red(),
                prefix,
                format!("exit code {code}").red()
            );
            false
        }
        (None, None) => {
            println!(
                "{} {} {}",
                "●".yellow(),
                prefix,
                "no exit status".yellow()
            );
            false
        }
    }
}

fn print_transfer(task: &TransferTask, verb: &str) -> bool {
    match (task.error(), task.path()) {
        (Some(error), _) => {
            println!(
                "{} [{}] {}",
                "●".red(),
                task.host(),
                error.to_string().red()
            );
            false
        }
        (None, Some(path)) => {
            println!(
                "{} [{}] {} {}",
                "●".green(),
                task.host(),
                verb.green(),
                path.display()
            );
            true
        }
        (None, None) => false,
    }
}

#[allow(clippy::too_many_arguments)]
async fn exec(
    client: &ParallelSshClient,
    command: &[String],
    no_pty: bool,
    sudo: bool,
    run_as: Option<&str>,
    sudo_password: Option<&str>,
    timeout: Option<u64>,
    encoding: &str,
) -> Result<bool> {
    let mut options = RunOptions::new()
        .with_pty(!no_pty)
        .with_sudo(sudo)
        .with_encoding(encoding);
    if let Some(user) = run_as {
        options = options.with_user(user);
    }
    if let Some(secs) = timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let mut output = client
        .run_command(&command.join(" "), options)
        .context("Failed to start command")?;

    if let Some(password) = sudo_password {
        for host in output.iter() {
            if let Err(e) = host.stdin.write_line(password).await {
                tracing::warn!("Could not send sudo password to {}: {}", host.host, e);
                continue;
            }
            let _ = host.stdin.flush().await;
        }
    }

    // Host failures are reported per host below.
    let _ = output.join(false).await;

    let mut all_ok = true;
    for host in output.iter_mut() {
        all_ok &= print_host_output(host).await;
    }
    Ok(all_ok)
}

async fn transfer(
    client: &ParallelSshClient,
    mut tasks: Vec<TransferTask>,
    verb: &str,
) -> Result<bool> {
    let _ = client.join(&mut tasks, false).await;
    Ok(tasks
        .iter()
        .fold(true, |ok, task| print_transfer(task, verb) && ok))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli)?;
    let client = ParallelSshClient::new(cli.hosts.iter(), config);
    let started = Instant::now();

    let all_ok = match &cli.command {
        Commands::Exec {
            no_pty,
            sudo,
            run_as,
            sudo_password,
            timeout,
            encoding,
            command,
        } => {
            exec(
                &client,
                command,
                *no_pty,
                *sudo,
                run_as.as_deref(),
                sudo_password.as_deref(),
                *timeout,
                encoding,
            )
            .await?
        }
        Commands::Upload {
            source,
            destination,
            recursive,
        } => {
            let tasks = client.copy_file(source, destination, *recursive);
            transfer(&client, tasks, "Uploaded to").await?
        }
        Commands::Download {
            source,
            destination,
            recursive,
            separator,
        } => {
            let tasks = client.copy_remote_file(source, destination, *recursive, separator);
            transfer(&client, tasks, "Downloaded to").await?
        }
    };

    client.disconnect().await;
    eprintln!(
        "{} hosts in {}",
        client.hosts().len(),
        format_duration(started.elapsed())
    );

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}
