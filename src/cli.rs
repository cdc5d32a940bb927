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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pssh",
    version,
    about = "Parallel SSH - run commands and copy files on many hosts at once",
    long_about = "pssh executes a command on every listed host concurrently and prints each host's output.\nHost failures are reported per host and never stop the other hosts.\nFiles are transferred with SFTP; downloads are saved as <destination><separator><host>.",
    after_help = "EXAMPLES:\n  Execute command on hosts:     pssh -H web1,web2 exec uptime\n  Through a bastion:            pssh -H 10.0.0.5,10.0.0.6 --proxy-host bastion exec df -h\n  Upload a directory:           pssh -H web1,web2 upload -r ./conf /etc/app\n  Download from all hosts:      pssh -H web1,web2 download /var/log/syslog ./syslog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'H',
        long,
        required = true,
        value_delimiter = ',',
        help = "Comma-separated list of hosts\nIdentifiers are used verbatim, duplicates run twice"
    )]
    pub hosts: Vec<String>,

    #[arg(short = 'l', long, help = "Username for all hosts [default: current user]")]
    pub user: Option<String>,

    #[arg(short = 'p', long, help = "SSH port for all hosts [default: 22]")]
    pub port: Option<u16>,

    #[arg(
        long,
        env = "PSSH_PASSWORD",
        hide_env_values = true,
        help = "Password for all hosts"
    )]
    pub password: Option<String>,

    #[arg(short = 'i', long, help = "Private key file for all hosts")]
    pub identity: Option<PathBuf>,

    #[arg(
        long,
        env = "PSSH_KEY_PASSPHRASE",
        hide_env_values = true,
        help = "Passphrase of the private key given with --identity"
    )]
    pub identity_passphrase: Option<String>,

    #[arg(long, help = "Reach every host through this proxy host")]
    pub proxy_host: Option<String>,

    #[arg(long, requires = "proxy_host", help = "Username on the proxy host")]
    pub proxy_user: Option<String>,

    #[arg(long, requires = "proxy_host", help = "SSH port of the proxy host")]
    pub proxy_port: Option<u16>,

    #[arg(long, help = "Do not use the SSH agent and do not forward it")]
    pub no_agent: bool,

    #[arg(
        long,
        help = "Verify host keys against ~/.ssh/known_hosts\nHost keys are not verified by default"
    )]
    pub check_host_keys: bool,

    #[arg(
        long,
        default_value = "10",
        help = "Connection and authentication timeout in seconds"
    )]
    pub connect_timeout: u64,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a command on all hosts",
        long_about = "Executes the command on all hosts simultaneously.\nExit codes: 0 (all hosts succeeded), 1 (any host failed or exited non-zero)"
    )]
    Exec {
        #[arg(long, help = "Do not request a pseudo-terminal; keeps stderr separate")]
        no_pty: bool,

        #[arg(long, help = "Run the command through sudo")]
        sudo: bool,

        #[arg(long, help = "Run the command as this user through sudo")]
        run_as: Option<String>,

        #[arg(
            long,
            env = "PSSH_SUDO_PASSWORD",
            hide_env_values = true,
            help = "Password written to stdin for sudo"
        )]
        sudo_password: Option<String>,

        #[arg(long, help = "Per-host timeout in seconds")]
        timeout: Option<u64>,

        #[arg(long, default_value = "utf-8", help = "Encoding of remote output")]
        encoding: String,

        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Upload a file or directory to all hosts")]
    Upload {
        source: PathBuf,

        destination: String,

        #[arg(short = 'r', long, help = "Recursively upload directories")]
        recursive: bool,
    },

    #[command(
        about = "Download a file or directory from all hosts",
        after_help = "Files are saved as <destination><separator><host>, e.g. ./syslog_web1"
    )]
    Download {
        source: String,

        destination: PathBuf,

        #[arg(short = 'r', long, help = "Recursively download directories")]
        recursive: bool,

        #[arg(long, default_value = "_", help = "Separator between path and host name")]
        separator: String,
    },
}
