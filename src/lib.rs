//! Parallel remote command execution and file transfer over SSH.
//!
//! [`ParallelSshClient`] turns one logical operation into one concurrent
//! task per host. Each host's failures stay on that host's result; the join
//! barrier waits for every host and optionally raises an aggregate error.

pub mod auth;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod jump;
pub mod ssh;
pub mod utils;

pub use auth::{load_private_key, parse_private_key, AgentSource};
pub use client::ParallelSshClient;
pub use codec::Codec;
pub use config::{ClientConfig, ConnectionSpec, HostOverride, PrivateKeySource, ProxyConfig};
pub use error::{AggregateJoinError, DispatchError, HostError, KeyLoadError, StreamKind};
pub use executor::{
    join, HostArgs, HostOutput, Joinable, OutputHandle, RunOptions, RunOutput, StdinWriter,
    TransferTask,
};
pub use ssh::ServerCheckMethod;
