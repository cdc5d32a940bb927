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

//! Remote process channels.
//!
//! A process runs on its own session channel. A spawned pump task drives the
//! channel: it forwards channel messages to the output queue and writes
//! queued stdin to the channel, preserving write order.

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::connection::ClientHandler;
use crate::ssh::transport::{CommandOutput, ExecRequest, RemoteProcess, StdinMessage};

/// Output chunks buffered between the channel and the consumer.
const OUTPUT_QUEUE_SIZE: usize = 256;

/// Stdin messages buffered before writers wait.
const STDIN_QUEUE_SIZE: usize = 64;

/// Terminal requested for PTY sessions.
const PTY_TERM: &str = "xterm";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 24;

/// Open a channel and start `request.command` on it.
pub(super) async fn start_process(
    handle: &Handle<ClientHandler>,
    request: ExecRequest,
) -> Result<RemoteProcess, super::Error> {
    let channel = handle.channel_open_session().await?;

    if request.forward_agent {
        // Servers may refuse forwarding; the command still runs without it.
        if let Err(e) = channel.agent_forward(false).await {
            debug!("Agent forwarding request failed: {}", e);
        }
    }

    if request.pty {
        channel
            .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
            .await?;
    }

    channel.exec(true, request.command.as_str()).await?;

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_SIZE);
    let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_QUEUE_SIZE);
    tokio::spawn(pump(channel, output_tx, stdin_rx));

    Ok(RemoteProcess {
        output: output_rx,
        stdin: stdin_tx,
    })
}

async fn pump(
    mut channel: Channel<Msg>,
    output: mpsc::Sender<CommandOutput>,
    mut stdin: mpsc::Receiver<StdinMessage>,
) {
    let mut stdin_open = true;

    loop {
        tokio::select! {
            msg = channel.wait() => {
                let Some(msg) = msg else {
                    break;
                };
                let chunk = match msg {
                    ChannelMsg::Data { ref data } => CommandOutput::StdOut(data.to_vec()),
                    ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                        CommandOutput::StdErr(data.to_vec())
                    }
                    // The exit status may arrive before the last data; keep reading
                    // until the channel is closed.
                    ChannelMsg::ExitStatus { exit_status } => CommandOutput::ExitCode(exit_status),
                    other => {
                        trace!("Ignoring channel message {:?}", other);
                        continue;
                    }
                };
                if output.send(chunk).await.is_err() {
                    break;
                }
            }
            // The process handle was dropped, e.g. on a task timeout.
            _ = output.closed() => break,
            msg = stdin.recv(), if stdin_open => {
                match msg {
                    Some(StdinMessage::Data(bytes)) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            debug!("Writing stdin failed: {}", e);
                            stdin_open = false;
                        }
                    }
                    Some(StdinMessage::Flush(ack)) => {
                        let _ = ack.send(());
                    }
                    Some(StdinMessage::Eof) => {
                        if let Err(e) = channel.eof().await {
                            debug!("Sending EOF failed: {}", e);
                        }
                        stdin_open = false;
                    }
                    None => stdin_open = false,
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        trace!("Closing channel failed: {}", e);
    }
}
