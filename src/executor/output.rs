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

//! Per-host output streams and stdin writers.
//!
//! Each command task owns one line channel per stream. The host task decodes
//! raw chunks into lines as they arrive and pushes them into the channel;
//! readers consume lines in emission order through an [`OutputHandle`].
//! Line channels are unbounded so a task never stalls on a reader that has
//! not started reading yet.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::codec::{encode, Codec, LineDecoder};
use crate::error::{HostError, StreamKind};
use crate::ssh::transport::StdinMessage;

pub type LineResult = Result<String, HostError>;

/// Forward-only sequence of decoded lines from one remote stream.
///
/// Reading past the end keeps returning `None`. A decode error is delivered
/// once, after which the stream is exhausted.
#[derive(Debug)]
pub struct OutputHandle {
    host: String,
    kind: StreamKind,
    receiver: Option<mpsc::UnboundedReceiver<LineResult>>,
}

impl OutputHandle {
    pub(crate) fn new(
        host: &str,
        kind: StreamKind,
        receiver: mpsc::UnboundedReceiver<LineResult>,
    ) -> Self {
        Self {
            host: host.to_string(),
            kind,
            receiver: Some(receiver),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// True once the end of the stream has been observed.
    pub fn is_exhausted(&self) -> bool {
        self.receiver.is_none()
    }

    /// Wait for the next line. `None` at end of stream.
    pub async fn next_line(&mut self) -> Option<LineResult> {
        let receiver = self.receiver.as_mut()?;
        let item = receiver.recv().await;
        if !matches!(item, Some(Ok(_))) {
            self.receiver = None;
        }
        item
    }

    /// Read every remaining line. Stops at the first decode error.
    pub async fn collect_lines(&mut self) -> Result<Vec<String>, HostError> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line?);
        }
        Ok(lines)
    }
}

impl Stream for OutputHandle {
    type Item = LineResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(None);
        };
        match receiver.poll_recv(cx) {
            Poll::Ready(item) => {
                if !matches!(item, Some(Ok(_))) {
                    self.receiver = None;
                }
                Poll::Ready(item)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer side of one output stream, owned by the host task.
pub(crate) struct LineSink {
    host: String,
    kind: StreamKind,
    codec: Codec,
    decoder: LineDecoder,
    sender: Option<mpsc::UnboundedSender<LineResult>>,
    log_lines: bool,
    error: Option<HostError>,
}

impl LineSink {
    pub(crate) fn new(
        host: &str,
        kind: StreamKind,
        codec: Codec,
        sender: mpsc::UnboundedSender<LineResult>,
        log_lines: bool,
    ) -> Self {
        Self {
            host: host.to_string(),
            kind,
            codec,
            decoder: codec.line_decoder(),
            sender: Some(sender),
            log_lines,
            error: None,
        }
    }

    /// Decode a raw chunk and publish the lines it completes.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if self.sender.is_none() {
            return;
        }
        let decoded = self.decoder.push(chunk);
        self.publish(decoded);
    }

    /// Flush the decoder and close the stream. Returns the decode error, if
    /// one ended the stream.
    pub(crate) fn finish(mut self) -> Option<HostError> {
        if self.sender.is_some() {
            let decoded = self.decoder.finish();
            self.publish(decoded);
        }
        self.error
    }

    fn publish(&mut self, decoded: Result<Vec<String>, crate::codec::MalformedInput>) {
        let Some(sender) = &self.sender else {
            return;
        };
        match decoded {
            Ok(lines) => {
                for line in lines {
                    if self.log_lines {
                        info!(target: "pssh::host_logger", "[{}]\t{}", self.host, line);
                    }
                    // The reader may have dropped its handle; lines are discarded then.
                    let _ = sender.send(Ok(line));
                }
            }
            Err(malformed) => {
                let err = HostError::Decode {
                    host: self.host.clone(),
                    stream: self.kind,
                    encoding: self.codec.name().to_string(),
                    reason: malformed.to_string(),
                };
                let _ = sender.send(Err(err.clone()));
                self.error = Some(err);
                self.sender = None;
            }
        }
    }
}

/// Writes to the stdin of one host's remote process.
///
/// Writes issued before the process has started are queued and delivered in
/// order once it starts.
#[derive(Debug, Clone)]
pub struct StdinWriter {
    host: String,
    codec: Codec,
    sender: mpsc::Sender<StdinMessage>,
}

impl StdinWriter {
    pub(crate) fn new(host: &str, codec: Codec, sender: mpsc::Sender<StdinMessage>) -> Self {
        Self {
            host: host.to_string(),
            codec,
            sender,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Write text encoded with the call's codec.
    pub async fn write(&self, text: &str) -> Result<(), HostError> {
        self.write_bytes(encode(&self.codec, text)).await
    }

    pub async fn write_line(&self, line: &str) -> Result<(), HostError> {
        let mut bytes = encode(&self.codec, line);
        bytes.push(b'\n');
        self.write_bytes(bytes).await
    }

    pub async fn write_bytes(&self, bytes: Vec<u8>) -> Result<(), HostError> {
        self.send(StdinMessage::Data(bytes)).await
    }

    /// Resolves once every earlier write has been handed to the channel.
    pub async fn flush(&self) -> Result<(), HostError> {
        let (ack, done) = oneshot::channel();
        self.send(StdinMessage::Flush(ack)).await?;
        done.await.map_err(|_| self.closed())
    }

    /// Signal end of input to the remote process.
    pub async fn close(&self) -> Result<(), HostError> {
        self.send(StdinMessage::Eof).await
    }

    async fn send(&self, message: StdinMessage) -> Result<(), HostError> {
        self.sender.send(message).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> HostError {
        HostError::channel(&self.host, "stdin is closed")
    }
}

/// Deliver queued stdin messages to a started process, preserving order.
pub(crate) async fn forward_stdin(
    mut queued: mpsc::Receiver<StdinMessage>,
    process: mpsc::Sender<StdinMessage>,
) {
    while let Some(message) = queued.recv().await {
        if process.send(message).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sink(kind: StreamKind) -> (LineSink, OutputHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LineSink::new("host1", kind, Codec::utf8(), tx, false),
            OutputHandle::new("host1", kind, rx),
        )
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let (mut sink, mut handle) = sink(StreamKind::Stdout);
        sink.push(b"one\ntw");
        sink.push(b"o\nthree");
        assert!(sink.finish().is_none());

        assert_eq!(
            handle.collect_lines().await.unwrap(),
            vec!["one", "two", "three"]
        );
        assert!(handle.is_exhausted());
        assert!(handle.next_line().await.is_none());
        assert!(handle.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_error_ends_stream() {
        let (mut sink, mut handle) = sink(StreamKind::Stderr);
        sink.push(b"good\n");
        sink.push(&[0xff, 0xfe, b'\n']);
        sink.push(b"ignored\n");
        let err = sink.finish().expect("decode error is recorded");
        assert!(matches!(
            err,
            HostError::Decode {
                stream: StreamKind::Stderr,
                ..
            }
        ));

        assert_eq!(handle.next().await, Some(Ok("good".to_string())));
        assert!(matches!(handle.next().await, Some(Err(HostError::Decode { .. }))));
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded_in_order() {
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (process_tx, mut process_rx) = mpsc::channel(8);
        let writer = StdinWriter::new("host1", Codec::utf8(), queue_tx);

        writer.write_line("first").await.unwrap();
        writer.write("second").await.unwrap();
        tokio::spawn(forward_stdin(queue_rx, process_tx));

        let flush = tokio::spawn({
            let writer = writer.clone();
            async move { writer.flush().await }
        });

        match process_rx.recv().await {
            Some(StdinMessage::Data(bytes)) => assert_eq!(bytes, b"first\n"),
            other => panic!("unexpected {other:?}"),
        }
        match process_rx.recv().await {
            Some(StdinMessage::Data(bytes)) => assert_eq!(bytes, b"second"),
            other => panic!("unexpected {other:?}"),
        }
        match process_rx.recv().await {
            Some(StdinMessage::Flush(ack)) => ack.send(()).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        flush.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_write_after_process_gone_fails() {
        let (queue_tx, queue_rx) = mpsc::channel(8);
        drop(queue_rx);
        let writer = StdinWriter::new("host1", Codec::utf8(), queue_tx);
        let err = writer.write("data").await.unwrap_err();
        assert_eq!(err.host(), "host1");
    }
}
