// Copyright 2026 Edgereach Contributors
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

//! Newline-delimited JSON-RPC transport: one message per line of UTF-8
//! JSON on stdin/stdout. Supersedes the teacher's length-prefixed binary
//! framing — the line-delimited channel is this contract's framing.

use crate::protocol::JsonRpcResponse;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transport closed")]
    Closed,
}

/// One line in, one line out. `recv` returns `Ok(None)` on clean EOF
/// (stdin closed) rather than an error, so the server loop can
/// distinguish "caller hung up" from "malformed line".
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError>;
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError>;
}

pub struct StdioTransport {
    lines: Lines<BufReader<tokio::io::Stdin>>,
    writer: BufWriter<tokio::io::Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            writer: BufWriter::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.lines.next_line().await?)
    }

    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory channel-backed transport for tests.
pub struct BufferTransport {
    input: tokio::sync::mpsc::Receiver<String>,
    output: tokio::sync::mpsc::Sender<String>,
}

impl BufferTransport {
    pub fn new(input: tokio::sync::mpsc::Receiver<String>, output: tokio::sync::mpsc::Sender<String>) -> Self {
        Self { input, output }
    }
}

#[async_trait::async_trait]
impl Transport for BufferTransport {
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.input.recv().await)
    }

    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.output.send(line.to_string()).await.map_err(|_| TransportError::Closed)
    }
}

pub fn encode_response(response: &JsonRpcResponse) -> Result<String, TransportError> {
    Ok(serde_json::to_string(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcId, JsonRpcResponse};

    #[tokio::test]
    async fn buffer_transport_round_trips_one_line() {
        let (in_tx, in_rx) = tokio::sync::mpsc::channel(4);
        let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(4);
        let mut transport = BufferTransport::new(in_rx, out_tx);

        in_tx.send(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.to_string()).await.unwrap();
        let line = transport.recv_line().await.unwrap().unwrap();
        assert!(line.contains("ping"));

        let response = JsonRpcResponse::success(JsonRpcId::Number(1), serde_json::json!({}));
        transport.send_line(&encode_response(&response).unwrap()).await.unwrap();
        let sent = out_rx.recv().await.unwrap();
        assert!(sent.contains("\"result\""));
    }

    #[tokio::test]
    async fn buffer_transport_recv_none_on_closed_input() {
        let (in_tx, in_rx) = tokio::sync::mpsc::channel(4);
        let (out_tx, _out_rx) = tokio::sync::mpsc::channel(4);
        drop(in_tx);
        let mut transport = BufferTransport::new(in_rx, out_tx);
        assert!(transport.recv_line().await.unwrap().is_none());
    }
}
