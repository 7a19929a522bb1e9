// copilot-mcp - Line transport
//! Newline-delimited JSON over a byte stream.
//!
//! Every input line is one inbound message and is handled on its own task,
//! so a slow upstream call never blocks the reader. Output lines are written
//! under a mutex; one `write` is always exactly one line.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::{MessageHandler, Transport};
use crate::error::BridgeResult;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct LineTransport {
    writer: Mutex<BoxedWriter>,
}

impl LineTransport {
    pub fn new<W>(writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            writer: Mutex::new(Box::new(writer)),
        })
    }

    /// Transport bound to the process stdout.
    pub fn stdout() -> Arc<Self> {
        Self::new(tokio::io::stdout())
    }

    /// Read lines until EOF, handing each to `handler`. In-flight messages
    /// are drained before returning.
    pub async fn serve<R>(self: Arc<Self>, reader: R, handler: Arc<dyn MessageHandler>) -> BridgeResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.split(b'\n');
        let mut inflight = JoinSet::new();
        let transport: Arc<dyn Transport> = self;

        tracing::info!("line transport: reading requests");

        let outcome: BridgeResult<()> = loop {
            tokio::select! {
                line = lines.next_segment() => match line {
                    Ok(Some(bytes)) => {
                        let line = decode_line(&bytes);
                        let handler = handler.clone();
                        let transport = transport.clone();
                        inflight.spawn(async move { handler.on_message(line, transport).await });
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => {
                        tracing::error!("line transport: input stream failed: {}", e);
                        break Err(e.into());
                    }
                },
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("line transport: message task failed: {}", e);
                    }
                }
            }
        };

        let pending = inflight.len();
        if pending > 0 {
            tracing::debug!("line transport: input closed, draining {} message(s)", pending);
        }
        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                tracing::error!("line transport: message task failed: {}", e);
            }
        }

        tracing::info!("line transport: input closed");
        outcome
    }
}

/// Undecodable bytes become U+FFFD so the dispatcher can answer with a
/// parse error instead of the stream failing.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[async_trait]
impl Transport for LineTransport {
    async fn write(&self, message: Value) -> BridgeResult<()> {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
