//! Newline-delimited JSON over a pair of async byte streams.
//!
//! Lets a bridge talk to a host living in another process (a webview shell,
//! a test harness, a socket). One JSON document per line in each direction.
//! Every inbound line is attributed to the single peer origin given at
//! construction. Lines that are not JSON (or not even UTF-8) are surfaced as
//! string payloads so listeners still see them; the correlation layer ignores
//! them. Lines longer than the configured maximum are discarded.

use super::{inbound_channel, InboundSink, InboundSlot};
use crate::domain::envelope::{InboundEnvelope, OutboundEnvelope};
use crate::domain::error::TransportError;
use crate::domain::origin::OriginPolicy;
use crate::ports::outbound::{Delivery, InboundReceiver, Transport};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default cap on a single inbound line, newline excluded (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

pub struct StreamTransport {
    policy: OriginPolicy,
    peer_origin: String,
    outbound: mpsc::UnboundedSender<String>,
    inbound: InboundSlot,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl StreamTransport {
    /// Start the reader and writer tasks on the current runtime.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        peer_origin: impl Into<String>,
        policy: OriginPolicy,
    ) -> Result<Self, TransportError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_max_line(reader, writer, peer_origin, policy, DEFAULT_MAX_LINE_BYTES)
    }

    /// Like [`spawn`](Self::spawn), dropping inbound lines over `max_line_bytes`.
    pub fn spawn_with_max_line<R, W>(
        reader: R,
        writer: W,
        peer_origin: impl Into<String>,
        policy: OriginPolicy,
        max_line_bytes: usize,
    ) -> Result<Self, TransportError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let peer_origin = peer_origin.into();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (sink, slot) = inbound_channel(policy.clone());

        let reader_task = handle.spawn(read_loop(
            reader,
            peer_origin.clone(),
            sink,
            max_line_bytes,
        ));
        let writer_task = handle.spawn(write_loop(writer, outbound_rx));

        debug!(peer_origin = %peer_origin, "Stream transport started");

        Ok(Self {
            policy,
            peer_origin,
            outbound: outbound_tx,
            inbound: slot,
            reader_task,
            writer_task,
        })
    }

    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }
}

impl Transport for StreamTransport {
    fn post(&self, envelope: &OutboundEnvelope) -> Result<Delivery, TransportError> {
        if !self.policy.target().matches(&self.peer_origin) {
            debug!(
                request_id = %envelope.request_id,
                peer_origin = %self.peer_origin,
                "Target origin mismatch, envelope not written"
            );
            return Ok(Delivery::NoCounterpart);
        }

        let line = serde_json::to_string(envelope)?;
        match self.outbound.send(line) {
            Ok(()) => Ok(Delivery::Posted),
            Err(_) => {
                debug!(request_id = %envelope.request_id, "Stream writer closed, envelope dropped");
                Ok(Delivery::NoCounterpart)
            }
        }
    }

    fn take_inbound(&self) -> Result<InboundReceiver, TransportError> {
        self.inbound.take()
    }

    fn origin_policy(&self) -> &OriginPolicy {
        &self.policy
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

async fn read_loop<R>(reader: R, peer_origin: String, sink: InboundSink, max_line_bytes: usize)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    // Set while skipping the tail of an over-long line
    let mut discarding = false;
    let limit = max_line_bytes.saturating_add(1) as u64;

    loop {
        buf.clear();
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(peer_origin = %peer_origin, "Stream peer closed");
                break;
            }
            Ok(_) => {
                let terminated = buf.last() == Some(&b'\n');
                if discarding {
                    discarding = !terminated;
                    continue;
                }
                if !terminated && buf.len() > max_line_bytes {
                    warn!(
                        peer_origin = %peer_origin,
                        max_line_bytes,
                        "Inbound line too long, discarding"
                    );
                    discarding = true;
                    continue;
                }
                if let Some(payload) = decode_line(&buf) {
                    sink.deliver(InboundEnvelope::new(peer_origin.as_str(), payload));
                }
            }
            Err(e) => {
                warn!(peer_origin = %peer_origin, error = %e, "Stream read failed");
                break;
            }
        }
    }
}

/// JSON document, or the (lossily decoded) text itself. `None` for blank lines.
fn decode_line(bytes: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<Value>(line).unwrap_or_else(|e| {
        trace!(error = %e, "Inbound line is not JSON");
        Value::String(line.to_string())
    }))
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = outbound.recv().await {
        line.push('\n');
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Stream write failed, closing writer");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
