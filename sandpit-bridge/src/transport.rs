//! JSON-lines transport for envelopes crossing a real process boundary.
//!
//! Each [`Envelope`] is one JSON object terminated by `\n`. Blank lines are
//! ignored, malformed lines are logged and skipped so one bad peer write does
//! not tear down the link.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::protocol::Envelope;

/// Errors from the envelope transport.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge channel closed")]
    Closed,
}

/// Serialize an envelope into a single line, newline included.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, BridgeError> {
    let mut line = serde_json::to_string(envelope).map_err(BridgeError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Parse one line into an envelope.
pub fn decode_envelope(line: &str) -> Result<Envelope, BridgeError> {
    serde_json::from_str(line.trim()).map_err(BridgeError::Decode)
}

/// Drain `rx` into `writer` until every sender is dropped.
///
/// Returns the number of envelopes written.
pub async fn write_envelopes<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) -> Result<usize, BridgeError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(envelope) = rx.recv().await {
        let line = encode_envelope(&envelope)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        written += 1;
    }
    log::debug!("transport: writer done after {} envelopes", written);
    Ok(written)
}

/// Read envelopes from `reader` into `tx` until EOF.
///
/// Returns the number of envelopes forwarded, or [`BridgeError::Closed`] if
/// the receiving side hung up first.
pub async fn read_envelopes<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<Envelope>,
) -> Result<usize, BridgeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut forwarded = 0;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match decode_envelope(&line) {
            Ok(envelope) => {
                tx.send(envelope).map_err(|_| BridgeError::Closed)?;
                forwarded += 1;
            }
            Err(e) => {
                log::warn!("transport: skipping malformed line: {}", e);
            }
        }
    }
    log::debug!("transport: reader hit EOF after {} envelopes", forwarded);
    Ok(forwarded)
}
