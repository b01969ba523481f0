//! Newline-delimited JSON over any byte stream.
//!
//! Used to talk to an engine that runs as a child process and speaks one
//! JSON object per line on its stdin/stdout.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{trace, warn};

use super::{RequestSink, ResponseSource};
use crate::error::TransportError;

/// Writes one request per line.
pub struct LineSink<W> {
    writer: Mutex<W>,
}

/// Reads one message per line, skipping blank lines.
pub struct LineSource<R> {
    lines: Lines<BufReader<R>>,
}

/// Build both halves of a line transport.
pub fn line_transport<R, W>(reader: R, writer: W) -> (LineSink<W>, LineSource<R>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    (
        LineSink {
            writer: Mutex::new(writer),
        },
        LineSource {
            lines: BufReader::new(reader).lines(),
        },
    )
}

#[async_trait]
impl<W> RequestSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, payload: String) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        trace!(bytes = payload.len(), "Request written");
        Ok(())
    }
}

#[async_trait]
impl<R> ResponseSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Option<String> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(line),
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Failed to read from engine, closing source");
                    return None;
                }
            }
        }
    }
}
