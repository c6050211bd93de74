//! Message source abstraction for device message ingestion.
//!
//! Provides a unified trait for reading inbound device messages from
//! different transports: stdin and files (JSON lines, as written by the
//! `simulation` binary) and pre-loaded replays for tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::types::InboundMessage;

/// Events produced by a message source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A message was read.
    Message(InboundMessage),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where inbound device messages come from.
///
/// The processing loop calls [`next_message`](MessageSource::next_message) in
/// a `select!` with cancellation.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Read the next message.
    ///
    /// Returns `SourceEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable read errors.
    async fn next_message(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "stdin", "file").
    fn source_name(&self) -> &str;
}

/// Read one JSON-lines message, skipping blank and malformed lines.
async fn read_json_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buffer: &mut String,
    source: &str,
) -> Result<SourceEvent> {
    loop {
        buffer.clear();
        let bytes = reader.read_line(buffer).await?;
        if bytes == 0 {
            return Ok(SourceEvent::Eof);
        }
        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundMessage>(line) {
            Ok(message) => return Ok(SourceEvent::Message(message)),
            Err(e) => {
                warn!(source, error = %e, "Skipping malformed message line");
            }
        }
    }
}

// ============================================================================
// Stdin Source
// ============================================================================

/// Reads JSON-lines messages from stdin.
///
/// Used with the simulation harness:
/// `simulation --vehicles 5 | fleet-sentinel --stdin`
pub struct StdinSource {
    reader: BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(2048),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for StdinSource {
    async fn next_message(&mut self) -> Result<SourceEvent> {
        read_json_line(&mut self.reader, &mut self.line_buffer, "stdin").await
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// File Source
// ============================================================================

/// Reads JSON-lines messages from a file.
pub struct FileSource {
    reader: BufReader<tokio::fs::File>,
    line_buffer: String,
    name: String,
}

impl FileSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open message file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            line_buffer: String::with_capacity(2048),
            name: format!("file:{}", path.display()),
        })
    }
}

#[async_trait]
impl MessageSource for FileSource {
    async fn next_message(&mut self) -> Result<SourceEvent> {
        read_json_line(&mut self.reader, &mut self.line_buffer, &self.name).await
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-loaded messages with optional inter-message delay.
pub struct ReplaySource {
    messages: std::vec::IntoIter<InboundMessage>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(messages: Vec<InboundMessage>, delay_ms: u64) -> Self {
        Self {
            messages: messages.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn next_message(&mut self) -> Result<SourceEvent> {
        // No delay before the first message
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.messages.next() {
            Some(m) => {
                self.yielded_first = true;
                Ok(SourceEvent::Message(m))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
