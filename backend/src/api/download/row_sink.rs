//! Destinations for download rows.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use common::search_query::DownloadFormat;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[async_trait]
pub trait RowSink: Send {
    async fn write_row(&mut self, row: &[String]) -> anyhow::Result<()>;

    async fn flush(&mut self) -> anyhow::Result<()>;
}

/// Buffered size before bytes are handed to the writer.
const FLUSH_THRESHOLD: usize = 64 * 1024;

/// CSV or TSV rows over any async writer.
pub struct DelimitedSink<W> {
    writer: W,
    delimiter: u8,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin + Send> DelimitedSink<W> {
    pub fn new(writer: W, format: DownloadFormat) -> Self {
        Self { writer, delimiter: format.delimiter(), buffer: BytesMut::with_capacity(FLUSH_THRESHOLD) }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn encode(&mut self, row: &[String]) {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                self.buffer.put_u8(self.delimiter);
            }
            let needs_quotes = value
                .bytes()
                .any(|b| b == self.delimiter || b == b'"' || b == b'\n' || b == b'\r');
            if needs_quotes {
                self.buffer.put_u8(b'"');
                self.buffer.put_slice(value.replace('"', "\"\"").as_bytes());
                self.buffer.put_u8(b'"');
            } else {
                self.buffer.put_slice(value.as_bytes());
            }
        }
        self.buffer.put_u8(b'\n');
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RowSink for DelimitedSink<W> {
    async fn write_row(&mut self, row: &[String]) -> anyhow::Result<()> {
        self.encode(row);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            let chunk = self.buffer.split().freeze();
            self.writer.write_all(&chunk).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if !self.buffer.is_empty() {
            let chunk = self.buffer.split().freeze();
            self.writer.write_all(&chunk).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Vec<String>>>,
    flushes: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().clone()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn write_row(&mut self, row: &[String]) -> anyhow::Result<()> {
        self.rows.lock().push(row.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        *self.flushes.lock() += 1;
        Ok(())
    }
}
