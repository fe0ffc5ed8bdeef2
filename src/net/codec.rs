//! Newline-delimited JSON framing over async byte streams.
//!
//! One message per line. Blank lines are skipped.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::{Error, Result};

pub struct FrameReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: BufReader::new(inner).lines(),
        }
    }

    /// Next message, or `None` at end of stream.
    pub async fn next<M: DeserializeOwned>(&mut self) -> Result<Option<M>> {
        loop {
            let Some(line) = self.lines.next_line().await.map_err(Error::transport)? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
    }

    /// Like [`FrameReader::next`] but end of stream is an error.
    pub async fn expect<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.next()
            .await?
            .ok_or_else(|| Error::transport("connection closed by peer"))
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.inner.write_all(&line).await.map_err(Error::transport)?;
        self.inner.flush().await.map_err(Error::transport)?;
        Ok(())
    }
}
