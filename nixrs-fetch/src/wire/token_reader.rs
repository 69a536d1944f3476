use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt as _, ReadBuf};
use tracing::trace;

use super::{ZEROS, calc_padding};
use crate::ByteString;
use crate::error::Error;

/// Longest token [`TokenReader::read_token`] accepts by default.
pub const DEFAULT_MAX_TOKEN_LEN: u64 = 64 * 1024;

/// Reads the primitive wire unit of a NAR: a little-endian `u64` length
/// followed by that many bytes, zero padded to a multiple of 8.
///
/// Every read is exact. Nothing is buffered ahead, so the number of bytes
/// pulled from the underlying reader always equals [`offset`](Self::offset).
#[derive(Debug)]
pub struct TokenReader<R> {
    reader: R,
    offset: u64,
    max_token_len: u64,
}

impl<R> TokenReader<R> {
    pub fn new(reader: R) -> TokenReader<R> {
        Self::with_max_token_len(reader, DEFAULT_MAX_TOKEN_LEN)
    }

    pub fn with_max_token_len(reader: R, max_token_len: u64) -> TokenReader<R> {
        TokenReader {
            reader,
            offset: 0,
            max_token_len,
        }
    }

    /// Number of bytes consumed from the underlying reader.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> TokenReader<R>
where
    R: AsyncRead + Unpin,
{
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.reader.read_exact(buf).await?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    pub async fn read_u64(&mut self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf).await?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read one length-prefixed token and its padding.
    pub async fn read_token(&mut self) -> Result<ByteString, Error> {
        let len = self.read_u64().await?;
        if len == 0 {
            return Ok(ByteString::new());
        }
        if len > self.max_token_len {
            return Err(Error::malformed(format!(
                "token of {len} bytes exceeds limit of {}",
                self.max_token_len
            )));
        }
        let mut buf = BytesMut::zeroed(len as usize);
        self.read_exact(&mut buf).await?;
        self.skip_padding(len).await?;
        trace!(len, offset = self.offset, "read token");
        Ok(buf.freeze())
    }

    /// Consume the padding that follows `len` bytes of content.
    ///
    /// Padding bytes are not required to be zero.
    pub async fn skip_padding(&mut self, len: u64) -> Result<(), Error> {
        let padding = calc_padding(len);
        if padding > 0 {
            let mut buf = ZEROS;
            self.read_exact(&mut buf[..padding]).await?;
            if buf != ZEROS {
                trace!(?buf, "ignoring non-zero padding");
            }
        }
        Ok(())
    }

    /// Discard exactly `len` bytes without buffering them.
    pub async fn drain(&mut self, len: u64) -> Result<(), Error> {
        let mut limited = (&mut self.reader).take(len);
        let drained = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        self.offset += drained;
        if drained < len {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// Skip a content stream of `size` bytes together with its padding.
    pub async fn skip_content_stream(&mut self, size: u64) -> Result<(), Error> {
        trace!(size, offset = self.offset, "skipping content stream");
        self.drain(size).await?;
        self.skip_padding(size).await
    }
}

impl<R> AsyncRead for TokenReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.reader).poll_read(cx, buf))?;
        this.offset += (buf.filled().len() - before) as u64;
        Poll::Ready(Ok(()))
    }
}
