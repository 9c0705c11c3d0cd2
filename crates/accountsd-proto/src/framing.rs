use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into `[u32 len][body]` frames.
///
/// Bytes read past the end of one frame stay buffered for the next call, and
/// [`FrameReader::read_frame`] is cancel-safe: a dropped call loses nothing
/// that was already read.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            max_frame,
        }
    }

    /// The underlying stream, for writing replies.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Next complete frame, length prefix included (callers skip 4 bytes).
    /// `None` on EOF, also when EOF cuts a frame short.
    pub async fn read_frame(&mut self) -> io::Result<Option<BytesMut>> {
        loop {
            if let Some(total) = self.complete_len()? {
                return Ok(Some(self.buf.split_to(total)));
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    fn complete_len(&self) -> io::Result<Option<usize>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = (&self.buf[..4]).get_u32_le() as usize;
        if len == 0 || len > self.max_frame {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad frame length {len}"),
            ));
        }
        let total = 4 + len;
        Ok((self.buf.len() >= total).then_some(total))
    }
}
