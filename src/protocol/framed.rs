//! Line-delimited framing over a byte stream
//!
//! Mining pools speak newline-terminated JSON over plain TCP or TLS. This
//! module turns such a stream into a channel of discrete frames without
//! looking at their contents.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::ops::Deref;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

use crate::common::{BufferPool, PooledBuffer};

/// Byte terminating every frame on the wire
pub const LINE_DELIMITER: u8 = b'\n';

/// Scratch space above this size is released after a write
const SCRATCH_RETAIN: usize = 64 * 1024;

/// Framing errors
#[derive(Error, Debug)]
pub enum FrameError {
    /// The peer closed the stream
    #[error("connection closed")]
    Closed,

    /// A line filled the whole buffer without a delimiter
    ///
    /// `len` bytes of the line were copied into the caller's buffer. The
    /// rest of the line is left unread; the stream is no longer usable.
    #[error("message too long: {len} bytes without a line delimiter")]
    TooLong {
        /// Number of prefix bytes written to the buffer
        len: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One frame read from a stream, backed by a pooled buffer
///
/// Dereferences to the payload; the buffer goes back to the pool on drop.
pub struct Frame {
    buffer: PooledBuffer,
    len: usize,
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer[..self.len]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Frame")
            .field(&String::from_utf8_lossy(self))
            .finish()
    }
}

/// Read side of a framed connection
pub struct FrameReader<R> {
    reader: BufReader<R>,
    buffers: BufferPool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader, using `buffers` for [`FrameReader::read`]
    pub fn new(inner: R, buffers: BufferPool) -> Self {
        Self {
            reader: BufReader::with_capacity(buffers.buffer_size().max(1), inner),
            buffers,
        }
    }

    /// The pool frames are read into
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Read one line into `buf`
    ///
    /// Returns the payload length, without the delimiter and without a
    /// carriage return in front of it. A line whose payload does not fit in
    /// `buf` with room to spare fails with [`FrameError::TooLong`]; the
    /// carriage return of a `\r\n` line does not count against the room.
    /// On failure the truncated prefix is left in `buf`. An unterminated
    /// final line is returned as is; the next call reports
    /// [`FrameError::Closed`].
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let mut len = 0;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return if len == 0 { Err(FrameError::Closed) } else { Ok(len) };
            }

            let newline = available.iter().position(|b| *b == LINE_DELIMITER);
            let chunk = match newline {
                Some(i) => &available[..i],
                None => available,
            };
            let chunk_len = chunk.len();
            let take = chunk_len.min(buf.len() - len);
            buf[len..len + take].copy_from_slice(&chunk[..take]);
            len += take;

            // A carriage return in front of the delimiter is not payload
            let room = len < buf.len() || (len > 0 && buf[len - 1] == b'\r');

            match newline {
                Some(i) if take == chunk_len && room => {
                    self.reader.consume(i + 1);
                    return Ok(strip_carriage_return(buf, len));
                }
                None if take == chunk_len && len == buf.len() && room => {
                    self.reader.consume(take);
                    let next = self.reader.fill_buf().await?;
                    if next.first() == Some(&LINE_DELIMITER) {
                        self.reader.consume(1);
                        return Ok(len - 1);
                    }
                    return Err(FrameError::TooLong { len });
                }
                _ if len >= buf.len() => {
                    self.reader.consume(take);
                    return Err(FrameError::TooLong { len });
                }
                _ => self.reader.consume(take),
            }
        }
    }

    /// Read one line into a buffer taken from the pool
    pub async fn read(&mut self) -> Result<Frame, FrameError> {
        let mut buffer = self.buffers.acquire();
        let len = self.read_into(&mut buffer).await?;
        Ok(Frame { buffer, len })
    }

    /// Read one line and decode it as JSON
    pub async fn read_struct<T: DeserializeOwned>(&mut self) -> Result<T, FrameError> {
        let frame = self.read().await?;
        Ok(serde_json::from_slice(&frame)?)
    }
}

fn strip_carriage_return(buf: &[u8], len: usize) -> usize {
    if len > 0 && buf[len - 1] == b'\r' {
        len - 1
    } else {
        len
    }
}

/// Write side of a framed connection
pub struct FrameWriter<W> {
    writer: W,
    scratch: BytesMut,
    closed: bool,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            writer: inner,
            scratch: BytesMut::new(),
            closed: false,
        }
    }

    /// Write `payload` followed by one line delimiter
    ///
    /// The frame is assembled in private scratch space and written in one
    /// go; `payload` itself is never touched.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed").into());
        }

        self.scratch.clear();
        self.scratch.reserve(payload.len() + 1);
        self.scratch.extend_from_slice(payload);
        self.scratch.put_u8(LINE_DELIMITER);

        let result = self.flush_scratch().await;

        if self.scratch.capacity() > SCRATCH_RETAIN {
            self.scratch = BytesMut::new();
        }

        result
    }

    async fn flush_scratch(&mut self) -> Result<(), FrameError> {
        self.writer.write_all(&self.scratch).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Encode `value` as JSON and write it as one frame
    pub async fn write_struct<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FrameError> {
        let data = serde_json::to_vec(value)?;
        self.write(&data).await
    }

    /// Shut down the write side; later calls do nothing
    pub async fn close(&mut self) -> Result<(), FrameError> {
        if !self.closed {
            self.closed = true;
            self.writer.shutdown().await?;
        }
        Ok(())
    }
}

/// A stream connection carrying newline-delimited frames
///
/// Owns the stream. The socket is released when the connection, or both
/// halves returned by [`FramedConnection::into_split`], are dropped.
pub struct FramedConnection<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wrap a stream
    ///
    /// # Parameters
    ///
    /// * `stream` - Connected socket (plain or TLS)
    /// * `buffers` - Pool used for inbound frames
    pub fn new(stream: S, buffers: BufferPool) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half, buffers),
            writer: FrameWriter::new(write_half),
        }
    }

    /// Read one line into `buf`, see [`FrameReader::read_into`]
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        self.reader.read_into(buf).await
    }

    /// Read one line into a pooled buffer
    pub async fn read(&mut self) -> Result<Frame, FrameError> {
        self.reader.read().await
    }

    /// Write one frame
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        self.writer.write(payload).await
    }

    /// Read one frame and decode it as JSON
    pub async fn read_struct<T: DeserializeOwned>(&mut self) -> Result<T, FrameError> {
        self.reader.read_struct().await
    }

    /// Encode a value as JSON and write it as one frame
    pub async fn write_struct<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FrameError> {
        self.writer.write_struct(value).await
    }

    /// Shut down the write side of the stream; idempotent
    pub async fn close(&mut self) -> Result<(), FrameError> {
        self.writer.close().await
    }

    /// Separate the read and write sides
    pub fn into_split(self) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}
