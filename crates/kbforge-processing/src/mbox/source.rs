use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Pull-based source of archive bytes.
///
/// Chunks may split lines (and message separators) anywhere.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// Declared total length, when known up front.
    fn total_len(&self) -> Option<u64> {
        None
    }
}

/// Adapts any [`AsyncRead`] into fixed-size chunks.
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
    total_len: Option<u64>,
    done: bool,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            total_len: None,
            done: false,
        }
    }

    pub fn with_total_len(mut self, total_len: u64) -> Self {
        self.total_len = Some(total_len);
        self
    }
}

impl ReaderSource<tokio::fs::File> {
    /// Open a file on disk; the total length comes from its metadata.
    pub async fn open(path: impl AsRef<std::path::Path>, chunk_size: usize) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::new(file, chunk_size).with_total_len(len))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderSource<R> {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        // Fill the whole chunk unless the reader runs dry first.
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        while buf.len() < self.chunk_size {
            if self.reader.read_buf(&mut buf).await? == 0 {
                self.done = true;
                break;
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    fn total_len(&self) -> Option<u64> {
        self.total_len
    }
}

/// In-memory source that hands out a buffer in slices of `chunk_size`.
pub struct SliceSource {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl ChunkSource for SliceSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }

    fn total_len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
