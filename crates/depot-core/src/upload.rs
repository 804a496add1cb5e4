//! Inbound content description and the hashing reader.
//!
//! An [`Upload`] is a transient, single-use description of content headed
//! into a storage: a byte source plus declared size, content type and the
//! file name that produced it. The source is consumed exactly once by the
//! service method it is handed to.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::data::OCTET_STREAM;

/// Max number of bytes drained from a source at once.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Boxed async byte source of an upload.
pub type UploadSource = Pin<Box<dyn AsyncRead + Send>>;

/// Standard upload details.
///
/// ```no_run
/// use depot_core::Upload;
///
/// let upload = Upload::from_bytes("hello world").with_filename("file.txt");
/// assert_eq!(upload.size, 11);
/// ```
pub struct Upload {
    /// Content as an async byte source, readable exactly once.
    pub source: UploadSource,
    /// Name of the file that produced the content, if any.
    pub filename: String,
    /// Declared size of the content in bytes.
    pub size: u64,
    /// Declared MIME type of the content.
    pub content_type: String,
}

impl Upload {
    pub fn new(
        source: UploadSource,
        filename: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
    ) -> Self {
        Upload {
            source,
            filename: filename.into(),
            size,
            content_type: content_type.into(),
        }
    }

    /// Simple and reliable initialization from in-memory content.
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let size = content.len() as u64;
        Upload::new(
            Box::pin(io::Cursor::new(content)),
            "",
            size,
            OCTET_STREAM,
        )
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Wrap the byte source in a [`HashingReader`], so the content hash is
    /// available for free once the source is exhausted.
    pub fn hashing_reader(self) -> HashingReader<UploadSource> {
        HashingReader::new(self.source)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Byte source wrapper that computes a SHA-256 digest while the source is
/// consumed, and counts the bytes that went past.
///
/// ```no_run
/// # async fn demo() -> std::io::Result<()> {
/// use depot_core::Upload;
///
/// let mut reader = Upload::from_bytes("hello").hashing_reader();
/// let content = reader.read_all().await?;
/// assert_eq!(reader.position(), content.len() as u64);
/// let _digest = reader.hash();
/// # Ok(())
/// # }
/// ```
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    position: u64,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        HashingReader {
            inner,
            hasher: Sha256::new(),
            position: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Hex digest of everything read so far.
    pub fn hash(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

impl<R: AsyncRead + Unpin + Send> HashingReader<R> {
    /// Read and return all remaining bytes from the source at once.
    pub async fn read_all(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(buf.into())
    }

    /// Exhaust the source to compute the final content hash.
    ///
    /// The content itself is irreversibly lost.
    pub async fn exhaust(&mut self) -> io::Result<u64> {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(self.position);
            }
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = &buf.filled()[before..];
                me.hasher.update(filled);
                me.position += filled.len() as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256 of b"hello world"
    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_hash_matches_content() {
        let mut reader = Upload::from_bytes("hello world").hashing_reader();
        let content = reader.read_all().await.unwrap();
        assert_eq!(&content[..], b"hello world");
        assert_eq!(reader.position(), 11);
        assert_eq!(reader.hash(), HELLO_WORLD_SHA256);
    }

    #[tokio::test]
    async fn test_exhaust_loses_content_but_keeps_hash() {
        let mut reader = Upload::from_bytes("hello world").hashing_reader();
        let consumed = reader.exhaust().await.unwrap();
        assert_eq!(consumed, 11);
        assert_eq!(reader.hash(), HELLO_WORLD_SHA256);
        assert!(reader.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_read_tracks_position() {
        let mut reader = Upload::from_bytes("hello world").hashing_reader();
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_from_bytes_fills_declared_fields() {
        let upload = Upload::from_bytes("abc")
            .with_filename("a.txt")
            .with_content_type("text/plain");
        assert_eq!(upload.size, 3);
        assert_eq!(upload.filename, "a.txt");
        assert_eq!(upload.content_type, "text/plain");
    }
}
