//! Read adapter: a pull-based byte source reassembling a blob from its
//! chunks.
//!
//! One ordered seek per chunk index: the reader positions the engine cursor
//! at the expected chunk key and checks what comes back. An exact match is
//! the next chunk; a key that still carries the blob's prefix but a higher
//! index means a chunk is missing (the blob violates contiguity and the
//! read fails as corrupt); anything else is the end of the blob.
//!
//! Backpressure is inherent in the pull model: no chunk is fetched before
//! the caller asks for bytes beyond the current one. Dropping the reader
//! cancels it at a chunk boundary.

use engine::KvEngine;
use keys::{ChunkPrefix, FileKey};
use std::io;
use std::sync::Arc;

use crate::{Error, Result, Sbucket};

/// A streaming blob reader bound to one shard and one key.
///
/// Implements [`std::io::Read`].
pub struct BlobReader<E: KvEngine> {
    bucket: Arc<Sbucket<E>>,
    prefix: ChunkPrefix,
    /// Index of the next chunk to fetch.
    next: u32,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<E: KvEngine> BlobReader<E> {
    /// Opens a streaming read of the blob at `key`.
    ///
    /// Fails with [`Error::NotFound`] before any byte is produced when
    /// chunk `000000` is absent.
    pub fn open(bucket: Arc<Sbucket<E>>, key: &FileKey) -> Result<Self> {
        let prefix = key.chunk_prefix();
        let mut reader = Self {
            bucket,
            prefix,
            next: 0,
            chunk: Vec::new(),
            pos: 0,
            done: false,
        };
        // The first chunk is fetched eagerly so an absent blob surfaces as
        // NotFound before any byte is produced.
        match reader.fetch()? {
            true => Ok(reader),
            false => Err(Error::NotFound),
        }
    }

    /// Loads the next chunk into the internal buffer. Returns `false` at
    /// end of blob.
    fn fetch(&mut self) -> Result<bool> {
        if self.next > keys::MAX_CHUNK_INDEX {
            self.done = true;
            return Ok(false);
        }
        let want = self.prefix.key_at(self.next);
        match self.bucket.engine().seek(&want)? {
            Some((key, value)) if key == want => {
                self.chunk = value;
                self.pos = 0;
                self.next += 1;
                Ok(true)
            }
            Some((key, _)) if self.prefix.matches(&key) => {
                self.done = true;
                Err(Error::corrupt(format!(
                    "chunk gap in blob {}: expected index {:06}, found {}",
                    self.prefix.base_key(),
                    self.next,
                    String::from_utf8_lossy(&key),
                )))
            }
            _ => {
                self.done = true;
                Ok(false)
            }
        }
    }

    /// Returns the remainder of the current chunk, fetching the next one
    /// when it is exhausted. `None` at end of blob.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.pos >= self.chunk.len() {
            if self.done || !self.fetch()? {
                return Ok(None);
            }
        }
        let rest = self.chunk[self.pos..].to_vec();
        self.pos = self.chunk.len();
        Ok(Some(rest))
    }
}

impl<E: KvEngine> io::Read for BlobReader<E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            if self.done {
                return Ok(0);
            }
            match self.fetch() {
                Ok(true) => continue,
                Ok(false) => return Ok(0),
                Err(e) => return Err(e.into()),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
