//! Write adapter: a push-based byte sink chunking a caller stream into
//! engine puts.
//!
//! The writer owns a buffer of capacity `C`. Caller bytes are copied in;
//! each time the buffer fills, chunk `n` is put and `n` increments. On
//! [`BlobWriter::finish`] the remaining bytes become the final short chunk
//! (or the single empty chunk when nothing was written at all).
//! Backpressure is inherent: `push` returns only once the engine has
//! accepted the chunk.
//!
//! State machine:
//!
//! ```text
//! Writing(n, buf) -> Flushing(n) -> Writing(n+1, ..) -> Finished
//!        \________________________________________\--> Failed (terminal)
//! ```
//!
//! A writer that fails mid-flight over the space budget unlinks the chunks
//! it already persisted; an engine failure leaves a truncated (gap-free)
//! blob that the next write to the key replaces. There is no rollback.

use engine::KvEngine;
use keys::{ChunkPrefix, FileKey, MAX_CHUNK_INDEX};
use std::io;
use std::sync::Arc;

use crate::{Error, Result, Sbucket, CHUNK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Writing,
    Finished,
    Failed,
}

/// A streaming blob writer bound to one shard and one key.
///
/// Holds the key's write permit until dropped. Implements
/// [`std::io::Write`] so callers can `io::copy` into it; the typed
/// interface is [`BlobWriter::push`] + [`BlobWriter::finish`].
pub struct BlobWriter<E: KvEngine> {
    bucket: Arc<Sbucket<E>>,
    prefix: ChunkPrefix,
    next: u32,
    buf: Vec<u8>,
    /// Free-space snapshot taken at creation. Mid-flight admission bound.
    budget: u64,
    written: u64,
    state: State,
}

impl<E: KvEngine> BlobWriter<E> {
    /// Opens a streaming write of the blob at `key`, replacing any existing
    /// blob.
    ///
    /// Admission runs first: a known `expected_len` must fit in the shard's
    /// free space, an unknown length needs at least one chunk of headroom.
    /// Only after admission passes is the pre-existing blob unlinked, so a
    /// [`Error::NoSpace`] rejection leaves the shard unchanged.
    pub fn create(
        bucket: Arc<Sbucket<E>>,
        key: &FileKey,
        expected_len: Option<u64>,
    ) -> Result<Self> {
        let prefix = key.chunk_prefix();
        let stat = bucket.stat()?;

        // Admission before anything is touched: a rejected write leaves the
        // shard unchanged. Unknown lengths reserve one chunk of headroom.
        let needed = expected_len.unwrap_or(CHUNK_SIZE as u64);
        if stat.free < needed {
            return Err(Error::NoSpace {
                needed,
                free: stat.free,
            });
        }

        bucket.begin_write(&prefix)?;
        let writer = Self {
            bucket,
            prefix,
            next: 0,
            buf: Vec::with_capacity(CHUNK_SIZE),
            budget: stat.free,
            written: 0,
            state: State::Writing,
        };

        // Replace semantics: any pre-existing blob is dropped before the
        // first byte is accepted.
        writer.bucket.unlink_prefix(&writer.prefix)?;
        Ok(writer)
    }

    /// Total bytes persisted so far (excluding the partial buffer).
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Accepts caller bytes, putting a chunk each time the buffer fills.
    pub fn push(&mut self, mut bytes: &[u8]) -> Result<()> {
        if self.state != State::Writing {
            return Err(Error::Cancelled);
        }
        while !bytes.is_empty() {
            let space = CHUNK_SIZE - self.buf.len();
            let take = space.min(bytes.len());
            self.buf.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.buf.len() == CHUNK_SIZE {
                self.put_chunk()?;
            }
        }
        Ok(())
    }

    /// Writes the final chunk and completes the blob.
    ///
    /// An empty blob is stored as a single empty chunk `000000`; a blob
    /// whose length is an exact multiple of the chunk size ends with its
    /// last full chunk and no terminator.
    pub fn finish(mut self) -> Result<()> {
        if self.state != State::Writing {
            return Err(Error::Cancelled);
        }
        if !self.buf.is_empty() || self.next == 0 {
            self.put_chunk()?;
        }
        self.state = State::Finished;
        tracing::debug!(
            index = self.bucket.index(),
            base_key = %self.prefix.base_key(),
            bytes = self.written,
            chunks = self.next,
            "blob written"
        );
        Ok(())
    }

    /// Abandons the stream and unlinks any chunks already persisted,
    /// restoring a clean state for the key.
    pub fn abort(mut self) -> Result<()> {
        if self.state != State::Writing {
            return Ok(());
        }
        self.state = State::Failed;
        if self.next > 0 {
            self.bucket.unlink_prefix(&self.prefix)?;
        }
        Ok(())
    }

    fn put_chunk(&mut self) -> Result<()> {
        let len = self.buf.len() as u64;

        if self.written + len > self.budget || self.next > MAX_CHUNK_INDEX {
            // The shard cap was reached mid-stream: drop the partial blob
            // before surfacing the terminal error.
            self.state = State::Failed;
            let _ = self.bucket.unlink_prefix(&self.prefix);
            return Err(Error::NoSpace {
                needed: self.written + len,
                free: self.budget,
            });
        }

        let chunk_key = self.prefix.key_at(self.next);
        if let Err(e) = self.bucket.engine().put(&chunk_key, &self.buf) {
            // Engine failure: the blob stays truncated but gap-free; the
            // next write to this key unlinks and replaces it.
            self.state = State::Failed;
            return Err(e.into());
        }

        self.written += len;
        self.next += 1;
        self.buf.clear();
        Ok(())
    }
}

impl<E: KvEngine> io::Write for BlobWriter<E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf).map_err(io::Error::from)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Chunks flush at their boundaries; a partial buffer waits for
        // finish() so the last chunk is only ever written once.
        Ok(())
    }
}

impl<E: KvEngine> Drop for BlobWriter<E> {
    fn drop(&mut self) {
        self.bucket.end_write(&self.prefix);
        if self.state == State::Writing && self.next > 0 {
            tracing::warn!(
                index = self.bucket.index(),
                base_key = %self.prefix.base_key(),
                chunks = self.next,
                "write stream dropped before finish; partial blob left behind"
            );
        }
    }
}
