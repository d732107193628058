//! # S-bucket — One KFS Shard
//!
//! An S-bucket is a single ordered KV shard holding chunked blobs. A blob
//! keyed by file key `K` lives entirely inside one shard as the entries
//!
//! ```text
//! <hex(SHA-1(K))> 000000  ->  chunk 0   (exactly C bytes)
//! <hex(SHA-1(K))> 000001  ->  chunk 1   (exactly C bytes)
//! ...
//! <hex(SHA-1(K))> 0000mm  ->  last chunk (1..=C bytes, or empty for the
//!                              empty blob)
//! ```
//!
//! with `C` = [`CHUNK_SIZE`]. Chunk indices are contiguous from zero; a blob
//! of length `L` occupies exactly `ceil(L / C)` chunks and no terminator is
//! written when `L` is an exact multiple of `C`.
//!
//! ## Streaming
//!
//! Blobs may be gigabytes, so all data moves through the streaming adapters
//! one chunk at a time:
//!
//! * [`BlobWriter`] is a push sink (`std::io::Write`) buffering up to `C`
//!   bytes before each engine put,
//! * [`BlobReader`] is a pull source (`std::io::Read`) issuing one ordered
//!   seek per chunk index.
//!
//! Both are opened against a shared shard handle ([`BlobWriter::create`],
//! [`BlobReader::open`]) and keep it alive for the life of the stream.
//!
//! ## Space accounting
//!
//! Each shard carries a fixed byte cap. `stat()` derives the current
//! footprint from the engine's approximate-size figure; admission compares
//! the requested length against `free = max(0, cap - size)` before a write
//! stream opens, and the writer keeps enforcing the snapshot mid-flight.
//! Accounting is advisory and may lag compaction.
//!
//! ## Write discipline
//!
//! The shard owns its engine handle exclusively and tracks one write permit
//! per blob: a second writer to the same key is refused while the first is
//! in flight. Callers must still serialize reads against writes per key.

mod error;
mod read;
mod write;

pub use error::{Error, Result};
pub use read::BlobReader;
pub use write::BlobWriter;

use engine::{EngineOpts, KvEngine};
use keys::{ChunkPrefix, FileKey};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Maximum chunk payload length `C` (128 KiB). Every chunk except the last
/// of a blob has exactly this length.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Size and free-space figures for one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStat {
    /// The shard index within its table.
    pub index: u8,
    /// Approximate byte footprint of the shard.
    pub size: u64,
    /// Remaining capacity: `max(0, cap - size)`.
    pub free: u64,
}

/// One blob as reported by [`Sbucket::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// The blob's 40-hex-char base key (the SHA-1 chunk prefix).
    pub base_key: String,
    /// Total chunk bytes stored for the blob.
    pub size: u64,
}

/// A single KV shard with chunked streaming blob storage.
pub struct Sbucket<E: KvEngine> {
    index: u8,
    path: PathBuf,
    max_size: u64,
    engine: E,
    /// Base keys with a write stream currently open. Guards the
    /// single-writer-per-key discipline.
    writing: Mutex<HashSet<String>>,
}

impl<E: KvEngine> Sbucket<E> {
    /// Opens (creating if missing) the shard at `path`.
    ///
    /// `max_size` is the shard's byte cap; `opts` is forwarded to the
    /// underlying engine.
    pub fn open(path: &Path, index: u8, max_size: u64, opts: &EngineOpts) -> Result<Self> {
        let engine = E::open(path, opts)?;
        tracing::debug!(index, path = %path.display(), "opened s-bucket");
        Ok(Self {
            index,
            path: path.to_path_buf(),
            max_size,
            engine,
            writing: Mutex::new(HashSet::new()),
        })
    }

    /// The shard index within its table.
    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The shard's directory on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shard's byte cap.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// True iff chunk `000000` for the key is present.
    pub fn exists(&self, key: &FileKey) -> Result<bool> {
        let first = key.chunk_prefix().key_at(0);
        Ok(self.engine.get(&first)?.is_some())
    }

    /// Approximate size and free space for this shard.
    pub fn stat(&self) -> Result<BucketStat> {
        let size = self.engine.approx_size()?;
        Ok(BucketStat {
            index: self.index,
            size,
            free: self.max_size.saturating_sub(size),
        })
    }

    /// Deletes every chunk of the blob as a single batched deletion.
    /// Succeeds silently when the blob is absent.
    pub fn unlink(&self, key: &FileKey) -> Result<()> {
        let prefix = key.chunk_prefix();
        self.unlink_prefix(&prefix)
    }

    pub(crate) fn unlink_prefix(&self, prefix: &ChunkPrefix) -> Result<()> {
        self.engine
            .del_range(&prefix.range_start(), &prefix.range_end_exclusive())?;
        tracing::debug!(index = self.index, base_key = %prefix.base_key(), "unlinked blob");
        Ok(())
    }

    /// Enumerates the shard: one entry per distinct blob, ascending by base
    /// key, with the summed chunk bytes as its size.
    pub fn list(&self) -> Result<Vec<BlobEntry>> {
        let mut entries: Vec<BlobEntry> = Vec::new();
        for (key, len) in self.engine.scan_sizes(&[])? {
            let Some((base, _)) = keys::split_chunk_key(&key) else {
                // not a chunk key; nothing else should live in a shard
                continue;
            };
            match entries.last_mut() {
                Some(last) if last.base_key == base => last.size += len,
                _ => entries.push(BlobEntry {
                    base_key: base.to_string(),
                    size: len,
                }),
            }
        }
        Ok(entries)
    }

    /// Flushes buffered engine writes to stable storage.
    pub fn flush(&self) -> Result<()> {
        Ok(self.engine.flush()?)
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    /// Claims the per-key write permit. Refused while another write stream
    /// to the same blob is open.
    pub(crate) fn begin_write(&self, prefix: &ChunkPrefix) -> Result<()> {
        let mut writing = self.writing.lock().map_err(Error::lock_poisoned)?;
        if !writing.insert(prefix.base_key()) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!(
                    "bucket {:03}: write already in progress for {}",
                    self.index,
                    prefix.base_key()
                ),
            )));
        }
        Ok(())
    }

    /// Releases the per-key write permit. Called on every writer exit path,
    /// including drop, so a poisoned lock is recovered rather than allowed
    /// to leave the key write-blocked for the table's lifetime.
    pub(crate) fn end_write(&self, prefix: &ChunkPrefix) {
        let mut writing = match self.writing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writing.remove(&prefix.base_key());
    }
}

#[cfg(test)]
mod tests;
