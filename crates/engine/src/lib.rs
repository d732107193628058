//! # Engine — Ordered KV Primitive
//!
//! KFS treats the key-value engine as an external collaborator: a shard only
//! needs point get/put/del, ordered range iteration, batched range deletes,
//! an approximate size figure, and offline repair. This crate captures that
//! capability set as the [`KvEngine`] trait and provides [`RocksEngine`],
//! the RocksDB-backed implementation each S-bucket owns exclusively.
//!
//! ## Capability set
//!
//! | Operation       | Used by                                         |
//! |-----------------|-------------------------------------------------|
//! | `get` / `put` / `del` | chunk reads and writes                    |
//! | `del_range`     | blob unlink as a single batched deletion        |
//! | `seek`          | ordered cursor positioning for streaming reads  |
//! | `scan_sizes`    | shard enumeration (`list`)                      |
//! | `approx_size`   | free-space accounting and admission control     |
//! | `flush`         | persisting buffered writes on table close       |
//! | `repair`        | offline shard repair (`compact` in the CLI)     |
//!
//! Keys are opaque ordered byte strings; values are opaque byte strings. The
//! engine is responsible for durability and integrity of what it stores;
//! KFS adds no checksums of its own.

mod rocks;

pub use rocks::RocksEngine;

use std::io;
use std::path::Path;
use thiserror::Error;

/// Failures surfaced by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A failure reported by the backing engine; the message carries the
    /// underlying cause.
    #[error("engine error: {0}")]
    Backend(String),
}

/// Per-shard tuning forwarded to the engine when a shard is opened.
///
/// All fields default to the engine's own defaults.
#[derive(Debug, Clone, Default)]
pub struct EngineOpts {
    /// Size of the engine's in-memory write buffer, in bytes.
    pub write_buffer_size: Option<usize>,
    /// Cap on file descriptors the engine may hold open.
    pub max_open_files: Option<i32>,
}

/// An ordered key-value store owned exclusively by one shard.
///
/// Implementations must provide totally ordered iteration by raw byte
/// comparison, since chunk keys rely on lexicographic adjacency.
pub trait KvEngine: Send + Sync + Sized {
    /// Opens (creating if missing) the engine rooted at `path`.
    fn open(path: &Path, opts: &EngineOpts) -> Result<Self, EngineError>;

    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Inserts or replaces a single entry.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError>;

    /// Deletes a single entry. Deleting a missing key is not an error.
    fn del(&self, key: &[u8]) -> Result<(), EngineError>;

    /// Deletes every entry in `[from, to)` as one batched operation.
    fn del_range(&self, from: &[u8], to: &[u8]) -> Result<(), EngineError>;

    /// Returns the first entry with key `>= from`, if any.
    fn seek(&self, from: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, EngineError>;

    /// Returns `(key, value_length)` for every entry with key `>= from`, in
    /// ascending key order. Values themselves are not materialized.
    fn scan_sizes(&self, from: &[u8]) -> Result<Vec<(Vec<u8>, u64)>, EngineError>;

    /// The engine's approximate byte footprint over its full key space.
    /// Advisory: may lag writes and compaction.
    fn approx_size(&self) -> Result<u64, EngineError>;

    /// Flushes buffered writes to stable storage.
    fn flush(&self) -> Result<(), EngineError>;

    /// Repairs the engine directory at `path`. The engine must be closed.
    fn repair(path: &Path) -> Result<(), EngineError>;
}
