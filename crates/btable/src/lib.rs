//! # B-table — The KFS Store Façade
//!
//! A B-table is a directory of up to [`BUCKET_COUNT`] independent KV shards
//! plus a persistent table identity:
//!
//! ```text
//! <table>.kfs/
//!   r          reference id, exactly 20 bytes
//!   000.s/     shard 0 (an engine directory)
//!   001.s/
//!   ...
//!   255.s/
//! ```
//!
//! Every operation takes a 160-bit file key, routes it to shard
//! `i = (K XOR R)[0]`, lazily opens that shard, and delegates. Shards stay
//! open until the table is dropped; the open-shard map is owned by the
//! table value and is append-only for its lifetime.
//!
//! ## Admission
//!
//! A write is admitted against the target shard's free space before any
//! chunk is persisted: a known length must fit entirely, an unknown
//! (streaming) length needs one chunk of headroom and is bounded by the
//! shard cap mid-flight. See [`sbucket`] for the streaming details.
//!
//! ## Example
//!
//! ```rust,no_run
//! use btable::{Btable, TableOptions};
//! use keys::FileKey;
//!
//! let table: Btable = Btable::open("demo", TableOptions::default()).unwrap();
//! let key = FileKey::parse("adc83b19e793491b1c6ea0fd8b46cd9f32e592fc").unwrap();
//! table.write_file(&key, b"hello").unwrap();
//! assert_eq!(table.read_file(&key).unwrap(), b"hello");
//! ```

mod refid;

pub use engine::{EngineOpts, KvEngine, RocksEngine};
pub use keys::{BadKey, FileKey, ReferenceId};
pub use refid::REFERENCE_ID_FILE;
pub use sbucket::{BlobEntry, BlobReader, BlobWriter, BucketStat, Error, Result, CHUNK_SIZE};

use keys::shard_index;
use sbucket::Sbucket;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Number of shards per table (`B`).
pub const BUCKET_COUNT: usize = 256;

/// Default total table cap: 8 TiB across 256 shards of 32 GiB.
pub const DEFAULT_MAX_TABLE_SIZE: u64 = 8 * 1024 * 1024 * 1024 * 1024;

/// Table configuration. All fields have fixed defaults.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Identity for a newly created table; ignored (with a warning) when
    /// the table already exists.
    pub reference_id: Option<ReferenceId>,
    /// Total byte cap for the table; each shard gets an equal slice.
    pub max_table_size: u64,
    /// Engine tuning forwarded to every shard.
    pub engine: EngineOpts,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            reference_id: None,
            max_table_size: DEFAULT_MAX_TABLE_SIZE,
            engine: EngineOpts::default(),
        }
    }
}

impl TableOptions {
    /// Per-shard byte cap (`S_max`).
    #[must_use]
    pub fn bucket_size(&self) -> u64 {
        self.max_table_size / BUCKET_COUNT as u64
    }
}

/// Identifies a shard either directly by index or through the file key it
/// would host.
#[derive(Debug, Clone, Copy)]
pub enum BucketSelector {
    Index(u8),
    Key(FileKey),
}

impl FromStr for BucketSelector {
    type Err = BadKey;

    /// Accepts a decimal shard index (`0..=255`) or a 40-hex file key.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if !s.is_empty() && s.len() <= 3 && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u8>()
                .map(BucketSelector::Index)
                .map_err(|_| BadKey(s.to_string()));
        }
        FileKey::parse(s).map(BucketSelector::Key)
    }
}

/// The top-level store: routes file keys across lazily opened shards.
pub struct Btable<E: KvEngine = RocksEngine> {
    root: PathBuf,
    reference_id: ReferenceId,
    opts: TableOptions,
    buckets: Mutex<HashMap<u8, Arc<Sbucket<E>>>>,
}

impl<E: KvEngine> fmt::Debug for Btable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Btable")
            .field("root", &self.root)
            .field("reference_id", &self.reference_id)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl<E: KvEngine> Btable<E> {
    /// Opens (creating if missing) the table at `path`. A bare name gets
    /// the canonical `.kfs` suffix appended.
    pub fn open(path: impl AsRef<Path>, opts: TableOptions) -> Result<Self> {
        let root = keys::coerce_table_path(path.as_ref());
        fs::create_dir_all(&root)?;
        let reference_id = refid::load_or_create(&root, opts.reference_id)?;
        tracing::debug!(root = %root.display(), reference_id = %reference_id, "opened b-table");
        Ok(Self {
            root,
            reference_id,
            opts,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// The table's root directory (with the `.kfs` suffix).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The table's persistent identity.
    #[must_use]
    pub fn reference_id(&self) -> &ReferenceId {
        &self.reference_id
    }

    /// The shard index a file key routes to.
    #[must_use]
    pub fn route(&self, key: &FileKey) -> u8 {
        shard_index(key, &self.reference_id)
    }

    /// Returns shard `index`, opening it on first use.
    fn bucket(&self, index: u8) -> Result<Arc<Sbucket<E>>> {
        let mut buckets = self.buckets.lock().map_err(Error::lock_poisoned)?;
        if let Some(bucket) = buckets.get(&index) {
            return Ok(Arc::clone(bucket));
        }
        let path = self.root.join(keys::sbucket_name(index));
        let bucket = Arc::new(Sbucket::open(
            &path,
            index,
            self.opts.bucket_size(),
            &self.opts.engine,
        )?);
        buckets.insert(index, Arc::clone(&bucket));
        Ok(bucket)
    }

    fn bucket_for(&self, key: &FileKey) -> Result<Arc<Sbucket<E>>> {
        self.bucket(self.route(key))
    }

    fn select(&self, selector: BucketSelector) -> u8 {
        match selector {
            BucketSelector::Index(i) => i,
            BucketSelector::Key(ref key) => self.route(key),
        }
    }

    /// True iff a blob exists at `key`.
    pub fn exists(&self, key: &FileKey) -> Result<bool> {
        self.bucket_for(key)?.exists(key)
    }

    /// Writes `bytes` as the blob at `key`, replacing any existing blob.
    /// Admission-checked against the target shard before any chunk lands.
    pub fn write_file(&self, key: &FileKey, bytes: &[u8]) -> Result<()> {
        let mut writer = self.write_stream(key, Some(bytes.len() as u64))?;
        writer.push(bytes)?;
        writer.finish()
    }

    /// Reads the whole blob at `key` into memory. Prefer
    /// [`Btable::read_stream`] for blobs of unbounded size.
    pub fn read_file(&self, key: &FileKey) -> Result<Vec<u8>> {
        let mut reader = self.read_stream(key)?;
        let mut out = Vec::new();
        while let Some(chunk) = reader.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Opens a streaming write to `key`. `expected_len` drives the
    /// admission check when the caller knows it; `None` admits with one
    /// chunk of reserve and enforces the shard cap mid-flight.
    pub fn write_stream(
        &self,
        key: &FileKey,
        expected_len: Option<u64>,
    ) -> Result<BlobWriter<E>> {
        BlobWriter::create(self.bucket_for(key)?, key, expected_len)
    }

    /// Opens a streaming read of `key`. Fails with [`Error::NotFound`] when
    /// the blob is absent.
    pub fn read_stream(&self, key: &FileKey) -> Result<BlobReader<E>> {
        BlobReader::open(self.bucket_for(key)?, key)
    }

    /// Deletes the blob at `key`. Idempotent.
    pub fn unlink(&self, key: &FileKey) -> Result<()> {
        self.bucket_for(key)?.unlink(key)
    }

    /// Size and free space for every shard, tagged with its index. Shards
    /// with no directory on disk report zero usage without being opened.
    pub fn stat(&self) -> Result<Vec<BucketStat>> {
        let mut stats = Vec::with_capacity(BUCKET_COUNT);
        for index in 0..BUCKET_COUNT as u16 {
            let index = index as u8;
            stats.push(self.stat_index(index)?);
        }
        Ok(stats)
    }

    /// Size and free space for a single shard.
    pub fn stat_one(&self, selector: BucketSelector) -> Result<BucketStat> {
        self.stat_index(self.select(selector))
    }

    fn stat_index(&self, index: u8) -> Result<BucketStat> {
        let opened = {
            let buckets = self.buckets.lock().map_err(Error::lock_poisoned)?;
            buckets.contains_key(&index)
        };
        if opened || self.root.join(keys::sbucket_name(index)).is_dir() {
            return self.bucket(index)?.stat();
        }
        Ok(BucketStat {
            index,
            size: 0,
            free: self.opts.bucket_size(),
        })
    }

    /// Enumerates the blobs of one shard, ascending by base key.
    pub fn list(&self, selector: BucketSelector) -> Result<Vec<BlobEntry>> {
        let index = self.select(selector);
        if !self.root.join(keys::sbucket_name(index)).is_dir() {
            let buckets = self.buckets.lock().map_err(Error::lock_poisoned)?;
            if !buckets.contains_key(&index) {
                return Ok(Vec::new());
            }
        }
        self.bucket(index)?.list()
    }

    /// Flushes every open shard's buffered writes.
    pub fn flush(&self) -> Result<()> {
        let buckets: Vec<Arc<Sbucket<E>>> = {
            let map = self.buckets.lock().map_err(Error::lock_poisoned)?;
            map.values().map(Arc::clone).collect()
        };
        for bucket in buckets {
            bucket.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
