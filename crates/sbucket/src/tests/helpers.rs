use engine::{EngineOpts, RocksEngine};
use keys::FileKey;
use std::path::Path;
use std::sync::Arc;

use crate::{BlobReader, BlobWriter, Result, Sbucket};

/// 32 GiB, the production per-shard cap.
pub const TEST_CAP: u64 = 32 * 1024 * 1024 * 1024;

pub fn open_bucket(dir: &Path, max_size: u64) -> Arc<Sbucket<RocksEngine>> {
    Arc::new(Sbucket::open(&dir.join("000.s"), 0, max_size, &EngineOpts::default()).unwrap())
}

pub fn test_key(seed: u8) -> FileKey {
    let mut bytes = [seed; 20];
    bytes[19] = seed.wrapping_add(1);
    FileKey::from_bytes(bytes)
}

/// Deterministic non-repeating filler so reassembly errors show up.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) >> 3) as u8).collect()
}

pub fn blob_writer(
    bucket: &Arc<Sbucket<RocksEngine>>,
    key: &FileKey,
    expected_len: Option<u64>,
) -> Result<BlobWriter<RocksEngine>> {
    BlobWriter::create(Arc::clone(bucket), key, expected_len)
}

pub fn blob_reader(
    bucket: &Arc<Sbucket<RocksEngine>>,
    key: &FileKey,
) -> Result<BlobReader<RocksEngine>> {
    BlobReader::open(Arc::clone(bucket), key)
}
