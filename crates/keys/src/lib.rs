//! # Keys — KFS Key Algebra
//!
//! Every routing and layout decision in KFS reduces to a handful of pure
//! functions over fixed-width identifiers, all collected here.
//!
//! ## Identifiers
//!
//! | Type          | Width    | Role                                         |
//! |---------------|----------|----------------------------------------------|
//! | [`FileKey`]   | 160 bits | caller-supplied blob identifier              |
//! | [`ReferenceId`] | 160 bits | per-table identity, permutes shard routing |
//! | [`ChunkPrefix`] | 160 bits | SHA-1 of the raw file key, names chunks    |
//!
//! ## Chunk keys
//!
//! A blob is stored as consecutively numbered chunks inside one shard. Each
//! chunk's KV key is the 47-byte text
//!
//! ```text
//! <40 hex chars of SHA-1(K)> <6-digit zero-padded index>
//! ```
//!
//! The single space (0x20) sorts below every hex digit, so all chunks of one
//! blob form a contiguous lexicographic range that no other blob's keys can
//! interleave with.
//!
//! ## Routing
//!
//! `shard_index(K, R)` is the first byte of the bytewise XOR of the file key
//! and the table's reference id. Because `R` is random per table, two tables
//! storing overlapping key sets do not co-locate hot shards.
//!
//! ## Example
//!
//! ```rust
//! use keys::{shard_index, FileKey, ReferenceId};
//!
//! let k = FileKey::parse("adc83b19e793491b1c6ea0fd8b46cd9f32e592fc").unwrap();
//! let r = ReferenceId::from_bytes([0u8; 20]);
//! assert_eq!(shard_index(&k, &r), 0xad);
//! ```

use sha1::{Digest, Sha1};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Width of a file key / reference id in raw bytes (160 bits).
pub const KEY_LEN: usize = 20;

/// Width of a file key in its textual (lowercase hex) form.
pub const HEX_KEY_LEN: usize = 40;

/// Total length of a chunk key: 40 hex chars + space + 6 digits.
pub const CHUNK_KEY_LEN: usize = 47;

/// Highest representable chunk index (six decimal digits).
pub const MAX_CHUNK_INDEX: u32 = 999_999;

/// Extension appended to table directories.
pub const TABLE_EXT: &str = "kfs";

/// A key that is not exactly 40 lowercase hex characters.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("bad key {0:?}: expected exactly 40 lowercase hex characters")]
pub struct BadKey(pub String);

/// Decodes a 40-char lowercase hex string into 20 raw bytes.
///
/// Uppercase digits are rejected: the canonical textual form is lowercase
/// only, and accepting both would make textual keys ambiguous as KV data.
fn decode_hex_160(s: &str) -> Result<[u8; KEY_LEN], BadKey> {
    if s.len() != HEX_KEY_LEN
        || !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(BadKey(s.to_string()));
    }
    let mut out = [0u8; KEY_LEN];
    hex::decode_to_slice(s, &mut out).map_err(|_| BadKey(s.to_string()))?;
    Ok(out)
}

/// A 160-bit blob identifier supplied by the caller.
///
/// Canonical on-wire form is the raw 20 bytes; the accepted textual form is
/// exactly 40 lowercase hex characters. All routing decisions use the raw
/// bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileKey([u8; KEY_LEN]);

impl FileKey {
    /// Wraps 20 raw bytes as a file key.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses the 40-char lowercase hex form.
    pub fn parse(s: &str) -> Result<Self, BadKey> {
        decode_hex_160(s).map(Self)
    }

    /// The raw 20-byte value.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex rendering of the raw bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derives the chunk prefix for this key: SHA-1 over the **raw 20
    /// bytes**, not the hex form. This decouples the storage layout from the
    /// user-visible key.
    #[must_use]
    pub fn chunk_prefix(&self) -> ChunkPrefix {
        let digest: [u8; KEY_LEN] = Sha1::digest(self.0).into();
        ChunkPrefix::from_hash(digest)
    }
}

impl FromStr for FileKey {
    type Err = BadKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey({})", self.to_hex())
    }
}

/// A table's persistent 160-bit identity.
///
/// Generated randomly on first table creation, persisted in the reference-id
/// file, and immutable for the life of the table.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ReferenceId([u8; KEY_LEN]);

impl ReferenceId {
    /// Wraps 20 raw bytes as a reference id.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses the 40-char lowercase hex form.
    pub fn parse(s: &str) -> Result<Self, BadKey> {
        decode_hex_160(s).map(Self)
    }

    /// The raw 20-byte value.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex rendering of the raw bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ReferenceId {
    type Err = BadKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReferenceId({})", self.to_hex())
    }
}

/// Selects the shard for a file key: the first byte of `K XOR R`.
///
/// With 256 shards the first XOR byte is the whole index. Stable for a fixed
/// reference id across runs.
#[must_use]
pub fn shard_index(key: &FileKey, reference: &ReferenceId) -> u8 {
    key.0[0] ^ reference.0[0]
}

/// The 40-hex-char SHA-1 prefix shared by every chunk of one blob.
///
/// All chunk-key construction goes through this type so the textual layout
/// is defined in exactly one place.
#[derive(Clone, PartialEq, Eq)]
pub struct ChunkPrefix {
    hex: [u8; HEX_KEY_LEN],
}

impl ChunkPrefix {
    fn from_hash(hash: [u8; KEY_LEN]) -> Self {
        let mut hex_buf = [0u8; HEX_KEY_LEN];
        hex::encode_to_slice(hash, &mut hex_buf).expect("hex buffer sized exactly");
        Self { hex: hex_buf }
    }

    /// The 40-hex-char base key identifying the blob within its shard.
    #[must_use]
    pub fn base_key(&self) -> String {
        String::from_utf8(self.hex.to_vec()).expect("hex is ascii")
    }

    /// The chunk key for index `n`: `"<hex> <pad6(n)>"`, 47 bytes.
    ///
    /// `n` must not exceed [`MAX_CHUNK_INDEX`]; a seventh digit would break
    /// lexicographic ordering.
    #[must_use]
    pub fn key_at(&self, n: u32) -> Vec<u8> {
        debug_assert!(n <= MAX_CHUNK_INDEX);
        let mut key = Vec::with_capacity(CHUNK_KEY_LEN);
        key.extend_from_slice(&self.hex);
        key.push(b' ');
        key.extend_from_slice(format!("{n:06}").as_bytes());
        key
    }

    /// Inclusive range of every possible chunk key of this blob:
    /// `["<hex> 000000", "<hex> 999999"]`. Used for enumeration.
    #[must_use]
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        (self.key_at(0), self.key_at(MAX_CHUNK_INDEX))
    }

    /// The 41-byte prefix (`"<hex> "`) every chunk key of this blob starts
    /// with.
    #[must_use]
    pub fn range_start(&self) -> Vec<u8> {
        let mut start = Vec::with_capacity(HEX_KEY_LEN + 1);
        start.extend_from_slice(&self.hex);
        start.push(b' ');
        start
    }

    /// Exclusive upper bound for range deletes and scans: the 41-byte prefix
    /// with its trailing space incremented, which sorts above every chunk
    /// key of this blob and below any other key sharing the hex prefix.
    #[must_use]
    pub fn range_end_exclusive(&self) -> Vec<u8> {
        let mut end = self.range_start();
        *end.last_mut().expect("prefix is non-empty") = b' ' + 1;
        end
    }

    /// True when `key` is a chunk key of this blob.
    #[must_use]
    pub fn matches(&self, key: &[u8]) -> bool {
        key.len() > HEX_KEY_LEN && key[..HEX_KEY_LEN] == self.hex && key[HEX_KEY_LEN] == b' '
    }
}

impl fmt::Debug for ChunkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkPrefix({})", self.base_key())
    }
}

/// Splits a 47-byte chunk key into its 40-hex base key and chunk index.
///
/// Returns `None` for keys that are not well-formed chunk keys.
#[must_use]
pub fn split_chunk_key(key: &[u8]) -> Option<(&str, u32)> {
    if key.len() != CHUNK_KEY_LEN || key[HEX_KEY_LEN] != b' ' {
        return None;
    }
    let base = std::str::from_utf8(&key[..HEX_KEY_LEN]).ok()?;
    let index = std::str::from_utf8(&key[HEX_KEY_LEN + 1..]).ok()?;
    if !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, index.parse().ok()?))
}

/// Directory name of shard `index`: zero-padded three digits plus `.s`.
#[must_use]
pub fn sbucket_name(index: u8) -> String {
    format!("{index:03}.s")
}

/// Parses a shard directory name back to its index. Inverse of
/// [`sbucket_name`]; returns `None` for anything else (including the
/// reference-id file).
#[must_use]
pub fn parse_sbucket_name(name: &str) -> Option<u8> {
    let digits = name.strip_suffix(".s")?;
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Appends the canonical `.kfs` suffix to a table path unless it already
/// carries it.
#[must_use]
pub fn coerce_table_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(&format!(".{TABLE_EXT}")) {
        path.to_path_buf()
    } else {
        path.with_file_name(format!("{name}.{TABLE_EXT}"))
    }
}

/// Renders a byte count for humans: exact below 1 KiB, one decimal place in
/// binary units above.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
