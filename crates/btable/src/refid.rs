//! Reference-id manager.
//!
//! Every table carries a persistent 160-bit identity in a reserved file
//! named `r` at the table root. It is generated once, on first open, from a
//! cryptographically strong source (or taken from configuration), and never
//! changes afterwards: the XOR shard assignment of every stored blob
//! depends on it.
//!
//! The file is written temp-then-rename so a crash during first open leaves
//! either no reference id or a complete one, never a short read.

use keys::ReferenceId;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

/// Reserved filename of the reference-id file at the table root.
pub const REFERENCE_ID_FILE: &str = "r";

const REFERENCE_ID_TMP: &str = "r.tmp";

/// Loads the table's reference id, creating it on first open.
///
/// A configured id only applies to table creation; once the file exists it
/// is authoritative and a differing override is ignored with a warning.
pub(crate) fn load_or_create(root: &Path, configured: Option<ReferenceId>) -> Result<ReferenceId> {
    let path = root.join(REFERENCE_ID_FILE);

    if !path.exists() {
        let id = configured.unwrap_or_else(random_id);
        write_atomic(root, &path, &id)?;
        tracing::debug!(reference_id = %id, root = %root.display(), "created table identity");
        return Ok(id);
    }

    let bytes = fs::read(&path)?;
    let raw: [u8; keys::KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        Error::corrupt(format!(
            "reference-id file {} holds {} bytes, expected {}",
            path.display(),
            bytes.len(),
            keys::KEY_LEN
        ))
    })?;
    let id = ReferenceId::from_bytes(raw);

    if let Some(requested) = configured {
        if requested != id {
            tracing::warn!(
                stored = %id,
                requested = %requested,
                "reference id is immutable; ignoring configured override"
            );
        }
    }
    Ok(id)
}

fn random_id() -> ReferenceId {
    let mut bytes = [0u8; keys::KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    ReferenceId::from_bytes(bytes)
}

fn write_atomic(root: &Path, path: &Path, id: &ReferenceId) -> Result<()> {
    let tmp = root.join(REFERENCE_ID_TMP);
    {
        let mut f: File = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(id.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
