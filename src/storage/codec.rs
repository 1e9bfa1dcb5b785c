//! On-disk representation of the parameter document.
//!
//! The file is pretty-printed UTF-8 JSON with one top-level property per
//! group; keys are sorted so successive snapshots diff cleanly. Writes go to
//! a uniquely named temporary file in the same directory which is then
//! renamed over the target, so readers see either the old or the new
//! document in full.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::engine::types::ParameterDocument;
use crate::storage::error::{Result, StoreError};

/// A document as read from disk, already merged with defaults.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub document: ParameterDocument,
    /// False when the file was absent or empty.
    pub existed: bool,
    /// Groups and keys supplied by the defaults during the merge.
    pub added: usize,
}

impl Loaded {
    /// Whether the merged document differs from what is on disk.
    pub fn needs_write(&self) -> bool {
        !self.existed || self.added > 0
    }
}

/// Read `path` and merge `defaults` into it.
///
/// A missing or blank file yields a copy of `defaults`. Bytes that do not
/// parse as a JSON object of objects fail with
/// [`StoreError::CorruptDocument`]; the file is not touched.
pub fn load(path: &Path, defaults: &ParameterDocument) -> Result<Loaded> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Loaded {
            document: defaults.clone(),
            existed: false,
            added: 0,
        });
    }

    let mut document = decode(&bytes).map_err(|source| StoreError::CorruptDocument {
        path: path.to_path_buf(),
        source,
    })?;
    let added = document.merge_defaults(defaults);
    if added > 0 {
        debug!(path = %path.display(), added, "defaults missing from parameter document");
    }

    Ok(Loaded {
        document,
        existed: true,
        added,
    })
}

pub fn decode(bytes: &[u8]) -> serde_json::Result<ParameterDocument> {
    serde_json::from_slice(bytes)
}

/// Deterministic, human-readable serialization (sorted keys, trailing newline).
pub fn dump(document: &ParameterDocument) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Serialize `document` and atomically replace `path` with it.
pub fn store(path: &Path, document: &ParameterDocument) -> Result<()> {
    let bytes = dump(document).map_err(|e| StoreError::io(path, std::io::Error::other(e)))?;
    write_atomic(path, &bytes)
}

/// Write `bytes` to a temporary sibling of `path`, flush it, and rename it into place.
///
/// An existing target's permissions carry over to the replacement.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path);

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        match std::fs::metadata(path) {
            Ok(meta) => file.set_permissions(meta.permissions())?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(StoreError::io(path, e));
    }

    sync_parent_dir(path);
    debug!(path = %path.display(), bytes = bytes.len(), "parameter document replaced");
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "parameters".to_string());
    let tmp_name = format!(".{}.{}.tmp", name.trim_start_matches('.'), Uuid::new_v4().simple());
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    // Best effort.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
