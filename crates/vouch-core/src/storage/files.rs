use crate::embeddings::util::sha256_hex;
use crate::errors::{EvalError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name (without extension) for a record id.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`; when that changed the id, a
/// short hash of the original is appended so distinct ids never share a file.
pub fn file_stem_for_id(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized == id && !id.is_empty() && !id.starts_with('.') {
        sanitized
    } else {
        format!("{}-{}", sanitized, &sha256_hex(id)[..8])
    }
}

pub fn record_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", file_stem_for_id(id)))
}

pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = serde_json::from_slice(&raw).map_err(|e| {
        EvalError::Storage(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// Writes `value` as pretty JSON via a temp file in the same directory and an
/// atomic rename, so readers see either the old record or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| EvalError::Storage(format!("failed to persist {}: {}", path.display(), e)))?;
    Ok(())
}
