//! Whole-file JSON read/write helpers. Every write is a full-file
//! serialization with two-space indentation; every read tolerates a missing
//! file (treated as empty) and a malformed file (logs a warning, treated as
//! empty) rather than failing the operation.

use cap_std::fs::Dir;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::paths::ensure_relative_and_contained;
use wfo_core::errors::{CoreError, CoreResult};

fn map_open_err(rel: &str, err: std::io::Error) -> CoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        CoreError::NotFound(rel.to_string())
    } else {
        CoreError::StorageUnavailable(format!("{rel}: {err}"))
    }
}

/// Reads and deserializes `rel`, or returns `None` if the file is absent or
/// fails to parse (a warning is logged in the latter case).
pub fn read_optional<T: DeserializeOwned>(dir: &Dir, rel: &str) -> CoreResult<Option<T>> {
    ensure_relative_and_contained(rel)?;
    let mut file = match dir.open(rel) {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(CoreError::StorageUnavailable(format!("{rel}: {err}"))),
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|err| CoreError::StorageUnavailable(format!("{rel}: {err}")))?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(path = rel, error = %err, "malformed JSON file, treating as absent");
            Ok(None)
        }
    }
}

/// Like `read_optional` but returns a caller-chosen default (typically an
/// empty `Vec`/map) instead of `None` when the file is missing or malformed.
pub fn read_or_default<T: DeserializeOwned + Default>(dir: &Dir, rel: &str) -> CoreResult<T> {
    Ok(read_optional(dir, rel)?.unwrap_or_default())
}

/// Serializes `value` as pretty (two-space indented) JSON and writes it to
/// `rel`, creating parent directories as needed, replacing any existing
/// content.
pub fn write_json<T: Serialize>(dir: &Dir, rel: &str, value: &T) -> CoreResult<()> {
    ensure_relative_and_contained(rel)?;
    if let Some(parent) = std::path::Path::new(rel).parent() {
        if !parent.as_os_str().is_empty() {
            dir.create_dir_all(parent).map_err(|err| CoreError::StorageUnavailable(format!("{parent:?}: {err}")))?;
        }
    }
    let mut body = serde_json::to_vec_pretty(value).map_err(|err| CoreError::Internal(err.to_string()))?;
    body.push(b'\n');
    let mut file = dir
        .create(rel)
        .map_err(|err| map_open_err(rel, err))?;
    file.write_all(&body).map_err(|err| CoreError::StorageUnavailable(format!("{rel}: {err}")))?;
    Ok(())
}

pub fn exists(dir: &Dir, rel: &str) -> bool {
    ensure_relative_and_contained(rel).is_ok() && dir.exists(rel)
}
