//! Best-effort file output helpers.
//!
//! Snapshot files are written through a temporary sibling and atomically
//! renamed so readers never observe a half-written document. Filesystem
//! failures are the caller's to log; the in-memory pipeline stays
//! authoritative.

use std::fs;
use std::io;
use std::path::Path;

/// Write `contents` to `path` atomically (temp file + rename).
/// Parent directories are created on demand.
pub fn write_atomic<P: AsRef<Path>>(path: P, contents: &str) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<P: AsRef<Path>, T: serde::Serialize>(path: P, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(path, &json)
}
