//! Whole-file reads and atomic whole-file writes.

use std::{
  ffi::OsString,
  fs,
  io,
  path::{Path, PathBuf},
};

use crate::{Error, Result};

/// What was found at a store path.
pub(crate) enum Document {
  Missing,
  Unreadable(String),
  Parsed(serde_json::Value),
}

/// Read and parse the JSON document at `path`. Never fails.
pub(crate) fn read_document(path: &Path) -> Document {
  let raw = match fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Document::Missing,
    Err(e) => return Document::Unreadable(e.to_string()),
  };
  match serde_json::from_str(&raw) {
    Ok(value) => Document::Parsed(value),
    Err(e) => Document::Unreadable(e.to_string()),
  }
}

/// `<file>.tmp` next to `path`.
fn temp_path(path: &Path) -> PathBuf {
  let mut name = path
    .file_name()
    .map(OsString::from)
    .unwrap_or_else(|| OsString::from("store"));
  name.push(".tmp");
  path.with_file_name(name)
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub(crate) fn atomic_write(path: &Path, contents: &str) -> Result<()> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
  };

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }

  let temp = temp_path(path);
  fs::write(&temp, contents).map_err(io_err(&temp))?;
  fs::rename(&temp, path).map_err(io_err(path))?;
  Ok(())
}
