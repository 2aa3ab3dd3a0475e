use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::warn;

/// Upper bound on ` (N)` suffixes tried before giving up.
pub const MAX_NAME_PROBES: u32 = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub path: PathBuf,
    pub length: usize,
    pub sha256: String,
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("create {dir}: {source}")]
    CreateDir { dir: PathBuf, source: io::Error },

    #[error("no free name for {name} in {dir}")]
    NoFreeName { dir: PathBuf, name: String },

    #[error("write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Split `name` into stem and extension the way `foo.tar.gz` -> (`foo.tar`, `.gz`).
///
/// Leading dots belong to the stem, so `.bashrc` has no extension.
pub fn split_ext(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(i) => name.split_at(leading + i),
        None => (name, ""),
    }
}

/// Candidate name for the `n`th probe: `photo.jpg`, `photo (1).jpg`, `photo (2).jpg`, ...
pub fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let (stem, ext) = split_ext(name);
    format!("{stem} ({n}){ext}")
}

/// Atomically reserve a free name by creating an empty placeholder.
fn claim_unique(dir: &Path, name: &str) -> Result<PathBuf, StorageError> {
    for n in 0..MAX_NAME_PROBES {
        let candidate = dir.join(numbered_name(name, n));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(StorageError::Write {
                    path: candidate,
                    source,
                })
            }
        }
    }
    Err(StorageError::NoFreeName {
        dir: dir.to_path_buf(),
        name: name.to_string(),
    })
}

/// Save `bytes` under `dir`, never overwriting an existing file.
///
/// The final name is claimed first, content goes to a hidden sibling temp file and is
/// renamed over the claim only once fully written, so the returned path is complete.
pub fn save_unique(dir: &Path, name: &str, bytes: &[u8]) -> Result<SavedFile, StorageError> {
    fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    let path = claim_unique(dir, name)?;
    let temp = tempfile::Builder::new()
        .prefix(".spacedrop-")
        .suffix(".part")
        .tempfile_in(dir);

    let result = temp
        .and_then(|mut t| {
            t.write_all(bytes)?;
            t.as_file().sync_all()?;
            t.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        });

    if let Err(e) = result {
        if let Err(rm) = fs::remove_file(&path) {
            warn!(error = %rm, path = %path.display(), "failed to release claimed name");
        }
        return Err(e);
    }

    Ok(SavedFile {
        path,
        length: bytes.len(),
        sha256: hex::encode(Sha256::digest(bytes)),
    })
}
