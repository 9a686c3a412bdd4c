use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),
    #[error("document is empty: {0}")]
    Empty(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the encrypted target file.
///
/// Only the path and size are kept; probes open their own readers so no
/// file handle is shared between workers.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    len: u64,
}

impl Document {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        if !path.exists() {
            return Err(DocumentError::NotFound(path.to_path_buf()));
        }
        let len = std::fs::metadata(path)?.len();
        if len == 0 {
            return Err(DocumentError::Empty(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_all(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Hex SHA-256 of the document contents.
pub fn compute_sha256(document: &Document, buf_size: usize) -> Result<String, DocumentError> {
    let mut file = File::open(document.path())?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
