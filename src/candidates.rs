//! # Candidate Sources
//!
//! Loading the ordered password candidate list. Lines are decoded as UTF-8
//! and fall back to Windows-1252 when a line is not valid UTF-8, so legacy
//! wordlists load without dropping entries.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("wordlist not found: {0}")]
    NotFound(PathBuf),
    #[error("wordlist is empty: {0}")]
    Empty(PathBuf),
    #[error("no usable candidates in {0}")]
    NoCandidates(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces the ordered candidate sequence for a run.
pub trait CandidateSource {
    fn load(&self) -> Result<Vec<String>, CandidateError>;
}

/// Newline-separated wordlist on disk.
#[derive(Debug, Clone)]
pub struct WordlistFile {
    path: PathBuf,
}

impl WordlistFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl CandidateSource for WordlistFile {
    fn load(&self) -> Result<Vec<String>, CandidateError> {
        if !self.path.exists() {
            return Err(CandidateError::NotFound(self.path.clone()));
        }
        let bytes = std::fs::read(&self.path)?;
        if bytes.is_empty() {
            return Err(CandidateError::Empty(self.path.clone()));
        }
        let candidates = parse_wordlist(&bytes);
        if candidates.is_empty() {
            return Err(CandidateError::NoCandidates(
                self.path.display().to_string(),
            ));
        }
        Ok(candidates)
    }
}

/// Candidates held in memory, used as-is.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    candidates: Vec<String>,
}

impl InMemorySource {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

impl CandidateSource for InMemorySource {
    fn load(&self) -> Result<Vec<String>, CandidateError> {
        if self.candidates.is_empty() {
            return Err(CandidateError::NoCandidates("in-memory source".to_string()));
        }
        Ok(self.candidates.clone())
    }
}

/// Split raw wordlist bytes into trimmed, non-empty candidates.
///
/// Order and duplicates are preserved.
pub fn parse_wordlist(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == b'\n')
        .map(decode_line)
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (cow, _, _) = WINDOWS_1252.decode(raw);
            cow
        }
    }
}
