//! # Decryption Probes
//!
//! A probe answers one question for one candidate: does this password
//! unlock the document? The search pipeline treats every call as an opaque,
//! blocking operation.
//!
//! Each worker opens its own [`ProbeSession`] so sessions never need to be
//! re-entrant or shared across threads.

mod agile;
pub mod office;
mod standard;

use thiserror::Error;

use crate::document::{Document, DocumentError};

pub use office::OfficeProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Match,
    NoMatch,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
    #[error("invalid encryption format: {0}")]
    Format(String),
    #[error("unsupported encryption: {0}")]
    Unsupported(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("probe error: {0}")]
    Other(String),
}

/// Opens per-worker sessions against a document.
pub trait DecryptionProbe: Send + Sync {
    fn open_session(&self, document: &Document) -> Result<Box<dyn ProbeSession>, ProbeError>;
}

/// One worker's private view of the document.
pub trait ProbeSession {
    fn try_password(&mut self, candidate: &str) -> Result<ProbeOutcome, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub(crate) fn parse(name: &str) -> Result<Self, ProbeError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            other => Err(ProbeError::Unsupported(format!("hash algorithm {other}"))),
        }
    }

    pub(crate) fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Hash the concatenation of `parts`.
    pub(crate) fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: sha2::Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(parts),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(parts),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(parts),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(parts),
        }
    }
}

pub(crate) fn password_to_utf16le(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() * 2);
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
