//! Probe for password-protected OOXML documents.
//!
//! Encrypted `.docx`/`.xlsx`/`.pptx` files are OLE/CFB containers holding two
//! streams: `EncryptionInfo` (the key descriptor) and `EncryptedPackage`
//! (an 8-byte plaintext size followed by the encrypted ZIP package).
//!
//! Signature: D0 CF 11 E0 A1 B1 1A E1

use std::io::{Cursor, Read};

use tracing::debug;

use crate::document::Document;

use super::agile::{self, AgileInfo};
use super::standard::{self, StandardInfo};
use super::{DecryptionProbe, ProbeError, ProbeOutcome, ProbeSession};

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_SIGNATURE: &[u8; 2] = b"PK";

const ENCRYPTION_INFO_STREAM: &str = "EncryptionInfo";
const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

#[derive(Debug, Clone)]
pub(crate) enum Descriptor {
    Agile(AgileInfo),
    Standard(StandardInfo),
}

/// Office document probe.
///
/// With `verify_output` set, a verifier match only counts once the leading
/// package block decrypts to a ZIP signature.
#[derive(Debug, Clone, Copy)]
pub struct OfficeProbe {
    verify_output: bool,
}

impl OfficeProbe {
    pub fn new(verify_output: bool) -> Self {
        Self { verify_output }
    }
}

impl DecryptionProbe for OfficeProbe {
    fn open_session(&self, document: &Document) -> Result<Box<dyn ProbeSession>, ProbeError> {
        let bytes = document.read_all()?;
        let (descriptor, package) = read_container(&bytes)?;
        Ok(Box::new(OfficeSession {
            descriptor,
            package,
            verify_output: self.verify_output,
        }))
    }
}

struct OfficeSession {
    descriptor: Descriptor,
    package: Vec<u8>,
    verify_output: bool,
}

impl ProbeSession for OfficeSession {
    fn try_password(&mut self, candidate: &str) -> Result<ProbeOutcome, ProbeError> {
        let leading = match &self.descriptor {
            Descriptor::Agile(info) => {
                let Some(secret) = agile::check_password(info, candidate)? else {
                    return Ok(ProbeOutcome::NoMatch);
                };
                if !self.verify_output {
                    return Ok(ProbeOutcome::Match);
                }
                agile::decrypt_leading_segment(info, &secret, &self.package)?
            }
            Descriptor::Standard(info) => {
                let Some(key) = standard::check_password(info, candidate)? else {
                    return Ok(ProbeOutcome::NoMatch);
                };
                if !self.verify_output {
                    return Ok(ProbeOutcome::Match);
                }
                standard::decrypt_leading_block(&key, &self.package)?
            }
        };

        if leading.starts_with(ZIP_SIGNATURE) {
            Ok(ProbeOutcome::Match)
        } else {
            debug!("verifier matched but package did not decrypt to a ZIP");
            Err(ProbeError::Verification(
                "verifier matched but decrypted package is not a ZIP archive".to_string(),
            ))
        }
    }
}

/// Read and parse both streams out of the CFB container.
pub(crate) fn read_container(bytes: &[u8]) -> Result<(Descriptor, Vec<u8>), ProbeError> {
    if bytes.len() < OLE_SIGNATURE.len() || bytes[..OLE_SIGNATURE.len()] != OLE_SIGNATURE {
        return Err(ProbeError::Unsupported(
            "not an OLE/CFB container (is the document encrypted?)".to_string(),
        ));
    }

    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    let mut info_bytes = Vec::new();
    ole.open_stream(ENCRYPTION_INFO_STREAM)
        .map_err(|_| missing_stream(ENCRYPTION_INFO_STREAM))?
        .read_to_end(&mut info_bytes)?;
    let mut package = Vec::new();
    ole.open_stream(ENCRYPTED_PACKAGE_STREAM)
        .map_err(|_| missing_stream(ENCRYPTED_PACKAGE_STREAM))?
        .read_to_end(&mut package)?;

    Ok((parse_descriptor(&info_bytes)?, package))
}

fn missing_stream(name: &str) -> ProbeError {
    ProbeError::Unsupported(format!("container has no {name} stream"))
}

/// Dispatch on the `EncryptionInfo` version header.
pub(crate) fn parse_descriptor(bytes: &[u8]) -> Result<Descriptor, ProbeError> {
    if bytes.len() < 8 {
        return Err(ProbeError::Format("truncated EncryptionInfo header".to_string()));
    }
    let major = u16::from_le_bytes([bytes[0], bytes[1]]);
    let minor = u16::from_le_bytes([bytes[2], bytes[3]]);
    let body = &bytes[8..];
    match (major, minor) {
        (4, 4) => Ok(Descriptor::Agile(agile::parse_agile_info(body)?)),
        (2..=4, 2) => Ok(Descriptor::Standard(standard::parse_standard_info(body)?)),
        _ => Err(ProbeError::Unsupported(format!(
            "EncryptionInfo version {major}.{minor}"
        ))),
    }
}

/// Split an `EncryptedPackage` stream into declared size and ciphertext.
pub(crate) fn split_package(package: &[u8]) -> Result<(u64, &[u8]), ProbeError> {
    if package.len() < 8 {
        return Err(ProbeError::Verification(
            "encrypted package is truncated".to_string(),
        ));
    }
    let mut size = [0u8; 8];
    size.copy_from_slice(&package[..8]);
    let declared = u64::from_le_bytes(size);
    if declared == 0 {
        return Err(ProbeError::Verification(
            "encrypted package declares zero length".to_string(),
        ));
    }
    Ok((declared, &package[8..]))
}
