//! Standard (binary descriptor, AES + SHA-1) password verification.

use aes::cipher::{BlockDecrypt, KeyInit, generic_array::GenericArray};
use aes::{Aes128, Aes192, Aes256};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use super::{ProbeError, ct_eq, password_to_utf16le};

const ITER_COUNT: u32 = 50_000;
const SHA1_LEN: usize = 20;
const AES_BLOCK: usize = 16;

const CALG_AES_128: u32 = 0x0000_660E;
const CALG_AES_192: u32 = 0x0000_660F;
const CALG_AES_256: u32 = 0x0000_6610;
const CALG_SHA1: u32 = 0x0000_8004;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StandardInfo {
    pub key_size_bits: u32,
    pub salt: Vec<u8>,
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: Vec<u8>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], ProbeError> {
        let end = self.pos.saturating_add(n);
        let out = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| ProbeError::Format(format!("truncated {what}")))?;
        self.pos = end;
        Ok(out)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, ProbeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse the binary descriptor that follows the 8-byte version header.
pub(crate) fn parse_standard_info(bytes: &[u8]) -> Result<StandardInfo, ProbeError> {
    let mut r = Cursor::new(bytes);
    let header_size = r.read_u32("EncryptionHeader size")? as usize;
    let header = r.take(header_size, "EncryptionHeader")?;

    let mut hr = Cursor::new(header);
    let _flags = hr.read_u32("EncryptionHeader.flags")?;
    let _size_extra = hr.read_u32("EncryptionHeader.sizeExtra")?;
    let alg_id = hr.read_u32("EncryptionHeader.algId")?;
    let alg_id_hash = hr.read_u32("EncryptionHeader.algIdHash")?;
    let key_size_bits = hr.read_u32("EncryptionHeader.keySize")?;

    let expected_bits = match alg_id {
        CALG_AES_128 => 128,
        CALG_AES_192 => 192,
        CALG_AES_256 => 256,
        other => {
            return Err(ProbeError::Unsupported(format!(
                "encryption algorithm 0x{other:08X}"
            )));
        }
    };
    if key_size_bits != expected_bits {
        return Err(ProbeError::Format(format!(
            "key size {key_size_bits} does not match algorithm 0x{alg_id:08X}"
        )));
    }
    if alg_id_hash != CALG_SHA1 {
        return Err(ProbeError::Unsupported(format!(
            "hash algorithm 0x{alg_id_hash:08X}"
        )));
    }

    let salt_size = r.read_u32("EncryptionVerifier.saltSize")?;
    if salt_size != 16 {
        return Err(ProbeError::Format(format!("salt size {salt_size}, expected 16")));
    }
    let salt = r.take(16, "EncryptionVerifier.salt")?.to_vec();
    let mut encrypted_verifier = [0u8; 16];
    encrypted_verifier.copy_from_slice(r.take(16, "EncryptionVerifier.encryptedVerifier")?);
    let hash_size = r.read_u32("EncryptionVerifier.verifierHashSize")?;
    if hash_size as usize != SHA1_LEN {
        return Err(ProbeError::Format(format!(
            "verifier hash size {hash_size}, expected 20"
        )));
    }
    let encrypted_verifier_hash = r
        .take(32, "EncryptionVerifier.encryptedVerifierHash")?
        .to_vec();

    Ok(StandardInfo {
        key_size_bits,
        salt,
        encrypted_verifier,
        encrypted_verifier_hash,
    })
}

fn sha1(parts: &[&[u8]]) -> [u8; SHA1_LEN] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Password to AES key derivation for Standard encryption.
pub(crate) fn derive_key(info: &StandardInfo, password: &str) -> Zeroizing<Vec<u8>> {
    let password_utf16 = Zeroizing::new(password_to_utf16le(password));
    let mut h = sha1(&[&info.salt, &password_utf16]);
    for i in 0..ITER_COUNT {
        h = sha1(&[&i.to_le_bytes(), &h]);
    }
    let h_final = sha1(&[&h, &0u32.to_le_bytes()]);

    let mut buf1 = [0x36u8; 64];
    let mut buf2 = [0x5Cu8; 64];
    for i in 0..SHA1_LEN {
        buf1[i] ^= h_final[i];
        buf2[i] ^= h_final[i];
    }
    let mut out = Zeroizing::new(Vec::with_capacity(SHA1_LEN * 2));
    out.extend_from_slice(&sha1(&[&buf1]));
    out.extend_from_slice(&sha1(&[&buf2]));
    out.truncate(info.key_size_bits as usize / 8);
    out
}

fn aes_ecb_decrypt_in_place(key: &[u8], buf: &mut [u8]) -> Result<(), ProbeError> {
    if buf.len() % AES_BLOCK != 0 {
        return Err(ProbeError::Format(format!(
            "ciphertext length {} is not a multiple of 16",
            buf.len()
        )));
    }

    fn decrypt_with<C>(key: &[u8], buf: &mut [u8]) -> Result<(), ProbeError>
    where
        C: BlockDecrypt + KeyInit,
    {
        let cipher = C::new_from_slice(key)
            .map_err(|_| ProbeError::Format(format!("invalid AES key length {}", key.len())))?;
        for block in buf.chunks_mut(AES_BLOCK) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    match key.len() {
        16 => decrypt_with::<Aes128>(key, buf),
        24 => decrypt_with::<Aes192>(key, buf),
        32 => decrypt_with::<Aes256>(key, buf),
        other => Err(ProbeError::Unsupported(format!("AES key length {other}"))),
    }
}

/// Check `password` against the verifier.
///
/// Returns the derived package key on a match.
pub(crate) fn check_password(
    info: &StandardInfo,
    password: &str,
) -> Result<Option<Zeroizing<Vec<u8>>>, ProbeError> {
    let key = derive_key(info, password);

    let mut verifier = info.encrypted_verifier;
    aes_ecb_decrypt_in_place(&key, &mut verifier)?;
    let expected = sha1(&[&verifier]);

    let mut verifier_hash = Zeroizing::new(info.encrypted_verifier_hash.clone());
    aes_ecb_decrypt_in_place(&key, &mut verifier_hash)?;

    if ct_eq(&expected, &verifier_hash[..SHA1_LEN]) {
        Ok(Some(key))
    } else {
        Ok(None)
    }
}

/// Decrypt the first block of the package payload.
pub(crate) fn decrypt_leading_block(key: &[u8], package: &[u8]) -> Result<Vec<u8>, ProbeError> {
    let (declared, payload) = super::office::split_package(package)?;
    let mut block = payload
        .get(..AES_BLOCK)
        .ok_or_else(|| ProbeError::Verification("encrypted package has no payload".to_string()))?
        .to_vec();
    aes_ecb_decrypt_in_place(key, &mut block)?;
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    block.truncate(declared.min(block.len()));
    Ok(block)
}
