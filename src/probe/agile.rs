//! Agile (XML descriptor) password verification.
//!
//! The password hash is `H0 = Hash(salt || password)` followed by
//! `spinCount` rounds of `H = Hash(LE32(i) || H)`. Block keys derived from
//! `H` decrypt the verifier input and verifier hash; a candidate matches
//! when `Hash(verifierInput)` equals the decrypted verifier hash prefix.

use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use zeroize::Zeroizing;

use super::{HashAlgorithm, ProbeError, ct_eq, password_to_utf16le};

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];

const VERIFIER_HASH_INPUT_LEN: usize = 16;
const AES_BLOCK: usize = 16;
/// Plaintext bytes per `EncryptedPackage` segment.
pub(crate) const SEGMENT_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AgileInfo {
    pub key_data_salt: Vec<u8>,
    pub key_data_hash: HashAlgorithm,
    pub key_data_block_size: usize,

    pub spin_count: u32,
    pub password_salt: Vec<u8>,
    pub password_hash: HashAlgorithm,
    pub password_key_bits: usize,
    pub encrypted_key_value: Vec<u8>,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
}

#[derive(Default)]
struct KeyData {
    salt: Option<Vec<u8>>,
    hash: Option<HashAlgorithm>,
    block_size: Option<usize>,
}

#[derive(Default)]
struct PasswordKey {
    spin_count: Option<u32>,
    salt: Option<Vec<u8>>,
    hash: Option<HashAlgorithm>,
    key_bits: Option<usize>,
    key_value: Option<Vec<u8>>,
    verifier_input: Option<Vec<u8>>,
    verifier_value: Option<Vec<u8>>,
}

/// Parse the XML payload that follows the 8-byte version header.
pub(crate) fn parse_agile_info(xml_bytes: &[u8]) -> Result<AgileInfo, ProbeError> {
    let xml = std::str::from_utf8(xml_bytes)
        .map_err(|_| format_err("agile descriptor is not valid UTF-8"))?;
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut key_data = KeyData::default();
    let mut password = PasswordKey::default();

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => match e.local_name().as_ref() {
                b"keyData" => parse_key_data(&e, &mut key_data)?,
                b"encryptedKey" if has_attr(&e, b"spinCount") => {
                    parse_password_key(&e, &mut password)?
                }
                _ => {}
            },
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(format_err(&format!("agile descriptor XML: {err}"))),
        }
    }

    let missing = |what: &str| format_err(&format!("agile descriptor is missing {what}"));
    let info = AgileInfo {
        key_data_salt: key_data.salt.ok_or_else(|| missing("keyData.saltValue"))?,
        key_data_hash: key_data.hash.ok_or_else(|| missing("keyData.hashAlgorithm"))?,
        key_data_block_size: key_data
            .block_size
            .ok_or_else(|| missing("keyData.blockSize"))?,
        spin_count: password
            .spin_count
            .ok_or_else(|| missing("encryptedKey.spinCount"))?,
        password_salt: password.salt.ok_or_else(|| missing("encryptedKey.saltValue"))?,
        password_hash: password
            .hash
            .ok_or_else(|| missing("encryptedKey.hashAlgorithm"))?,
        password_key_bits: password
            .key_bits
            .ok_or_else(|| missing("encryptedKey.keyBits"))?,
        encrypted_key_value: password
            .key_value
            .ok_or_else(|| missing("encryptedKey.encryptedKeyValue"))?,
        encrypted_verifier_hash_input: password
            .verifier_input
            .ok_or_else(|| missing("encryptedKey.encryptedVerifierHashInput"))?,
        encrypted_verifier_hash_value: password
            .verifier_value
            .ok_or_else(|| missing("encryptedKey.encryptedVerifierHashValue"))?,
    };
    check_sizes(&info)?;
    Ok(info)
}

/// Key and block sizes must be ones AES supports before any key is derived.
fn check_sizes(info: &AgileInfo) -> Result<(), ProbeError> {
    if !matches!(info.password_key_bits, 128 | 192 | 256) {
        return Err(format_err(&format!(
            "encryptedKey.keyBits {} is not an AES key size",
            info.password_key_bits
        )));
    }
    if info.key_data_block_size != AES_BLOCK {
        return Err(format_err(&format!(
            "keyData.blockSize {} is not the AES block size",
            info.key_data_block_size
        )));
    }
    Ok(())
}

fn has_attr(e: &BytesStart<'_>, name: &[u8]) -> bool {
    e.attributes()
        .with_checks(false)
        .flatten()
        .any(|attr| attr.key.local_name().as_ref() == name)
}

fn parse_key_data(e: &BytesStart<'_>, out: &mut KeyData) -> Result<(), ProbeError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| format_err("invalid keyData attribute"))?;
        let value = attr.value.as_ref();
        match attr.key.local_name().as_ref() {
            b"saltValue" => out.salt = Some(decode_base64(value)?),
            b"hashAlgorithm" => out.hash = Some(HashAlgorithm::parse(attr_str(value)?)?),
            b"blockSize" => out.block_size = Some(parse_number(value)?),
            _ => {}
        }
    }
    Ok(())
}

fn parse_password_key(e: &BytesStart<'_>, out: &mut PasswordKey) -> Result<(), ProbeError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| format_err("invalid encryptedKey attribute"))?;
        let value = attr.value.as_ref();
        match attr.key.local_name().as_ref() {
            b"spinCount" => out.spin_count = Some(parse_number(value)?),
            b"saltValue" => out.salt = Some(decode_base64(value)?),
            b"hashAlgorithm" => out.hash = Some(HashAlgorithm::parse(attr_str(value)?)?),
            b"keyBits" => out.key_bits = Some(parse_number(value)?),
            b"encryptedKeyValue" => out.key_value = Some(decode_base64(value)?),
            b"encryptedVerifierHashInput" => out.verifier_input = Some(decode_base64(value)?),
            b"encryptedVerifierHashValue" => out.verifier_value = Some(decode_base64(value)?),
            _ => {}
        }
    }
    Ok(())
}

fn attr_str(value: &[u8]) -> Result<&str, ProbeError> {
    std::str::from_utf8(value).map_err(|_| format_err("attribute is not valid UTF-8"))
}

fn parse_number<T: std::str::FromStr>(value: &[u8]) -> Result<T, ProbeError> {
    attr_str(value)?
        .trim()
        .parse::<T>()
        .map_err(|_| format_err("invalid numeric attribute"))
}

/// Pretty-printed descriptors may wrap base64 values and omit padding.
fn decode_base64(value: &[u8]) -> Result<Vec<u8>, ProbeError> {
    let cleaned: Vec<u8> = value
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
        .map_err(|_| format_err("invalid base64 attribute"))
}

fn format_err(msg: &str) -> ProbeError {
    ProbeError::Format(msg.to_string())
}

fn iterated_hash(info: &AgileInfo, password: &str) -> Zeroizing<Vec<u8>> {
    let password_utf16 = Zeroizing::new(password_to_utf16le(password));
    let mut h = Zeroizing::new(
        info.password_hash
            .digest(&[&info.password_salt, &password_utf16]),
    );
    for i in 0..info.spin_count {
        let next = info.password_hash.digest(&[&i.to_le_bytes(), &h]);
        h.copy_from_slice(&next);
    }
    h
}

/// `Hash(H || blockKey)` truncated, or padded with 0x36, to `key_bits / 8`.
fn derive_key(
    h: &[u8],
    block_key: &[u8],
    hash: HashAlgorithm,
    key_bits: usize,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(hash.digest(&[h, block_key]));
    key.resize(key_bits / 8, 0x36);
    key
}

fn cbc_decrypt_with<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), ProbeError>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| format_err("invalid AES key or IV length"))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| format_err("AES-CBC decryption failed"))?;
    Ok(())
}

fn aes_cbc_decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, ProbeError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK != 0 {
        return Err(format_err("ciphertext is not a whole number of AES blocks"));
    }
    let iv = iv
        .get(..AES_BLOCK)
        .ok_or_else(|| format_err("IV shorter than one AES block"))?;
    let mut buf = ciphertext.to_vec();
    match key.len() {
        16 => cbc_decrypt_with::<Aes128>(key, iv, &mut buf)?,
        24 => cbc_decrypt_with::<Aes192>(key, iv, &mut buf)?,
        32 => cbc_decrypt_with::<Aes256>(key, iv, &mut buf)?,
        other => {
            return Err(ProbeError::Unsupported(format!("AES key length {other}")));
        }
    }
    Ok(buf)
}

/// Check `password` against the verifier.
///
/// Returns the package secret key when the verifier matches and `None` for
/// a wrong password.
pub(crate) fn check_password(
    info: &AgileInfo,
    password: &str,
) -> Result<Option<Zeroizing<Vec<u8>>>, ProbeError> {
    check_sizes(info)?;
    let h = iterated_hash(info, password);
    let hash = info.password_hash;
    let bits = info.password_key_bits;

    let input_key = derive_key(&h, &VERIFIER_HASH_INPUT_BLOCK, hash, bits);
    let verifier_input = Zeroizing::new(aes_cbc_decrypt(
        &info.encrypted_verifier_hash_input,
        &input_key,
        &info.password_salt,
    )?);
    let value_key = derive_key(&h, &VERIFIER_HASH_VALUE_BLOCK, hash, bits);
    let verifier_value = Zeroizing::new(aes_cbc_decrypt(
        &info.encrypted_verifier_hash_value,
        &value_key,
        &info.password_salt,
    )?);

    let input = verifier_input
        .get(..VERIFIER_HASH_INPUT_LEN)
        .ok_or_else(|| format_err("verifier input is truncated"))?;
    let expected = hash.digest(&[input]);
    let Some(actual) = verifier_value.get(..hash.output_len()) else {
        return Err(format_err("verifier hash is truncated"));
    };
    if !ct_eq(&expected, actual) {
        return Ok(None);
    }

    let secret_key_key = derive_key(&h, &KEY_VALUE_BLOCK, hash, bits);
    let mut secret =
        Zeroizing::new(aes_cbc_decrypt(&info.encrypted_key_value, &secret_key_key, &info.password_salt)?);
    if secret.len() < bits / 8 {
        return Err(format_err("decrypted key value is truncated"));
    }
    secret.truncate(bits / 8);
    Ok(Some(secret))
}

/// Decrypt the first segment of an `EncryptedPackage` stream.
///
/// `package` includes the 8-byte size prefix. The returned plaintext is
/// clipped to the declared package size.
pub(crate) fn decrypt_leading_segment(
    info: &AgileInfo,
    secret_key: &[u8],
    package: &[u8],
) -> Result<Vec<u8>, ProbeError> {
    let (declared, payload) = super::office::split_package(package)?;
    let take = payload.len().min(SEGMENT_LEN) / AES_BLOCK * AES_BLOCK;
    if take == 0 {
        return Err(ProbeError::Verification(
            "encrypted package has no payload".to_string(),
        ));
    }
    let mut iv = info
        .key_data_hash
        .digest(&[&info.key_data_salt, &0u32.to_le_bytes()]);
    iv.resize(info.key_data_block_size, 0x36);
    let mut plain = aes_cbc_decrypt(&payload[..take], secret_key, &iv)?;
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    plain.truncate(declared.min(plain.len()));
    Ok(plain)
}
