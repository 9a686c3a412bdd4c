//! Shared test infrastructure.
//!
//! Stub probes with scripted behaviour for the orchestration tests, and
//! builders for small encrypted Office containers used by the probe tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use aes::Aes128;
use aes::cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, generic_array::GenericArray};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cipher::block_padding::NoPadding;
use sha1::{Digest, Sha1};

use docunlock::document::Document;
use docunlock::pipeline::{SearchOptions, Strategy};
use docunlock::probe::{DecryptionProbe, ProbeError, ProbeOutcome, ProbeSession};

// ============================================================================
// Scripted probe
// ============================================================================

/// Probe whose answers are scripted per candidate.
#[derive(Default, Clone)]
pub struct ScriptedProbe {
    pub passwords: HashSet<String>,
    pub delays: HashMap<String, Duration>,
    pub failures: HashSet<String>,
    pub panics: HashSet<String>,
    pub calls: Arc<AtomicU64>,
    pub sessions: Arc<AtomicU64>,
}

impl ScriptedProbe {
    pub fn matching(password: &str) -> Self {
        let mut probe = Self::default();
        probe.passwords.insert(password.to_string());
        probe
    }

    pub fn nothing_matches() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, candidate: &str, delay: Duration) -> Self {
        self.delays.insert(candidate.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, candidate: &str) -> Self {
        self.failures.insert(candidate.to_string());
        self
    }

    pub fn panicking_on(mut self, candidate: &str) -> Self {
        self.panics.insert(candidate.to_string());
        self
    }

    pub fn also_matching(mut self, candidate: &str) -> Self {
        self.passwords.insert(candidate.to_string());
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DecryptionProbe for ScriptedProbe {
    fn open_session(&self, _document: &Document) -> Result<Box<dyn ProbeSession>, ProbeError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

impl ProbeSession for ScriptedProbe {
    fn try_password(&mut self, candidate: &str) -> Result<ProbeOutcome, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(candidate) {
            thread::sleep(*delay);
        }
        if self.panics.contains(candidate) {
            panic!("scripted panic on {candidate}");
        }
        if self.failures.contains(candidate) {
            return Err(ProbeError::Other(format!("scripted failure on {candidate}")));
        }
        if self.passwords.contains(candidate) {
            Ok(ProbeOutcome::Match)
        } else {
            Ok(ProbeOutcome::NoMatch)
        }
    }
}

/// Probe that never answers within any test's patience.
pub struct HangingProbe;

struct HangingSession;

impl DecryptionProbe for HangingProbe {
    fn open_session(&self, _document: &Document) -> Result<Box<dyn ProbeSession>, ProbeError> {
        Ok(Box::new(HangingSession))
    }
}

impl ProbeSession for HangingSession {
    fn try_password(&mut self, _candidate: &str) -> Result<ProbeOutcome, ProbeError> {
        thread::sleep(Duration::from_secs(600));
        Ok(ProbeOutcome::NoMatch)
    }
}

/// Probe whose sessions can never be opened.
pub struct UnopenableProbe;

impl DecryptionProbe for UnopenableProbe {
    fn open_session(&self, _document: &Document) -> Result<Box<dyn ProbeSession>, ProbeError> {
        Err(ProbeError::Unsupported("scripted open failure".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// A non-empty placeholder document for stub-probe runs.
pub fn placeholder_document(dir: &Path) -> Document {
    let path = dir.join("locked.docx");
    std::fs::write(&path, b"placeholder").expect("write document");
    Document::open(&path).expect("open document")
}

pub fn options(strategy: Strategy, concurrency: usize, chunk_size: usize, timeout: Duration) -> SearchOptions {
    let mut opts = SearchOptions::new(strategy);
    opts.concurrency = concurrency;
    opts.chunk_size = chunk_size;
    opts.timeout = timeout;
    opts
}

pub fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Encrypted Office fixtures
// ============================================================================

pub const ZIP_HEADER: &[u8] = b"PK\x03\x04\x14\x00\x06\x00fixture-payload";

fn utf16le(password: &str) -> Vec<u8> {
    password.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn sha1(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

fn pad_to_block(mut data: Vec<u8>) -> Vec<u8> {
    let padded = data.len().div_ceil(16).max(1) * 16;
    data.resize(padded, 0);
    data
}

fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = pad_to_block(plaintext.to_vec());
    let len = buf.len();
    cbc::Encryptor::<Aes128>::new_from_slices(key, &iv[..16])
        .expect("cbc key")
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .expect("cbc encrypt");
    buf
}

fn ecb_encrypt(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = pad_to_block(plaintext.to_vec());
    let cipher = Aes128::new_from_slice(key).expect("ecb key");
    for block in buf.chunks_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    buf
}

fn package_stream(plaintext: &[u8], ciphertext: Vec<u8>) -> Vec<u8> {
    let mut out = (plaintext.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(&ciphertext);
    out
}

/// Write a CFB container holding the two encryption streams.
pub fn write_container(path: &Path, encryption_info: &[u8], encrypted_package: &[u8]) -> PathBuf {
    let mut comp = cfb::create(path).expect("create cfb");
    for (name, bytes) in [
        ("/EncryptionInfo", encryption_info),
        ("/EncryptedPackage", encrypted_package),
    ] {
        let mut stream = comp.create_stream(name).expect("create stream");
        stream.write_all(bytes).expect("write stream");
        stream.flush().expect("flush stream");
    }
    comp.flush().expect("flush cfb");
    path.to_path_buf()
}

/// Agile (4.4) container, AES-128 + SHA-1 with a short spin count.
pub fn agile_document(dir: &Path, password: &str, package_plaintext: &[u8]) -> PathBuf {
    let spin_count = 1000u32;
    let password_salt = [0x11u8; 16];
    let key_data_salt = [0x22u8; 16];

    let mut h = sha1(&[&password_salt, &utf16le(password)]);
    for i in 0..spin_count {
        h = sha1(&[&i.to_le_bytes(), &h]);
    }
    let block_key = |block: &[u8]| {
        let mut key = sha1(&[&h, block]);
        key.truncate(16);
        key
    };
    let input_key = block_key(&[0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79]);
    let value_key = block_key(&[0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E]);
    let secret_key_key = block_key(&[0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6]);

    let verifier_input = [0x5Cu8; 16];
    let verifier_hash = sha1(&[&verifier_input]);
    let secret_key = [0x77u8; 16];

    let enc_input = cbc_encrypt(&input_key, &password_salt, &verifier_input);
    let enc_value = cbc_encrypt(&value_key, &password_salt, &verifier_hash);
    let enc_key = cbc_encrypt(&secret_key_key, &password_salt, &secret_key);

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<keyData saltSize="16" blockSize="16" keyBits="128" hashSize="20" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA1" saltValue="{kd_salt}"/>
<keyEncryptors><keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<p:encryptedKey spinCount="{spin_count}" saltSize="16" blockSize="16" keyBits="128" hashSize="20" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA1" saltValue="{pw_salt}" encryptedVerifierHashInput="{input}" encryptedVerifierHashValue="{value}" encryptedKeyValue="{key}"/>
</keyEncryptor></keyEncryptors>
</encryption>"#,
        kd_salt = STANDARD.encode(key_data_salt),
        pw_salt = STANDARD.encode(password_salt),
        input = STANDARD.encode(&enc_input),
        value = STANDARD.encode(&enc_value),
        key = STANDARD.encode(&enc_key),
    );

    let mut info = Vec::new();
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0x40u32.to_le_bytes());
    info.extend_from_slice(xml.as_bytes());

    let mut iv = sha1(&[&key_data_salt, &0u32.to_le_bytes()]);
    iv.truncate(16);
    let package = package_stream(
        package_plaintext,
        cbc_encrypt(&secret_key, &iv, package_plaintext),
    );

    write_container(&dir.join("agile.docx"), &info, &package)
}

/// Standard (3.2) container, AES-128 + SHA-1.
pub fn standard_document(dir: &Path, password: &str, package_plaintext: &[u8]) -> PathBuf {
    let salt = [0x5Au8; 16];
    let mut h = sha1(&[&salt, &utf16le(password)]);
    for i in 0..50_000u32 {
        h = sha1(&[&i.to_le_bytes(), &h]);
    }
    let h_final = sha1(&[&h, &0u32.to_le_bytes()]);
    let mut buf1 = [0x36u8; 64];
    for (b, x) in buf1.iter_mut().zip(&h_final) {
        *b ^= x;
    }
    let mut key = sha1(&[&buf1]);
    key.truncate(16);

    let verifier = [0x42u8; 16];
    let verifier_hash = sha1(&[&verifier]);
    let enc_verifier = ecb_encrypt(&key, &verifier);
    let enc_verifier_hash = ecb_encrypt(&key, &verifier_hash);

    let mut header = Vec::new();
    for v in [0x24u32, 0, 0x660E, 0x8004, 128, 0x18, 0, 0] {
        header.extend_from_slice(&v.to_le_bytes());
    }
    header.extend_from_slice(&[0, 0]);

    let mut info = Vec::new();
    info.extend_from_slice(&3u16.to_le_bytes());
    info.extend_from_slice(&2u16.to_le_bytes());
    info.extend_from_slice(&0x24u32.to_le_bytes());
    info.extend_from_slice(&(header.len() as u32).to_le_bytes());
    info.extend_from_slice(&header);
    info.extend_from_slice(&16u32.to_le_bytes());
    info.extend_from_slice(&salt);
    info.extend_from_slice(&enc_verifier);
    info.extend_from_slice(&20u32.to_le_bytes());
    info.extend_from_slice(&enc_verifier_hash);

    let package = package_stream(package_plaintext, ecb_encrypt(&key, package_plaintext));
    write_container(&dir.join("standard.docx"), &info, &package)
}
