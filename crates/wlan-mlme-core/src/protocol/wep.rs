//! Shared-key WEP, used only for the body of Authentication frame 3.
//!
//! # How WEP protects a body (for beginners)
//!
//! ```text
//! plaintext  = body || CRC32(body)            (ICV, little-endian)
//! keystream  = RC4(IV || key)
//! on the air = IV(3) || key_id << 6 (1) || (plaintext XOR keystream)
//! ```
//!
//! WEP is long broken and appears here only because shared-key
//! authentication still exists on old networks.  The receiver recomputes
//! the CRC over the decrypted body; a mismatch means the peer used a
//! different key (or the frame was corrupted).

use thiserror::Error;

/// IV (3 bytes) plus the key-id octet.
pub const WEP_HEADER_LEN: usize = 4;
/// Integrity check value (CRC32) length.
pub const WEP_ICV_LEN: usize = 4;

/// Errors produced by WEP encryption and decryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WepError {
    #[error("WEP body too short: {0} bytes")]
    TooShort(usize),

    #[error("WEP ICV mismatch")]
    IcvMismatch,

    #[error("unsupported WEP key length {0} (expected 5 or 13)")]
    BadKeyLength(usize),

    #[error("WEP key index {0} out of range")]
    BadKeyId(u8),
}

/// Encrypts `plaintext` and returns the protected body (IV header included).
///
/// # Errors
///
/// Returns [`WepError::BadKeyLength`] for keys other than WEP-40/WEP-104 and
/// [`WepError::BadKeyId`] for a key index above 3.
pub fn encrypt(key: &[u8], key_id: u8, iv: [u8; 3], plaintext: &[u8]) -> Result<Vec<u8>, WepError> {
    check_key(key)?;
    if key_id > 3 {
        return Err(WepError::BadKeyId(key_id));
    }
    let mut out = Vec::with_capacity(WEP_HEADER_LEN + plaintext.len() + WEP_ICV_LEN);
    out.extend_from_slice(&iv);
    out.push(key_id << 6);
    let payload_start = out.len();
    out.extend_from_slice(plaintext);
    out.extend_from_slice(&crc32fast::hash(plaintext).to_le_bytes());
    Rc4::new(&seed(iv, key)).apply(&mut out[payload_start..]);
    Ok(out)
}

/// Returns the key index carried by a protected body.
pub fn key_id(body: &[u8]) -> Option<u8> {
    body.get(3).map(|b| b >> 6)
}

/// Decrypts a protected body and verifies its ICV.
///
/// # Errors
///
/// Returns [`WepError::TooShort`] when the body cannot hold the IV and ICV,
/// or [`WepError::IcvMismatch`] when the key does not match.
pub fn decrypt(key: &[u8], body: &[u8]) -> Result<Vec<u8>, WepError> {
    check_key(key)?;
    if body.len() < WEP_HEADER_LEN + WEP_ICV_LEN {
        return Err(WepError::TooShort(body.len()));
    }
    let iv = [body[0], body[1], body[2]];
    let mut plain = body[WEP_HEADER_LEN..].to_vec();
    Rc4::new(&seed(iv, key)).apply(&mut plain);
    let icv_at = plain.len() - WEP_ICV_LEN;
    let icv = u32::from_le_bytes([plain[icv_at], plain[icv_at + 1], plain[icv_at + 2], plain[icv_at + 3]]);
    plain.truncate(icv_at);
    if crc32fast::hash(&plain) != icv {
        return Err(WepError::IcvMismatch);
    }
    Ok(plain)
}

/// Derives a 24-bit IV from a running counter.
pub fn iv_from_counter(counter: u32) -> [u8; 3] {
    let b = counter.to_le_bytes();
    [b[0], b[1], b[2]]
}

fn check_key(key: &[u8]) -> Result<(), WepError> {
    match key.len() {
        5 | 13 => Ok(()),
        other => Err(WepError::BadKeyLength(other)),
    }
}

fn seed(iv: [u8; 3], key: &[u8]) -> Vec<u8> {
    let mut seed = Vec::with_capacity(3 + key.len());
    seed.extend_from_slice(&iv);
    seed.extend_from_slice(key);
    seed
}

/// Plain RC4 keystream generator.
struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}
