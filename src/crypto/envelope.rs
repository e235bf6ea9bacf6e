//! AES-256-CBC request/response envelope.
//!
//! Wire layout:
//! ```text
//! [ SHA-256(plaintext) (32) | IV (16) | ciphertext (n * 16) ]
//! ```
//! The plaintext is terminated with `00 10` and filled with `10` bytes to a
//! block boundary before encryption. A fresh IV is drawn for every seal.

use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::core::{
    BLOCK_SIZE, DIGEST_SIZE, DecryptionError, ENVELOPE_HEADER_SIZE, FILL_BYTE, IV_SIZE,
    PLAINTEXT_TERMINATOR,
};

use super::SymmetricKey;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// An encrypted request or response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    digest: [u8; DIGEST_SIZE],
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Encrypt `plaintext` under `key` with a random IV.
    pub fn seal(plaintext: &str, key: &SymmetricKey) -> Self {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        Self::seal_with_iv(plaintext, key, iv)
    }

    /// Encrypt with a caller-chosen IV. Only for fixtures; never reuse an IV.
    pub fn seal_with_iv(plaintext: &str, key: &SymmetricKey, iv: [u8; IV_SIZE]) -> Self {
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&Sha256::digest(plaintext.as_bytes()));

        let mut buffer = Vec::with_capacity(plaintext.len() + PLAINTEXT_TERMINATOR.len() + BLOCK_SIZE);
        buffer.extend_from_slice(plaintext.as_bytes());
        buffer.extend_from_slice(&PLAINTEXT_TERMINATOR);
        let fill = (BLOCK_SIZE - buffer.len() % BLOCK_SIZE) % BLOCK_SIZE;
        buffer.resize(buffer.len() + fill, FILL_BYTE);

        let mut encryptor = Aes256CbcEnc::new(key.as_bytes().into(), &iv.into());
        for block in buffer.chunks_exact_mut(BLOCK_SIZE) {
            encryptor.encrypt_block_mut(block.into());
        }

        Self {
            digest,
            iv,
            ciphertext: buffer,
        }
    }

    /// Decrypt and validate, returning the plaintext.
    ///
    /// Fails if the fill bytes are missing, the text is not UTF-8, or the
    /// recovered plaintext does not match the carried digest.
    pub fn open(&self, key: &SymmetricKey) -> Result<String, DecryptionError> {
        let mut buffer = self.ciphertext.clone();
        let decrypted = Aes256CbcDec::new(key.as_bytes().into(), &self.iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| DecryptionError::Misaligned(self.ciphertext.len()))?;

        if decrypted.last() != Some(&FILL_BYTE) {
            return Err(DecryptionError::Padding);
        }
        let filled = trim_end(decrypted, FILL_BYTE);
        let exact = filled.strip_suffix(&[PLAINTEXT_TERMINATOR[0]]).unwrap_or(filled);
        // Controllers may also append a newline and extra NULs.
        let body = if self.matches_digest(exact) {
            exact
        } else {
            let trimmed = trim_end(trim_end(trim_end(filled, b'\n'), 0x00), b'\n').trim_ascii_end();
            if !self.matches_digest(trimmed) {
                return Err(DecryptionError::DigestMismatch);
            }
            trimmed
        };
        String::from_utf8(body.to_vec()).map_err(|_| DecryptionError::Utf8)
    }

    fn matches_digest(&self, plaintext: &[u8]) -> bool {
        Sha256::digest(plaintext).as_slice() == self.digest
    }

    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        if bytes.len() < ENVELOPE_HEADER_SIZE + BLOCK_SIZE {
            return Err(DecryptionError::Truncated(bytes.len()));
        }
        let ciphertext = &bytes[ENVELOPE_HEADER_SIZE..];
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(DecryptionError::Misaligned(ciphertext.len()));
        }
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&bytes[..DIGEST_SIZE]);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[DIGEST_SIZE..ENVELOPE_HEADER_SIZE]);
        Ok(Self {
            digest,
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// The initialization vector.
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Ciphertext length in bytes.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

fn trim_end(bytes: &[u8], byte: u8) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != byte).map_or(0, |i| i + 1);
    &bytes[..end]
}
