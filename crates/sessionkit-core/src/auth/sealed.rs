//! At-rest sealing for persisted credential slots.
//!
//! The key is derived from a passphrase with Argon2id and a random per-file
//! salt; each value is encrypted with ChaCha20-Poly1305 under a fresh nonce.

use anyhow::{anyhow, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

/// Salt length in bytes (Argon2 requires at least 8)
pub const SALT_LEN: usize = 16;

const NONCE_LEN: usize = 12;

const KEY_LEN: usize = 32;

pub struct Sealer {
    cipher: ChaCha20Poly1305,
}

impl Sealer {
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow!("Failed to derive storage key: {}", e))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn generate_salt() -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }

    /// Encrypt a value, returning `(nonce, ciphertext)`
    pub fn seal(&self, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let data = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| anyhow!("Failed to seal credential slot"))?;

        Ok((nonce.to_vec(), data))
    }

    /// Decrypt a sealed value. Returns None on a wrong key or tampered data.
    pub fn open(&self, nonce: &[u8], data: &[u8]) -> Option<String> {
        if nonce.len() != NONCE_LEN {
            return None;
        }
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), data).ok()?;
        String::from_utf8(plaintext).ok()
    }
}
