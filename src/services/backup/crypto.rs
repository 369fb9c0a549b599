//! Password-based encryption for backup files.
//!
//! PBKDF2-HMAC-SHA256 turns the user's password into an AES-256-GCM key.
//! Every backup gets its own random salt and nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::utils::error::{AppError, AppResult};

/// Default PBKDF2 work factor for new backups
pub const PBKDF2_ITERATIONS: u32 = 310_000;
/// Lowest work factor accepted when writing production backups
pub const MIN_PBKDF2_ITERATIONS: u32 = 250_000;
pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;

/// Derive a 256-bit key from a password.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut derived_key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut derived_key);
    derived_key
}

/// Fresh random salt from the OS RNG.
pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Fresh random nonce from the OS RNG. Never reuse one with the same key.
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with AES-256-GCM. The returned ciphertext includes the tag.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> AppResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| AppError::crypto(format!("Backup encryption failed: {}", e)))
}

/// Decrypt and authenticate AES-256-GCM ciphertext.
///
/// Fails without returning any plaintext when the tag does not verify.
pub fn decrypt(key: &[u8; KEY_SIZE], nonce: &[u8], ciphertext: &[u8]) -> AppResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(AppError::crypto(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::crypto("Decryption failed: wrong password or corrupted data"))
}
