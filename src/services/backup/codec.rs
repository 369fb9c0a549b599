//! Backup File Codec
//!
//! Turns a `DatabaseBackup` into the bytes of a backup file and back.
//!
//! Two on-disk shapes exist:
//! - the current encrypted envelope (always written), and
//! - the legacy plaintext document (still readable, never written).
//!
//! The shape is decided structurally before any decryption is attempted.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use jurisdesk_core::DatabaseBackup;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::crypto::{self, MIN_PBKDF2_ITERATIONS, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};
use crate::utils::error::{AppError, AppResult};

/// Format tag identifying an encrypted backup envelope
pub const ENVELOPE_FORMAT: &str = "jurisdesk-encrypted-backup";
/// Envelope version written by this build
pub const ENVELOPE_VERSION: &str = "2.0";

const KDF_NAME: &str = "PBKDF2";
const KDF_HASH: &str = "SHA-256";
const CIPHER_NAME: &str = "AES-256-GCM";
const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Encrypted backup file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub format: String,
    pub version: String,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
    /// base64(ciphertext || tag)
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub name: String,
    pub hash: String,
    pub iterations: u32,
    /// base64 salt
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    pub name: String,
    /// base64 nonce
    pub nonce: String,
}

/// Structural classification of a backup file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    Encrypted,
    Legacy,
    Unknown,
}

/// Classify parsed backup JSON without decrypting anything.
pub fn classify(value: &Value) -> EnvelopeShape {
    let Some(obj) = value.as_object() else {
        return EnvelopeShape::Unknown;
    };

    match obj.get("format").and_then(Value::as_str) {
        Some(ENVELOPE_FORMAT) => EnvelopeShape::Encrypted,
        Some(_) => EnvelopeShape::Unknown,
        None if obj.contains_key("ciphertext") => EnvelopeShape::Unknown,
        None if obj.contains_key("version") && obj.contains_key("created_at") => {
            EnvelopeShape::Legacy
        }
        None => EnvelopeShape::Unknown,
    }
}

/// Encoder/decoder for backup files
#[derive(Debug, Clone)]
pub struct SnapshotCodec {
    iterations: u32,
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCodec {
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Use a different work factor; values below the production floor are raised to it.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(MIN_PBKDF2_ITERATIONS),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Serialize and encrypt a snapshot into envelope bytes.
    pub fn encode(&self, snapshot: &DatabaseBackup, password: &str) -> AppResult<Vec<u8>> {
        if password.is_empty() {
            return Err(AppError::PasswordRequired);
        }

        let plaintext = serde_json::to_vec(snapshot)?;

        let salt = crypto::random_salt();
        let nonce = crypto::random_nonce();
        let key = crypto::derive_key(password, &salt, self.iterations);
        let ciphertext = crypto::encrypt(&key, &nonce, &plaintext)?;

        let envelope = EncryptedEnvelope {
            format: ENVELOPE_FORMAT.to_string(),
            version: ENVELOPE_VERSION.to_string(),
            kdf: KdfParams {
                name: KDF_NAME.to_string(),
                hash: KDF_HASH.to_string(),
                iterations: self.iterations,
                salt: BASE64.encode(salt),
            },
            cipher: CipherParams {
                name: CIPHER_NAME.to_string(),
                nonce: BASE64.encode(nonce),
            },
            ciphertext: BASE64.encode(ciphertext),
        };

        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    /// Decode envelope or legacy bytes into a snapshot.
    ///
    /// Encrypted files need a password (`PasswordRequired` otherwise); legacy
    /// plaintext files are read without one.
    pub fn decode(&self, bytes: &[u8], password: Option<&str>) -> AppResult<DatabaseBackup> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::validation(format!("Backup file is not valid JSON: {}", e)))?;

        match classify(&value) {
            EnvelopeShape::Encrypted => {
                let password = password
                    .filter(|p| !p.is_empty())
                    .ok_or(AppError::PasswordRequired)?;
                let envelope: EncryptedEnvelope = serde_json::from_value(value).map_err(|e| {
                    AppError::validation(format!("Malformed backup envelope: {}", e))
                })?;
                self.open(&envelope, password)
            }
            EnvelopeShape::Legacy => {
                tracing::info!("[SnapshotCodec] Reading legacy plaintext backup");
                serde_json::from_value(value).map_err(|e| {
                    AppError::validation(format!("Malformed legacy backup: {}", e))
                })
            }
            EnvelopeShape::Unknown => Err(AppError::validation("Unrecognized backup file format")),
        }
    }

    fn open(&self, envelope: &EncryptedEnvelope, password: &str) -> AppResult<DatabaseBackup> {
        let major = envelope.version.split('.').next().unwrap_or_default();
        if major != "2" {
            return Err(AppError::validation(format!(
                "Unsupported backup envelope version: {}",
                envelope.version
            )));
        }
        if !envelope.kdf.name.eq_ignore_ascii_case(KDF_NAME)
            || !envelope.kdf.hash.eq_ignore_ascii_case(KDF_HASH)
        {
            return Err(AppError::validation(format!(
                "Unsupported key derivation: {}/{}",
                envelope.kdf.name, envelope.kdf.hash
            )));
        }
        if !envelope.cipher.name.eq_ignore_ascii_case(CIPHER_NAME) {
            return Err(AppError::validation(format!(
                "Unsupported cipher: {}",
                envelope.cipher.name
            )));
        }
        if envelope.kdf.iterations == 0 || envelope.kdf.iterations > MAX_PBKDF2_ITERATIONS {
            return Err(AppError::validation(format!(
                "Key derivation iteration count out of range: {}",
                envelope.kdf.iterations
            )));
        }

        let salt = decode_field("salt", &envelope.kdf.salt)?;
        let nonce = decode_field("nonce", &envelope.cipher.nonce)?;
        let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;
        if salt.len() < SALT_SIZE {
            return Err(AppError::validation("Backup salt is too short"));
        }
        if nonce.len() != NONCE_SIZE {
            return Err(AppError::validation("Backup nonce has the wrong length"));
        }

        let key = crypto::derive_key(password, &salt, envelope.kdf.iterations);
        let plaintext = crypto::decrypt(&key, &nonce, &ciphertext)?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::validation(format!("Decrypted backup is malformed: {}", e)))
    }
}

fn decode_field(name: &str, encoded: &str) -> AppResult<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| AppError::validation(format!("Invalid base64 in backup {}: {}", name, e)))
}
