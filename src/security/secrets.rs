// Authenticated encryption for the persisted cookie blob.
//
// Cookies are encrypted with ChaCha20-Poly1305 under a 256-bit key that lives
// in the OS keychain (see `keychain`). Each encryption draws a fresh random
// 12-byte nonce; the 16-byte Poly1305 tag is stored detached so the on-disk
// blob carries `{version, nonce, authTag, ciphertext}` as separate fields.
//
// Any failure to decrypt (wrong key, flipped ciphertext bit, flipped tag,
// truncated fields) is a `SecurityError`. Partial plaintext is never returned.

use crate::error::{NotebookError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{AeadInPlace, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, Nonce, Tag};
use serde::{Deserialize, Serialize};

/// Length of the random encryption key in bytes (256-bit, matches `ChaCha20`).
pub const KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Poly1305 tag length in bytes.
const TAG_LEN: usize = 16;

/// Current blob format.
pub const BLOB_VERSION: u32 = 1;

/// On-disk representation of an encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub version: u32,
    /// base64
    pub nonce: String,
    /// base64
    pub auth_tag: String,
    /// base64
    pub ciphertext: String,
}

/// Generate a fresh hex-encoded key from the OS CSPRNG.
pub fn generate_key() -> String {
    let key = ChaCha20Poly1305::generate_key(&mut OsRng);
    hex::encode(key)
}

fn decode_key(hex_key: &str) -> Result<ChaCha20Poly1305> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|_| NotebookError::security("Encryption key is not valid hex"))?;
    if bytes.len() != KEY_LEN {
        return Err(NotebookError::security("Invalid encryption key length"));
    }
    Ok(ChaCha20Poly1305::new(Key::from_slice(&bytes)))
}

/// Encrypt `plaintext` under `hex_key` with a random nonce.
pub fn encrypt(plaintext: &str, hex_key: &str) -> Result<EncryptedBlob> {
    let cipher = decode_key(hex_key)?;
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|_| NotebookError::security("Encryption failed"))?;

    Ok(EncryptedBlob {
        version: BLOB_VERSION,
        nonce: STANDARD.encode(nonce),
        auth_tag: STANDARD.encode(tag),
        ciphertext: STANDARD.encode(&buffer),
    })
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(blob: &EncryptedBlob, hex_key: &str) -> Result<String> {
    if blob.version != BLOB_VERSION {
        return Err(NotebookError::security(format!(
            "Unsupported encrypted blob version {}",
            blob.version
        )));
    }
    let cipher = decode_key(hex_key)?;

    let corrupt = || NotebookError::security("Encrypted blob is corrupt");
    let nonce_bytes = STANDARD.decode(&blob.nonce).map_err(|_| corrupt())?;
    let tag_bytes = STANDARD.decode(&blob.auth_tag).map_err(|_| corrupt())?;
    let mut buffer = STANDARD.decode(&blob.ciphertext).map_err(|_| corrupt())?;
    if nonce_bytes.len() != NONCE_LEN || tag_bytes.len() != TAG_LEN {
        return Err(corrupt());
    }

    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce_bytes),
            b"",
            &mut buffer,
            Tag::from_slice(&tag_bytes),
        )
        .map_err(|_| {
            NotebookError::security(
                "Decryption failed: data may be corrupted or the key may be wrong",
            )
        })?;

    String::from_utf8(buffer)
        .map_err(|_| NotebookError::security("Decrypted payload is not valid UTF-8"))
}
