use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::env;

use crate::errors::KinesisError;

/// Retrieves the token-sealing key from the environment.
/// Must be a 32-byte hex string or exactly 32 bytes long string.
fn get_sealing_key() -> Key<Aes256Gcm> {
    let key_str = env::var("KINESIM_TOKEN_KEY").unwrap_or_else(|_| {
        // Iterators only need to survive one process; a static key is fine
        // when none is configured.
        "0123456789abcdef0123456789abcdef".to_string()
    });

    // If hex-encoded
    if key_str.len() == 64 {
        let decoded = hex::decode(&key_str).unwrap_or_else(|_| vec![0; 32]);
        *Key::<Aes256Gcm>::from_slice(&decoded)
    } else {
        // Assume UTF-8 up to 32 bytes
        let mut key_bytes = [0u8; 32];
        let bytes = key_str.as_bytes();
        let len = std::cmp::min(bytes.len(), 32);
        key_bytes[..len].copy_from_slice(&bytes[..len]);
        key_bytes.into()
    }
}

/// Seal an opaque token: AES-256-GCM over the payload, nonce || ciphertext,
/// base64. Clients cannot forge or inspect the result.
pub fn seal(payload: &[u8]) -> Result<String, KinesisError> {
    let key = get_sealing_key();
    let cipher = Aes256Gcm::new(&key);

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| KinesisError::InternalFailure(format!("Token sealing failed: {}", e)))?;

    // Combine nonce and ciphertext: nonce || ciphertext
    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(combined))
}

/// Open a sealed token. Any tampering or truncation fails decryption.
pub fn unseal(token: &str) -> Result<Vec<u8>, KinesisError> {
    let combined = STANDARD
        .decode(token)
        .map_err(|_| KinesisError::InvalidArgument("Invalid token encoding".to_string()))?;

    if combined.len() < 12 {
        return Err(KinesisError::InvalidArgument("Token too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = get_sealing_key();
    let cipher = Aes256Gcm::new(&key);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| KinesisError::InvalidArgument("Token integrity check failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_unseal_round_trips() {
        let sealed = seal(b"position marker").unwrap();
        assert_eq!(unseal(&sealed).unwrap(), b"position marker");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let sealed = seal(b"position marker").unwrap();
        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);
        assert!(unseal(&tampered).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(unseal("not-base64!!!").is_err());
        assert!(unseal("aGVsbG8=").is_err());
    }
}
