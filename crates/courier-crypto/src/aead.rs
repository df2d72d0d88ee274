//! AES-256-GCM message framing.
//!
//! A sealed body is `hex(nonce ∥ ciphertext ∥ tag)` with a fresh random
//! 12-byte nonce per encryption and no associated data. The hex framing
//! keeps the blob safe inside a JSON string field.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};

use crate::CryptoError;

/// AEAD key length.
pub const KEY_BYTES: usize = 32;
/// AES-GCM nonce length.
pub const NONCE_BYTES: usize = 12;

/// Encrypt `plaintext` under `key`, returning the hex-framed blob.
pub fn seal(key: &[u8; KEY_BYTES], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(hex::encode(blob))
}

/// Decrypt a hex-framed blob produced by [`seal`].
pub fn open(key: &[u8; KEY_BYTES], blob_hex: &str) -> Result<Vec<u8>, CryptoError> {
    let blob = hex::decode(blob_hex).map_err(|_| CryptoError::CiphertextEncoding)?;
    if blob.len() < NONCE_BYTES {
        return Err(CryptoError::TruncatedCiphertext);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_BYTES);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_BYTES] = [0x17; KEY_BYTES];

    #[test]
    fn seal_open_round_trip() {
        let blob = seal(&KEY, b"hello").unwrap();
        assert_eq!(open(&KEY, &blob).unwrap(), b"hello");
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let a = seal(&KEY, b"same plaintext").unwrap();
        let b = seal(&KEY, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let blob = seal(&KEY, b"secret").unwrap();
        let other = [0x18; KEY_BYTES];
        assert!(matches!(open(&other, &blob), Err(CryptoError::DecryptFailed)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let blob = seal(&KEY, b"secret").unwrap();
        let mut bytes = hex::decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = hex::encode(bytes);
        assert!(matches!(open(&KEY, &tampered), Err(CryptoError::DecryptFailed)));
    }

    #[test]
    fn garbage_inputs_are_rejected() {
        assert!(matches!(
            open(&KEY, "not hex"),
            Err(CryptoError::CiphertextEncoding)
        ));
        assert!(matches!(
            open(&KEY, "00112233"),
            Err(CryptoError::TruncatedCiphertext)
        ));
    }
}
