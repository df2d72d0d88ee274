//! Cryptographic primitives for courier sessions.
//!
//! The session layer composes three pieces, and nothing else:
//!
//! - [`kem`]: Kyber-1024 key encapsulation over an untrusted relay,
//! - [`kdf`]: HKDF-SHA256 derivation of the message key from the shared
//!   secret,
//! - [`aead`]: AES-256-GCM framing of message bodies as
//!   `hex(nonce ∥ ciphertext)` with a fresh random 12-byte nonce.
//!
//! Keys and shared secrets cross the API as byte slices so callers can
//! persist them as raw files; secret material is wrapped in
//! [`zeroize::Zeroizing`] buffers.

#![forbid(unsafe_code)]

pub mod aead;
pub mod kdf;
pub mod kem;

#[cfg(test)]
mod proptests;

/// Error type shared by the primitive modules.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid KEM public key")]
    InvalidPublicKey,
    #[error("invalid KEM secret key")]
    InvalidSecretKey,
    #[error("invalid KEM ciphertext")]
    InvalidKemCiphertext,
    #[error("ciphertext is not valid hex")]
    CiphertextEncoding,
    #[error("ciphertext too short")]
    TruncatedCiphertext,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
}
