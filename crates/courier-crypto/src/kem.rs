//! Kyber-1024 key encapsulation.
//!
//! Keys, ciphertexts and shared secrets are exchanged as raw bytes; the
//! fixed Kyber-1024 parameter set makes the sizes self-describing. The
//! shared secret feeds [`crate::kdf::derive_message_key`] and is never
//! used as an AEAD key directly.

use pqcrypto_kyber::kyber1024;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use zeroize::Zeroizing;

use crate::CryptoError;

/// A freshly generated long-term KEM key pair as raw bytes.
pub struct KemKeyPair {
    pub public: Vec<u8>,
    pub secret: Zeroizing<Vec<u8>>,
}

/// Generate a Kyber-1024 key pair.
pub fn generate_keypair() -> KemKeyPair {
    let (pk, sk) = kyber1024::keypair();
    KemKeyPair {
        public: pk.as_bytes().to_vec(),
        secret: Zeroizing::new(sk.as_bytes().to_vec()),
    }
}

/// Encapsulate against a peer's public key.
///
/// Returns the ciphertext to transmit and the local copy of the shared
/// secret.
pub fn encapsulate(
    peer_public: &[u8],
) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
    let pk = kyber1024::PublicKey::from_bytes(peer_public)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let (shared, ct) = kyber1024::encapsulate(&pk);
    Ok((
        ct.as_bytes().to_vec(),
        Zeroizing::new(shared.as_bytes().to_vec()),
    ))
}

/// Recover the shared secret from a received ciphertext.
pub fn decapsulate(
    secret: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let sk = kyber1024::SecretKey::from_bytes(secret)
        .map_err(|_| CryptoError::InvalidSecretKey)?;
    let ct = kyber1024::Ciphertext::from_bytes(ciphertext)
        .map_err(|_| CryptoError::InvalidKemCiphertext)?;
    let shared = kyber1024::decapsulate(&ct, &sk);
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}
