//! The end-to-end session layer.
//!
//! Per remote peer the session keeps two volatile pieces of state: the
//! peer's long-term KEM public key (once a `pubkey` envelope arrives) and
//! the derived 32-byte message key (once either side encapsulates). Both
//! live behind reader/writer locks; reads are per message, writes are
//! rare.
//!
//! The first encrypted send to a peer encapsulates against the cached
//! public key and yields the ciphertext to announce in an `encap_key`
//! envelope; the receiving side decapsulates with its long-term secret
//! and derives the same key. There is no rotation, no replay window and
//! no rekey on reconnect.

use std::{collections::HashMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use tracing::debug;

use courier_crypto::{aead, kdf, kem, CryptoError};

use crate::keys::{KeyStore, KeyStoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no public key for {0}; wait for the peer to announce one")]
    MissingPeerKey(String),
    #[error("no session key for {0}; cannot decrypt")]
    MissingSessionKey(String),
    #[error("bad base64 key material: {0}")]
    KeyEncoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}

pub struct PeerSessions {
    keys: Arc<KeyStore>,
    peer_public: RwLock<HashMap<String, Vec<u8>>>,
    derived: RwLock<HashMap<String, [u8; aead::KEY_BYTES]>>,
}

impl PeerSessions {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            peer_public: RwLock::new(HashMap::new()),
            derived: RwLock::new(HashMap::new()),
        }
    }

    /// Our long-term KEM public key, base64 for the `pubkey` envelope.
    /// Generates and persists the pair on first use.
    pub fn local_public_key_b64(&self) -> Result<String, SessionError> {
        let keys = self.keys.kem_keys()?;
        Ok(BASE64.encode(keys.public))
    }

    /// Cache a peer's announced public key.
    pub fn cache_peer_key(&self, peer: &str, public_key_b64: &str) -> Result<(), SessionError> {
        let bytes = BASE64.decode(public_key_b64)?;
        debug!(%peer, len = bytes.len(), "cached peer public key");
        self.peer_public.write().insert(peer.to_string(), bytes);
        Ok(())
    }

    pub fn has_peer_key(&self, peer: &str) -> bool {
        self.peer_public.read().contains_key(peer)
    }

    pub fn has_session(&self, peer: &str) -> bool {
        self.derived.read().contains_key(peer)
    }

    /// Encrypt `plaintext` for `peer`.
    ///
    /// Returns the hex AEAD blob and, when this call established the
    /// session, the base64 KEM ciphertext that must be announced to the
    /// peer in an `encap_key` envelope before the message.
    pub fn encrypt_for(
        &self,
        peer: &str,
        plaintext: &[u8],
    ) -> Result<(String, Option<String>), SessionError> {
        if let Some(key) = self.derived.read().get(peer) {
            return Ok((aead::seal(key, plaintext)?, None));
        }

        let peer_public = self
            .peer_public
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| SessionError::MissingPeerKey(peer.to_string()))?;

        let (ciphertext, shared) = kem::encapsulate(&peer_public)?;
        let key = kdf::derive_message_key(&shared);
        self.derived.write().insert(peer.to_string(), key);
        debug!(%peer, "established session key (initiator)");

        Ok((
            aead::seal(&key, plaintext)?,
            Some(BASE64.encode(ciphertext)),
        ))
    }

    /// Accept a peer's `encap_key` announcement: decapsulate with our
    /// long-term secret and cache the derived key.
    pub fn accept_encapsulation(
        &self,
        peer: &str,
        ciphertext_b64: &str,
    ) -> Result<(), SessionError> {
        let ciphertext = BASE64.decode(ciphertext_b64)?;
        let keys = self.keys.kem_keys()?;
        let shared = kem::decapsulate(&keys.secret, &ciphertext)?;
        let key = kdf::derive_message_key(&shared);
        self.derived.write().insert(peer.to_string(), key);
        debug!(%peer, "established session key (responder)");
        Ok(())
    }

    /// Decrypt a message body from `peer`.
    pub fn decrypt_from(&self, peer: &str, body_hex: &str) -> Result<Vec<u8>, SessionError> {
        let key = self
            .derived
            .read()
            .get(peer)
            .copied()
            .ok_or_else(|| SessionError::MissingSessionKey(peer.to_string()))?;
        Ok(aead::open(&key, body_hex)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session_pair() -> (PeerSessions, PeerSessions, tempfile::TempDir, tempfile::TempDir) {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let a = PeerSessions::new(Arc::new(KeyStore::open(dir_a.path())));
        let b = PeerSessions::new(Arc::new(KeyStore::open(dir_b.path())));
        (a, b, dir_a, dir_b)
    }

    #[test]
    fn full_handshake_round_trip() {
        let (alice, bob, _ga, _gb) = session_pair();

        // B announces its public key; A encrypts and announces the
        // encapsulation; B decapsulates and decrypts.
        alice.cache_peer_key("bob", &bob.local_public_key_b64().unwrap()).unwrap();
        let (blob, encap) = alice.encrypt_for("bob", b"hello").unwrap();
        let encap = encap.expect("first send must encapsulate");

        bob.accept_encapsulation("alice", &encap).unwrap();
        assert_eq!(bob.decrypt_from("alice", &blob).unwrap(), b"hello");
    }

    #[test]
    fn second_send_reuses_the_session() {
        let (alice, bob, _ga, _gb) = session_pair();
        alice.cache_peer_key("bob", &bob.local_public_key_b64().unwrap()).unwrap();

        let (_, first) = alice.encrypt_for("bob", b"one").unwrap();
        assert!(first.is_some());
        let (_, second) = alice.encrypt_for("bob", b"two").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn sending_without_peer_key_fails() {
        let (alice, _bob, _ga, _gb) = session_pair();
        assert!(matches!(
            alice.encrypt_for("bob", b"hello"),
            Err(SessionError::MissingPeerKey(_))
        ));
    }

    #[test]
    fn decrypting_without_session_fails() {
        let (alice, _bob, _ga, _gb) = session_pair();
        assert!(matches!(
            alice.decrypt_from("bob", "00"),
            Err(SessionError::MissingSessionKey(_))
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let (alice, bob, _ga, _gb) = session_pair();
        alice.cache_peer_key("bob", &bob.local_public_key_b64().unwrap()).unwrap();
        let (blob, encap) = alice.encrypt_for("bob", b"hello").unwrap();
        bob.accept_encapsulation("alice", &encap.unwrap()).unwrap();

        let mut bytes = hex::decode(&blob).unwrap();
        bytes[20] ^= 0x01;
        let tampered = hex::encode(bytes);
        assert!(matches!(
            bob.decrypt_from("alice", &tampered),
            Err(SessionError::Crypto(CryptoError::DecryptFailed))
        ));
    }
}
