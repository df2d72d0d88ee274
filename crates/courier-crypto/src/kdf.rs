//! Message-key derivation.

use hkdf::Hkdf;
use sha2::Sha256;

/// Length of a derived AEAD key.
pub const MESSAGE_KEY_BYTES: usize = 32;

/// Derive the 32-byte AES-256-GCM key for a session from the KEM shared
/// secret: `HKDF-SHA256(ikm = shared, salt = ∅, info = ∅, L = 32)`.
///
/// Both sides of a session run this over the same shared secret, so the
/// derivation has no per-direction or per-peer binding; the session layer
/// scopes the result by peer identifier.
pub fn derive_message_key(shared: &[u8]) -> [u8; MESSAGE_KEY_BYTES] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut key = [0u8; MESSAGE_KEY_BYTES];
    hk.expand(&[], &mut key).expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}
