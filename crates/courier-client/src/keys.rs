//! Long-term key persistence.
//!
//! Two key pairs live under the key directory (default `<home>/.chatkeys`),
//! as raw binary files with owner-only permissions:
//!
//! - `public.key` / `private.key`: the Kyber-1024 KEM pair the session
//!   layer encapsulates against;
//! - `identity_ed25519.pub` / `identity_ed25519.key`: an Ed25519 pair
//!   reserved for identity binding; generated and preserved, not yet
//!   consulted by routing.
//!
//! Loaded keys are cached in memory behind a reader/writer lock; reads
//! happen per message, writes only on first generation.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use rand_core::OsRng;
use zeroize::Zeroizing;

use courier_crypto::kem;

const KEM_PUBLIC_FILE: &str = "public.key";
const KEM_SECRET_FILE: &str = "private.key";
const IDENTITY_PUBLIC_FILE: &str = "identity_ed25519.pub";
const IDENTITY_SECRET_FILE: &str = "identity_ed25519.key";

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("could not determine home directory")]
    MissingHomeDir,
    #[error("key I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded KEM key pair. The secret half zeroizes on drop.
pub struct KemKeys {
    pub public: Vec<u8>,
    pub secret: Zeroizing<Vec<u8>>,
}

impl Clone for KemKeys {
    fn clone(&self) -> Self {
        Self {
            public: self.public.clone(),
            secret: Zeroizing::new(self.secret.to_vec()),
        }
    }
}

pub struct KeyStore {
    dir: PathBuf,
    kem_cache: RwLock<Option<KemKeys>>,
}

impl KeyStore {
    /// Open a key store rooted at `dir`. Nothing is read or created until
    /// keys are first requested.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kem_cache: RwLock::new(None),
        }
    }

    /// The default key directory, `<home>/.chatkeys`.
    pub fn default_dir() -> Result<PathBuf, KeyStoreError> {
        let home = std::env::var("HOME").map_err(|_| KeyStoreError::MissingHomeDir)?;
        Ok(Path::new(&home).join(".chatkeys"))
    }

    /// Return the KEM pair, reading from disk or generating and
    /// persisting a fresh one. Subsequent calls hit the cache.
    pub fn kem_keys(&self) -> Result<KemKeys, KeyStoreError> {
        if let Some(keys) = self.kem_cache.read().as_ref() {
            return Ok(keys.clone());
        }

        let public_path = self.dir.join(KEM_PUBLIC_FILE);
        let secret_path = self.dir.join(KEM_SECRET_FILE);

        let keys = if public_path.exists() && secret_path.exists() {
            KemKeys {
                public: fs::read(&public_path)?,
                secret: Zeroizing::new(fs::read(&secret_path)?),
            }
        } else {
            let pair = kem::generate_keypair();
            self.write_key_file(&public_path, &pair.public)?;
            self.write_key_file(&secret_path, &pair.secret)?;
            KemKeys {
                public: pair.public,
                secret: pair.secret,
            }
        };

        *self.kem_cache.write() = Some(keys.clone());
        Ok(keys)
    }

    /// Return the Ed25519 identity pair as `(public, secret)` bytes,
    /// generating and persisting one if absent.
    pub fn identity_keys(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), KeyStoreError> {
        let public_path = self.dir.join(IDENTITY_PUBLIC_FILE);
        let secret_path = self.dir.join(IDENTITY_SECRET_FILE);

        if public_path.exists() && secret_path.exists() {
            return Ok((
                fs::read(&public_path)?,
                Zeroizing::new(fs::read(&secret_path)?),
            ));
        }

        let signing = SigningKey::generate(&mut OsRng);
        let public = signing.verifying_key().to_bytes().to_vec();
        let secret = Zeroizing::new(signing.to_bytes().to_vec());
        self.write_key_file(&public_path, &public)?;
        self.write_key_file(&secret_path, &secret)?;
        Ok((public, secret))
    }

    /// Drop the in-memory cache; the next access re-reads the files.
    pub fn clear_cache(&self) {
        *self.kem_cache.write() = None;
    }

    fn write_key_file(&self, path: &Path, bytes: &[u8]) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }

        fs::write(path, bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_then_reloads_same_kem_pair() {
        let dir = tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let first = store.kem_keys().unwrap();
        store.clear_cache();
        let second = store.kem_keys().unwrap();

        assert_eq!(first.public, second.public);
        assert_eq!(*first.secret, *second.secret);
    }

    #[test]
    fn generated_keys_round_trip_through_kem() {
        let dir = tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let keys = store.kem_keys().unwrap();
        let (ct, shared) = kem::encapsulate(&keys.public).unwrap();
        let recovered = kem::decapsulate(&keys.secret, &ct).unwrap();
        assert_eq!(*shared, *recovered);
    }

    #[test]
    fn identity_pair_is_stable_across_loads() {
        let dir = tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let (pub_a, sec_a) = store.identity_keys().unwrap();
        let (pub_b, sec_b) = store.identity_keys().unwrap();
        assert_eq!(pub_a, pub_b);
        assert_eq!(*sec_a, *sec_b);
        assert_eq!(pub_a.len(), 32);
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("keys");
        let store = KeyStore::open(&root);
        store.kem_keys().unwrap();

        let dir_mode = fs::metadata(&root).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        for file in [KEM_PUBLIC_FILE, KEM_SECRET_FILE] {
            let mode = fs::metadata(root.join(file)).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600, "{file} has mode {mode:o}");
        }
    }
}
