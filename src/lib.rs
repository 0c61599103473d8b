//! Local, passphrase-protected keystore for signing keys.
//!
//! Each key is persisted as a version-3 JSON envelope: the private key is
//! encrypted with AES-128-CTR under a key derived from the passphrase via
//! scrypt (or pbkdf2-hmac-sha256 for files written elsewhere), and
//! authenticated with a keccak-256 mac that is verified before any
//! decrypted byte is trusted.
//!
//! All operations are synchronous and take no internal locks. Derivation
//! with [`KdfStrength::Standard`] costs around a second of CPU and 256 MiB
//! of memory, so keep it off latency-sensitive paths, and serialize
//! concurrent writes to the same address externally.

pub mod crypto;
mod error;
pub mod format;
mod key;
mod storage;

pub use crate::crypto::kdf::{KdfParams, KdfStrength};
pub use crate::error::KeystoreError;
pub use crate::key::{Address, Key, ADDRESS_LEN, PRIVATE_KEY_LEN};
pub use crate::storage::KeyDir;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use zeroize::Zeroizing;

use crate::crypto::{
    aes_ctr_xor, compute_mac, derive_key, random_iv, random_salt, verify_mac, CIPHER_KEY_LEN,
    DERIVED_KEY_LEN,
};
use crate::format::{CryptoParams, KeyFile};

/// The operations every keystore backend offers.
pub trait KeyStore {
    /// Create a fresh key and immediately persist it under `passphrase`.
    fn generate_new_key(&self, passphrase: &str) -> Result<Key, KeystoreError>;

    /// Encrypt `key` under `passphrase` and write its envelope, creating or
    /// replacing the file for its address.
    fn store_key(&self, key: &Key, passphrase: &str) -> Result<(), KeystoreError>;

    /// Read, authenticate and decrypt the key stored for `address`.
    ///
    /// Decryption always honors the KDF named in the file, whatever profile
    /// this store writes with.
    fn get_key(&self, address: &Address, passphrase: &str) -> Result<Key, KeystoreError>;

    /// Delete the key for `address`; `passphrase` must decrypt it first.
    fn delete_key(&self, address: &Address, passphrase: &str) -> Result<(), KeystoreError>;

    /// Remove the file for `address` without any passphrase check.
    ///
    /// Exists for rolling back partially-completed operations. Unlike
    /// [`KeyStore::delete_key`] it requires no proof of authorization, so
    /// it must not be reachable by untrusted callers.
    fn cleanup(&self, address: &Address) -> Result<(), KeystoreError>;

    /// Addresses with a stored key file.
    fn key_addresses(&self) -> Result<Vec<Address>, KeystoreError>;
}

/// Keystore that encrypts every key file under a passphrase-derived key.
///
/// The [`KdfStrength`] chosen at construction applies to every write this
/// instance performs; previously written files keep the parameters embedded
/// in them.
pub struct PassphraseKeyStore {
    keys: KeyDir,
    strength: KdfStrength,
}

impl PassphraseKeyStore {
    pub fn new(keys_dir: PathBuf, strength: KdfStrength) -> Self {
        Self {
            keys: KeyDir::new(keys_dir),
            strength,
        }
    }

    pub fn keys_dir(&self) -> &Path {
        self.keys.root()
    }

    /// Encrypt `key` into a fresh envelope.
    ///
    /// Salt and IV are drawn fresh from the OS random source on every call;
    /// they are the only reason two envelopes of the same key differ.
    fn encrypt_key(&self, key: &Key, passphrase: &str) -> Result<KeyFile, KeystoreError> {
        let salt = random_salt()?;
        let kdf = self.strength.scrypt_params(salt.to_vec());
        let derived = derive_key(passphrase, &kdf)?;

        let iv = random_iv()?;
        let ciphertext = aes_ctr_xor(&derived[..CIPHER_KEY_LEN], &key.private_key, &iv)?;
        let mac = compute_mac(&derived[CIPHER_KEY_LEN..DERIVED_KEY_LEN], &ciphertext);

        Ok(KeyFile {
            id: key.id,
            address: key.address,
            crypto: CryptoParams {
                ciphertext,
                iv: iv.to_vec(),
                kdf,
                mac: mac.to_vec(),
            },
        })
    }
}

/// Recover the private key bytes from a decoded envelope.
///
/// The mac is verified over the ciphertext before the cipher runs; nothing
/// decrypted is ever returned from an envelope that failed authentication.
fn decrypt_key_file(
    file: &KeyFile,
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let derived = derive_key(passphrase, &file.crypto.kdf)?;

    verify_mac(
        &derived[CIPHER_KEY_LEN..DERIVED_KEY_LEN],
        &file.crypto.ciphertext,
        &file.crypto.mac,
    )?;

    let plaintext = aes_ctr_xor(
        &derived[..CIPHER_KEY_LEN],
        &file.crypto.ciphertext,
        &file.crypto.iv,
    )?;
    Ok(Zeroizing::new(plaintext))
}

impl KeyStore for PassphraseKeyStore {
    fn generate_new_key(&self, passphrase: &str) -> Result<Key, KeystoreError> {
        let key = Key::generate()?;
        self.store_key(&key, passphrase)?;
        Ok(key)
    }

    fn store_key(&self, key: &Key, passphrase: &str) -> Result<(), KeystoreError> {
        let file = self.encrypt_key(key, passphrase)?;
        let data = format::encode(&file)?;
        self.keys.write(&key.address, &data)
    }

    fn get_key(&self, address: &Address, passphrase: &str) -> Result<Key, KeystoreError> {
        let data = self.keys.read(address)?;
        let file = format::decode(&data)?;
        let private_key = decrypt_key_file(&file, passphrase)?;
        Ok(Key::new(file.id, *address, private_key))
    }

    fn delete_key(&self, address: &Address, passphrase: &str) -> Result<(), KeystoreError> {
        // deletion is gated on proof the caller can decrypt the key
        self.get_key(address, passphrase)?;
        self.keys.delete(address)
    }

    fn cleanup(&self, address: &Address) -> Result<(), KeystoreError> {
        self.keys.delete(address)
    }

    fn key_addresses(&self) -> Result<Vec<Address>, KeystoreError> {
        self.keys.addresses()
    }
}

/// Platform default directory for key files.
pub fn default_keys_dir() -> Result<PathBuf, KeystoreError> {
    let project_dirs = ProjectDirs::from("", "", "keyhold").ok_or_else(|| {
        KeystoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine platform directories",
        ))
    })?;
    Ok(project_dirs.data_dir().join("keys"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::PRF_HMAC_SHA256;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn light_store(dir: &Path) -> PassphraseKeyStore {
        PassphraseKeyStore::new(dir.to_path_buf(), KdfStrength::Light)
    }

    fn fixed_key() -> Key {
        Key::new(
            Uuid::new_v4(),
            Address([0xaa; ADDRESS_LEN]),
            Zeroizing::new(vec![0x11; PRIVATE_KEY_LEN]),
        )
    }

    #[test]
    fn store_then_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "correct horse").unwrap();
        let loaded = store.get_key(&key.address, "correct horse").unwrap();

        assert_eq!(loaded, key);
    }

    #[test]
    fn generate_new_key_is_stored_and_retrievable() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());

        let key = store.generate_new_key("pw").unwrap();
        let loaded = store.get_key(&key.address, "pw").unwrap();

        assert_eq!(loaded, key);
    }

    #[test]
    fn wrong_passphrase_is_mac_mismatch() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "correct horse").unwrap();

        assert!(matches!(
            store.get_key(&key.address, "wrong horse"),
            Err(KeystoreError::MacMismatch)
        ));
    }

    #[test]
    fn get_missing_key_is_key_not_found() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());

        assert!(matches!(
            store.get_key(&Address([9; ADDRESS_LEN]), "pw"),
            Err(KeystoreError::KeyNotFound(_))
        ));
    }

    fn tamper_hex_field(dir: &Path, key: &Key, field: &str) {
        let path = KeyDir::new(dir.to_path_buf()).path_for(&key.address);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        let mut bytes = hex::decode(doc["crypto"][field].as_str().unwrap()).unwrap();
        bytes[0] ^= 0x01;
        doc["crypto"][field] = hex::encode(bytes).into();

        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
    }

    #[test]
    fn flipped_ciphertext_bit_is_detected() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();
        tamper_hex_field(dir.path(), &key, "ciphertext");

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::MacMismatch)
        ));
    }

    #[test]
    fn flipped_mac_bit_is_detected() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();
        tamper_hex_field(dir.path(), &key, "mac");

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::MacMismatch)
        ));
    }

    #[test]
    fn storing_twice_embeds_fresh_randomness() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();
        let path = store.keys.path_for(&key.address);

        store.store_key(&key, "pw").unwrap();
        let first: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        store.store_key(&key, "pw").unwrap();
        let second: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        for (a, b) in [
            (&first["crypto"]["kdfparams"]["salt"], &second["crypto"]["kdfparams"]["salt"]),
            (&first["crypto"]["cipherparams"]["iv"], &second["crypto"]["cipherparams"]["iv"]),
            (&first["crypto"]["ciphertext"], &second["crypto"]["ciphertext"]),
            (&first["crypto"]["mac"], &second["crypto"]["mac"]),
        ] {
            assert_ne!(a, b);
        }

        // the second envelope, like the first before it, still decrypts
        let loaded = store.get_key(&key.address, "pw").unwrap();
        assert_eq!(loaded, key);
    }

    #[test]
    fn light_profile_writes_documented_file_shape() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "correct horse").unwrap();

        let path = store.keys.path_for(&key.address);
        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        assert_eq!(doc["version"], 3);
        assert_eq!(doc["crypto"]["cipher"], "aes-128-ctr");
        assert_eq!(doc["crypto"]["kdf"], "scrypt");
        assert_eq!(doc["crypto"]["kdfparams"]["n"], 4096);
        assert_eq!(doc["crypto"]["kdfparams"]["r"], 8);
        assert_eq!(doc["crypto"]["kdfparams"]["p"], 6);
        assert_eq!(doc["crypto"]["kdfparams"]["dklen"], 32);
        assert_eq!(doc["crypto"]["ciphertext"].as_str().unwrap().len(), 64);
        assert_eq!(doc["crypto"]["cipherparams"]["iv"].as_str().unwrap().len(), 32);
        assert_eq!(doc["crypto"]["mac"].as_str().unwrap().len(), 64);

        let loaded = store.get_key(&key.address, "correct horse").unwrap();
        assert_eq!(*loaded.private_key, vec![0x11; PRIVATE_KEY_LEN]);

        assert!(matches!(
            store.get_key(&key.address, "wrong horse"),
            Err(KeystoreError::MacMismatch)
        ));
    }

    #[test]
    fn retrieval_honors_the_kdf_in_the_file() {
        let dir = tempdir().unwrap();
        // the store writes scrypt; the file below was written with pbkdf2
        let store = light_store(dir.path());
        let key = fixed_key();

        let kdf = KdfParams::Pbkdf2 {
            c: 1024,
            prf: PRF_HMAC_SHA256.to_string(),
            dklen: 32,
            salt: vec![0x77; 32],
        };
        let derived = derive_key("pw", &kdf).unwrap();
        let iv = [0x66u8; 16];
        let ciphertext = aes_ctr_xor(&derived[..16], &key.private_key, &iv).unwrap();
        let mac = compute_mac(&derived[16..32], &ciphertext);

        let file = KeyFile {
            id: key.id,
            address: key.address,
            crypto: CryptoParams {
                ciphertext,
                iv: iv.to_vec(),
                kdf,
                mac: mac.to_vec(),
            },
        };
        store
            .keys
            .write(&key.address, &format::encode(&file).unwrap())
            .unwrap();

        let loaded = store.get_key(&key.address, "pw").unwrap();
        assert_eq!(loaded, key);
    }

    #[test]
    fn delete_key_requires_the_passphrase() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();

        assert!(matches!(
            store.delete_key(&key.address, "wrong"),
            Err(KeystoreError::MacMismatch)
        ));
        // a failed delete leaves the key behind
        assert!(store.get_key(&key.address, "pw").is_ok());

        store.delete_key(&key.address, "pw").unwrap();
        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn cleanup_deletes_without_a_passphrase() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();
        store.cleanup(&key.address).unwrap();

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn key_addresses_lists_stored_keys() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());

        assert!(store.key_addresses().unwrap().is_empty());

        let a = store.generate_new_key("pw").unwrap();
        let b = store.generate_new_key("pw").unwrap();

        let listed = store.key_addresses().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a.address));
        assert!(listed.contains(&b.address));
    }

    #[test]
    fn unsupported_kdf_in_file_surfaces_from_get() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();

        let path = store.keys.path_for(&key.address);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["crypto"]["kdf"] = "bcrypt".into();
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::UnsupportedKdf(_))
        ));
    }

    #[test]
    fn unsupported_prf_in_file_surfaces_from_get() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        let kdf = KdfParams::Pbkdf2 {
            c: 1024,
            prf: PRF_HMAC_SHA256.to_string(),
            dklen: 32,
            salt: vec![0x77; 32],
        };
        let derived = derive_key("pw", &kdf).unwrap();
        let iv = [0x66u8; 16];
        let ciphertext = aes_ctr_xor(&derived[..16], &key.private_key, &iv).unwrap();
        let mac = compute_mac(&derived[16..32], &ciphertext);
        let file = KeyFile {
            id: key.id,
            address: key.address,
            crypto: CryptoParams {
                ciphertext,
                iv: iv.to_vec(),
                kdf,
                mac: mac.to_vec(),
            },
        };
        store
            .keys
            .write(&key.address, &format::encode(&file).unwrap())
            .unwrap();

        let path = store.keys.path_for(&key.address);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["crypto"]["kdfparams"]["prf"] = "hmac-sha512".into();
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::UnsupportedPrf(_))
        ));
    }

    #[test]
    fn unsupported_version_surfaces_from_get() {
        let dir = tempdir().unwrap();
        let store = light_store(dir.path());
        let key = fixed_key();

        store.store_key(&key, "pw").unwrap();

        let path = store.keys.path_for(&key.address);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["version"] = 2.into();
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(
            store.get_key(&key.address, "pw"),
            Err(KeystoreError::UnsupportedVersion(2))
        ));
    }
}
