//! Cryptographic engines for the keystore.
//!
//! Key derivation, the AES-128-CTR stream transform, and the legacy
//! keccak-256 mac over `mac_key || ciphertext`.

pub mod cipher;
pub mod kdf;
pub mod mac;

pub use self::cipher::aes_ctr_xor;
pub use self::kdf::{derive_key, KdfParams, KdfStrength};
pub use self::mac::{compute_mac, verify_mac};

use crate::error::KeystoreError;

/// Length of the derived symmetric key (32 bytes).
pub const DERIVED_KEY_LEN: usize = 32;
/// Length of the cipher key, the first half of the derived key.
pub const CIPHER_KEY_LEN: usize = 16;
/// Length of the mac key, the second half of the derived key.
pub const MAC_KEY_LEN: usize = 16;
/// Length of the CTR initialization vector (one AES block).
pub const IV_LEN: usize = 16;
/// Length of the random KDF salt.
pub const SALT_LEN: usize = 32;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), KeystoreError> {
    getrandom::fill(buf).map_err(|e| KeystoreError::RandomSource(e.to_string()))
}

/// Generate a fresh salt for one store operation.
pub(crate) fn random_salt() -> Result<[u8; SALT_LEN], KeystoreError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a fresh IV for one store operation.
pub(crate) fn random_iv() -> Result<[u8; IV_LEN], KeystoreError> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}
