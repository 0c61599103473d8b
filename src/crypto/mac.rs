//! Legacy keccak-256 mac over the ciphertext.
//!
//! The tag is `keccak256(mac_key || ciphertext)` — a plain
//! hash-of-concatenation, not an hmac. The wallet files this store reads
//! were written with exactly that byte layout, so it is preserved
//! bit-for-bit.

use sha3::{Digest, Keccak256};

use crate::error::KeystoreError;

/// Length of the authentication tag in bytes.
pub const MAC_LEN: usize = 32;

/// Compute the authentication tag for `ciphertext` under `mac_key`.
pub fn compute_mac(mac_key: &[u8], ciphertext: &[u8]) -> [u8; MAC_LEN] {
    let mut hasher = Keccak256::new();
    hasher.update(mac_key);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

/// Check a stored tag against a freshly computed one.
///
/// Any mismatch is `MacMismatch`, whether the passphrase was wrong or the
/// ciphertext was altered.
pub fn verify_mac(mac_key: &[u8], ciphertext: &[u8], expected: &[u8]) -> Result<(), KeystoreError> {
    let computed = compute_mac(mac_key, ciphertext);
    if constant_time_eq(&computed, expected) {
        Ok(())
    } else {
        Err(KeystoreError::MacMismatch)
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
