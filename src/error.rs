use thiserror::Error;

use crate::key::Address;

/// Errors surfaced by keystore operations.
///
/// `MacMismatch` covers both a wrong passphrase and a tampered file; the two
/// are not distinguishable from the error.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("no key file for address {0}")]
    KeyNotFound(Address),

    #[error("malformed key file: {0}")]
    Malformed(String),

    #[error("unsupported key file version: {0}")]
    UnsupportedVersion(u64),

    #[error("unsupported cipher: {0:?}")]
    UnsupportedCipher(String),

    #[error("unsupported kdf: {0:?}")]
    UnsupportedKdf(String),

    #[error("unsupported pbkdf2 prf: {0:?}")]
    UnsupportedPrf(String),

    #[error("could not decrypt key file: mac mismatch")]
    MacMismatch,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("os random generator unavailable: {0}")]
    RandomSource(String),

    #[error("keystore io error: {0}")]
    Io(#[from] std::io::Error),
}
