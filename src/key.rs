//! In-memory key model.
//!
//! A [`Key`] is the transient, plaintext form of an identity. The encrypted
//! key file is the only durable owner of the material; nothing here caches
//! decrypted keys.

use std::fmt;
use std::str::FromStr;

use sha3::{Digest, Keccak256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::secure_random;
use crate::error::KeystoreError;

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Length of a freshly generated private scalar in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Public identifier of a stored key; also names its key file.
///
/// The store treats the bytes as opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeystoreError> {
        let raw: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            KeystoreError::Malformed(format!(
                "address must be {ADDRESS_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = KeystoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|_| KeystoreError::Malformed("address is not valid hex".into()))?;
        Self::from_slice(&bytes)
    }
}

/// A plaintext signing key.
///
/// Owned by the caller; the private scalar is zeroized when the value drops.
pub struct Key {
    /// Fresh at creation, preserved verbatim across store/retrieve cycles.
    pub id: Uuid,
    pub address: Address,
    pub private_key: Zeroizing<Vec<u8>>,
}

impl Key {
    pub fn new(id: Uuid, address: Address, private_key: Zeroizing<Vec<u8>>) -> Self {
        Self {
            id,
            address,
            private_key,
        }
    }

    /// Create a fresh key: random 32-byte scalar, v4 id, and an address
    /// derived from the key material.
    ///
    /// The address derivation stands in for a caller's curve-specific
    /// public-key derivation; the store consumes both fields as opaque bytes
    /// either way.
    pub fn generate() -> Result<Self, KeystoreError> {
        let mut scalar = Zeroizing::new(vec![0u8; PRIVATE_KEY_LEN]);
        secure_random(&mut scalar)?;
        let address = derive_address(&scalar);
        Ok(Self::new(Uuid::new_v4(), address, scalar))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // private key bytes never reach log output
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.address == other.address
            && *self.private_key == *other.private_key
    }
}

fn derive_address(private_key: &[u8]) -> Address {
    let digest: [u8; 32] = Keccak256::digest(private_key).into();
    let mut raw = [0u8; ADDRESS_LEN];
    raw.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
    Address(raw)
}
