//! On-disk key file format.
//!
//! Version-aware parsing and serialization of the JSON envelope that holds
//! one encrypted key. Every structural defect is rejected here, before any
//! cryptography runs.

mod v3;

use serde::Deserialize;
use uuid::Uuid;

use crate::crypto::kdf::KdfParams;
use crate::error::KeystoreError;
use crate::key::Address;

/// The only key file version this store reads or writes.
pub const VERSION: u64 = 3;

/// Cipher name every key file must carry.
pub const CIPHER_AES_128_CTR: &str = "aes-128-ctr";

/// A decoded key file envelope.
///
/// The envelope on disk is the sole durable owner of the encrypted key
/// material; this value is just its parsed, validated form.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFile {
    pub id: Uuid,
    pub address: Address,
    pub crypto: CryptoParams,
}

/// The `crypto` section of a key file.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoParams {
    /// Same length as the plaintext private key; CTR mode never pads.
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub kdf: KdfParams,
    pub mac: Vec<u8>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u64,
}

/// Decode a key file from its JSON bytes.
///
/// The version gate runs first, on a minimal probe of the document, so an
/// envelope written by a newer format reports `UnsupportedVersion` rather
/// than whatever shape mismatch it would otherwise trip over.
pub fn decode(data: &[u8]) -> Result<KeyFile, KeystoreError> {
    let probe: VersionProbe =
        serde_json::from_slice(data).map_err(|e| KeystoreError::Malformed(e.to_string()))?;
    if probe.version != VERSION {
        return Err(KeystoreError::UnsupportedVersion(probe.version));
    }

    let raw: v3::KeyFileJson =
        serde_json::from_slice(data).map_err(|e| KeystoreError::Malformed(e.to_string()))?;
    v3::from_json(raw)
}

/// Encode a key file to its canonical JSON bytes.
pub fn encode(file: &KeyFile) -> Result<Vec<u8>, KeystoreError> {
    serde_json::to_vec(&v3::to_json(file)).map_err(|e| KeystoreError::Malformed(e.to_string()))
}
