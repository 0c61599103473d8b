//! Version-3 envelope shapes and their conversion to typed form.
//!
//! Numeric KDF parameters may reach us as integers or as floats, depending
//! on what wrote the file; coercion to integers lives here at the boundary
//! and nowhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{CryptoParams, KeyFile, CIPHER_AES_128_CTR, VERSION};
use crate::crypto::kdf::KdfParams;
use crate::crypto::IV_LEN;
use crate::error::KeystoreError;
use crate::key::Address;

const KDF_SCRYPT: &str = "scrypt";
const KDF_PBKDF2: &str = "pbkdf2";

#[derive(Serialize, Deserialize)]
pub(super) struct KeyFileJson {
    pub address: String,
    pub crypto: CryptoJson,
    pub id: String,
    pub version: u64,
}

#[derive(Serialize, Deserialize)]
pub(super) struct CryptoJson {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParamsJson,
    pub kdf: String,
    pub kdfparams: Value,
    pub mac: String,
}

#[derive(Serialize, Deserialize)]
pub(super) struct CipherParamsJson {
    pub iv: String,
}

pub(super) fn from_json(raw: KeyFileJson) -> Result<KeyFile, KeystoreError> {
    if raw.crypto.cipher != CIPHER_AES_128_CTR {
        return Err(KeystoreError::UnsupportedCipher(raw.crypto.cipher));
    }

    let id = Uuid::parse_str(&raw.id)
        .map_err(|_| KeystoreError::Malformed(format!("id {:?} is not a valid uuid", raw.id)))?;
    let address: Address = raw.address.parse()?;

    let ciphertext = unhex(&raw.crypto.ciphertext, "ciphertext")?;
    let iv = unhex(&raw.crypto.cipherparams.iv, "cipherparams.iv")?;
    if iv.len() != IV_LEN {
        return Err(KeystoreError::Malformed(format!(
            "iv must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    let mac = unhex(&raw.crypto.mac, "mac")?;

    let kdf = kdf_from_json(&raw.crypto.kdf, &raw.crypto.kdfparams)?;
    kdf.validate()?;

    Ok(KeyFile {
        id,
        address,
        crypto: CryptoParams {
            ciphertext,
            iv,
            kdf,
            mac,
        },
    })
}

pub(super) fn to_json(file: &KeyFile) -> KeyFileJson {
    let (kdf, kdfparams) = kdf_to_json(&file.crypto.kdf);

    KeyFileJson {
        address: hex::encode(file.address.as_bytes()),
        crypto: CryptoJson {
            cipher: CIPHER_AES_128_CTR.to_string(),
            ciphertext: hex::encode(&file.crypto.ciphertext),
            cipherparams: CipherParamsJson {
                iv: hex::encode(&file.crypto.iv),
            },
            kdf: kdf.to_string(),
            kdfparams,
            mac: hex::encode(&file.crypto.mac),
        },
        id: file.id.to_string(),
        version: VERSION,
    }
}

fn kdf_from_json(name: &str, params: &Value) -> Result<KdfParams, KeystoreError> {
    match name {
        KDF_SCRYPT => Ok(KdfParams::Scrypt {
            n: uint_param(params, "n")?,
            r: u32_param(params, "r")?,
            p: u32_param(params, "p")?,
            dklen: u32_param(params, "dklen")?,
            salt: salt_param(params)?,
        }),
        KDF_PBKDF2 => Ok(KdfParams::Pbkdf2 {
            c: u32_param(params, "c")?,
            prf: str_param(params, "prf")?,
            dklen: u32_param(params, "dklen")?,
            salt: salt_param(params)?,
        }),
        _ => Err(KeystoreError::UnsupportedKdf(name.to_string())),
    }
}

fn kdf_to_json(kdf: &KdfParams) -> (&'static str, Value) {
    match kdf {
        KdfParams::Scrypt {
            n,
            r,
            p,
            dklen,
            salt,
        } => (
            KDF_SCRYPT,
            serde_json::json!({
                "n": n,
                "r": r,
                "p": p,
                "dklen": dklen,
                "salt": hex::encode(salt),
            }),
        ),
        KdfParams::Pbkdf2 {
            c,
            prf,
            dklen,
            salt,
        } => (
            KDF_PBKDF2,
            serde_json::json!({
                "c": c,
                "dklen": dklen,
                "prf": prf,
                "salt": hex::encode(salt),
            }),
        ),
    }
}

/// Pull an integer field out of the kdf parameter mapping.
///
/// Integral floats are accepted; anything lossy or negative is rejected.
fn uint_param(params: &Value, field: &str) -> Result<u64, KeystoreError> {
    let value = params
        .get(field)
        .ok_or_else(|| KeystoreError::Malformed(format!("kdfparams missing {field:?}")))?;

    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    if let Some(f) = value.as_f64() {
        if f >= 0.0 && (f as u64) as f64 == f {
            return Ok(f as u64);
        }
    }

    Err(KeystoreError::Malformed(format!(
        "kdfparams {field:?} is not an unsigned integer"
    )))
}

fn u32_param(params: &Value, field: &str) -> Result<u32, KeystoreError> {
    u32::try_from(uint_param(params, field)?)
        .map_err(|_| KeystoreError::Malformed(format!("kdfparams {field:?} is out of range")))
}

fn str_param(params: &Value, field: &str) -> Result<String, KeystoreError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KeystoreError::Malformed(format!("kdfparams missing {field:?}")))
}

fn salt_param(params: &Value) -> Result<Vec<u8>, KeystoreError> {
    unhex(&str_param(params, "salt")?, "kdfparams.salt")
}

fn unhex(s: &str, field: &str) -> Result<Vec<u8>, KeystoreError> {
    hex::decode(s).map_err(|_| KeystoreError::Malformed(format!("{field} is not valid hex")))
}
