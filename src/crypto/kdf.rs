//! Passphrase key derivation.
//!
//! Two interchangeable algorithms, scrypt and pbkdf2-hmac-sha256. The set is
//! closed: a key file naming any other function is rejected outright rather
//! than routed through some extensible registry.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::DERIVED_KEY_LEN;
use crate::error::KeystoreError;

/// scrypt block size, fixed for every profile this store writes.
pub const SCRYPT_R: u32 = 8;
/// Derived key length written into every envelope.
pub const SCRYPT_DKLEN: u32 = DERIVED_KEY_LEN as u32;

// n=2^18, r=8, p=1 uses ~256 MiB and roughly 1 s of CPU on a modern machine.
const STANDARD_SCRYPT_N: u64 = 1 << 18;
const STANDARD_SCRYPT_P: u32 = 1;

// n=2^12, r=8, p=6 uses ~4 MiB and roughly 100 ms.
const LIGHT_SCRYPT_N: u64 = 1 << 12;
const LIGHT_SCRYPT_P: u32 = 6;

/// The pbkdf2 pseudo-random function accepted by this store.
pub const PRF_HMAC_SHA256: &str = "hmac-sha256";

/// Work-factor profile a store applies to every key it writes.
///
/// Retrieval ignores the profile: each key file embeds the parameters it was
/// written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfStrength {
    /// ~1 s CPU, ~256 MiB memory; for high-value keys.
    Standard,
    /// ~100 ms CPU, ~4 MiB memory; for low-latency or constrained
    /// environments.
    Light,
}

impl KdfStrength {
    /// scrypt parameters for this profile around a fresh salt.
    pub(crate) fn scrypt_params(self, salt: Vec<u8>) -> KdfParams {
        let (n, p) = match self {
            KdfStrength::Standard => (STANDARD_SCRYPT_N, STANDARD_SCRYPT_P),
            KdfStrength::Light => (LIGHT_SCRYPT_N, LIGHT_SCRYPT_P),
        };
        KdfParams::Scrypt {
            n,
            r: SCRYPT_R,
            p,
            dklen: SCRYPT_DKLEN,
            salt,
        }
    }
}

/// Parameters of the KDF protecting one key file, selected by the file's
/// `kdf` discriminator at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfParams {
    Scrypt {
        /// Cost parameter; must be a power of two.
        n: u64,
        r: u32,
        p: u32,
        dklen: u32,
        salt: Vec<u8>,
    },
    Pbkdf2 {
        /// Iteration count.
        c: u32,
        /// Pseudo-random function name; only `"hmac-sha256"` derives.
        prf: String,
        dklen: u32,
        salt: Vec<u8>,
    },
}

impl KdfParams {
    /// Structural validation, applied when a key file is decoded.
    pub fn validate(&self) -> Result<(), KeystoreError> {
        match self {
            KdfParams::Scrypt {
                n, r, p, dklen, ..
            } => {
                if *n < 2 || !n.is_power_of_two() {
                    return Err(KeystoreError::Malformed(
                        "scrypt n must be a power of two greater than one".into(),
                    ));
                }
                if *r == 0 {
                    return Err(KeystoreError::Malformed("scrypt r must be positive".into()));
                }
                if *p == 0 {
                    return Err(KeystoreError::Malformed("scrypt p must be positive".into()));
                }
                check_dklen(*dklen)
            }
            KdfParams::Pbkdf2 { c, dklen, .. } => {
                if *c == 0 {
                    return Err(KeystoreError::Malformed(
                        "pbkdf2 iteration count must be positive".into(),
                    ));
                }
                check_dklen(*dklen)
            }
        }
    }

    pub fn salt(&self) -> &[u8] {
        match self {
            KdfParams::Scrypt { salt, .. } | KdfParams::Pbkdf2 { salt, .. } => salt,
        }
    }
}

fn check_dklen(dklen: u32) -> Result<(), KeystoreError> {
    if (dklen as usize) < DERIVED_KEY_LEN {
        return Err(KeystoreError::Malformed(format!(
            "kdf dklen must be at least {DERIVED_KEY_LEN}"
        )));
    }
    Ok(())
}

/// Derive the symmetric key protecting one key file.
///
/// Deterministic: identical passphrase, salt and parameters always produce
/// identical output.
pub fn derive_key(
    passphrase: &str,
    params: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    params.validate()?;

    match params {
        KdfParams::Scrypt {
            n,
            r,
            p,
            dklen,
            salt,
        } => {
            let log_n = n.trailing_zeros() as u8;
            let scrypt_params = scrypt::Params::new(log_n, *r, *p, *dklen as usize)
                .map_err(|e| KeystoreError::Kdf(e.to_string()))?;

            let mut derived = Zeroizing::new(vec![0u8; *dklen as usize]);
            scrypt::scrypt(passphrase.as_bytes(), salt, &scrypt_params, &mut derived)
                .map_err(|e| KeystoreError::Kdf(e.to_string()))?;
            Ok(derived)
        }
        KdfParams::Pbkdf2 {
            c,
            prf,
            dklen,
            salt,
        } => {
            if prf != PRF_HMAC_SHA256 {
                return Err(KeystoreError::UnsupportedPrf(prf.clone()));
            }

            let mut derived = Zeroizing::new(vec![0u8; *dklen as usize]);
            pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, *c, &mut derived);
            Ok(derived)
        }
    }
}
