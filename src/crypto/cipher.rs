//! AES-128-CTR stream transform.

use aes::Aes128;
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use super::{CIPHER_KEY_LEN, IV_LEN};
use crate::error::KeystoreError;

type Aes128Ctr = Ctr128BE<Aes128>;

/// Apply the CTR keystream to `data`.
///
/// Encryption and decryption are the same operation given the same key and
/// IV; counter mode never pads, so the output length equals the input
/// length. The key must be 16 bytes and the IV exactly one AES block.
pub fn aes_ctr_xor(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let key: [u8; CIPHER_KEY_LEN] = key.try_into().map_err(|_| {
        KeystoreError::Malformed(format!("cipher key must be {CIPHER_KEY_LEN} bytes"))
    })?;
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| KeystoreError::Malformed(format!("iv must be {IV_LEN} bytes")))?;

    let mut cipher = Aes128Ctr::new(&key.into(), &iv.into());
    let mut output = data.to_vec();
    cipher.apply_keystream(&mut output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_self_inverse() {
        let key = [0xaa; CIPHER_KEY_LEN];
        let iv = [0xbb; IV_LEN];
        let plaintext = b"opaque scalar bytes of a private key";

        let ciphertext = aes_ctr_xor(&key, plaintext, &iv).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let recovered = aes_ctr_xor(&key, &ciphertext, &iv).unwrap();
        assert_eq!(&recovered[..], &plaintext[..]);
    }

    #[test]
    fn output_length_equals_input_length() {
        let key = [0x11; CIPHER_KEY_LEN];
        let iv = [0x22; IV_LEN];

        for len in [0, 1, 15, 16, 17, 32, 33, 64] {
            let data = vec![0x42; len];
            let out = aes_ctr_xor(&key, &data, &iv).unwrap();
            assert_eq!(out.len(), len);
        }
    }

    #[test]
    fn matches_nist_sp800_38a_vector() {
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ciphertext = aes_ctr_xor(&key, &plaintext, &iv).unwrap();

        assert_eq!(hex::encode(ciphertext), "874d6191b620e3261bef6864990db6ce");
    }

    #[test]
    fn different_iv_different_ciphertext() {
        let key = [0xaa; CIPHER_KEY_LEN];
        let plaintext = b"same plaintext";

        let c1 = aes_ctr_xor(&key, plaintext, &[0x11; IV_LEN]).unwrap();
        let c2 = aes_ctr_xor(&key, plaintext, &[0x22; IV_LEN]).unwrap();

        assert_ne!(c1, c2);
    }

    #[test]
    fn wrong_iv_length_is_rejected() {
        let key = [0xaa; CIPHER_KEY_LEN];

        assert!(aes_ctr_xor(&key, b"data", &[0u8; 8]).is_err());
        assert!(aes_ctr_xor(&key, b"data", &[0u8; 17]).is_err());
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert!(aes_ctr_xor(&[0u8; 32], b"data", &[0u8; IV_LEN]).is_err());
    }
}
